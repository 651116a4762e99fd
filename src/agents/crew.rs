//! Research Crew
//!
//! Agents and tasks are declared in YAML (`config/agents.yaml`,
//! `config/tasks.yaml`). Both files are compiled in as defaults and can be
//! replaced at runtime with `AGENTS_CONFIG` / `TASKS_CONFIG`.
//!
//! Each task runs as one chat-completion conversation: the agent may call its
//! tools for up to `max_iter` rounds, after which a final answer is requested
//! with tools disabled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::Crew;
use crate::llm::LLM;
use crate::models::ResearchContext;
use crate::tools::ToolRegistry;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest};

const DEFAULT_AGENTS: &str = include_str!("../../config/agents.yaml");
const DEFAULT_TASKS: &str = include_str!("../../config/tasks.yaml");

const FINAL_ANSWER_PROMPT: &str =
    "You have used all available tool calls. Now write your complete final answer using the information gathered so far.";

fn default_max_iter() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentDefinition {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskDefinition {
    pub agent: String,
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub output_file: Option<String>,
}

/// Parsed agent and task declarations, in file order
#[derive(Debug, Clone)]
pub struct CrewConfig {
    pub agents: Vec<(String, AgentDefinition)>,
    pub tasks: Vec<(String, TaskDefinition)>,
}

impl CrewConfig {
    pub fn embedded() -> AppResult<Self> {
        Self::parse(DEFAULT_AGENTS, DEFAULT_TASKS)
    }

    /// Load overrides from disk, falling back to the embedded files.
    pub fn load(agents_path: Option<&Path>, tasks_path: Option<&Path>) -> AppResult<Self> {
        let agents = match agents_path {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?,
            None => DEFAULT_AGENTS.to_string(),
        };
        let tasks = match tasks_path {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?,
            None => DEFAULT_TASKS.to_string(),
        };
        Self::parse(&agents, &tasks)
    }

    pub fn parse(agents_yaml: &str, tasks_yaml: &str) -> AppResult<Self> {
        let agents: Vec<(String, AgentDefinition)> = parse_named(agents_yaml, "agents")?;
        let tasks: Vec<(String, TaskDefinition)> = parse_named(tasks_yaml, "tasks")?;

        if tasks.is_empty() {
            return Err(AppError::Config("tasks config declares no tasks".to_string()));
        }
        for (name, task) in &tasks {
            if !agents.iter().any(|(agent, _)| agent == &task.agent) {
                return Err(AppError::Config(format!(
                    "Task '{}' references unknown agent '{}'",
                    name, task.agent
                )));
            }
        }

        Ok(Self { agents, tasks })
    }

    fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }
}

/// Top-level YAML mapping of name to definition, keeping document order
fn parse_named<T: serde::de::DeserializeOwned>(yaml: &str, what: &str) -> AppResult<Vec<(String, T)>> {
    let mapping: serde_yaml::Mapping = serde_yaml::from_str(yaml)
        .map_err(|e| AppError::Config(format!("Invalid {} config: {}", what, e)))?;

    mapping
        .into_iter()
        .map(|(key, value)| {
            let name = key
                .as_str()
                .ok_or_else(|| AppError::Config(format!("Non-string key in {} config", what)))?
                .to_string();
            let definition = serde_yaml::from_value(value)
                .map_err(|e| AppError::Config(format!("Invalid entry '{}' in {} config: {}", name, what, e)))?;
            Ok((name, definition))
        })
        .collect()
}

/// `report_{topic}.md` with spaces and path separators replaced
pub fn topic_slug(topic: &str) -> String {
    topic
        .trim()
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

fn render(template: &str, topic: &str) -> String {
    template
        .replace("{topic_slug}", &topic_slug(topic))
        .replace("{topic}", topic)
}

/// Model parameters shared by every agent in a crew
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct Agent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub max_iter: u32,
    pub tools: ToolRegistry,
}

impl Agent {
    fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.role,
            self.backstory.trim(),
            self.goal
        )
    }
}

pub struct Task {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub output_file: Option<PathBuf>,
}

impl Task {
    fn prompt(&self, context: Option<&str>) -> String {
        let mut prompt = format!(
            "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n\
             You MUST return the actual complete content as the final answer, not a summary.",
            self.description.trim(),
            self.expected_output
        );
        if let Some(context) = context {
            prompt.push_str("\n\nThis is the context you're working with:\n");
            prompt.push_str(context);
        }
        prompt
    }
}

pub struct ResearchCrew {
    steps: Vec<(Task, Agent)>,
    llm: Arc<LLM>,
    settings: ModelSettings,
}

impl ResearchCrew {
    /// Instantiate the configured agents and tasks for one topic. Tools named
    /// in the config but missing from `registry` are skipped.
    pub fn build(
        config: &CrewConfig,
        topic: &str,
        registry: &ToolRegistry,
        llm: Arc<LLM>,
        settings: ModelSettings,
        reports_dir: &Path,
    ) -> AppResult<Self> {
        let mut steps = Vec::with_capacity(config.tasks.len());

        for (name, task_def) in &config.tasks {
            let agent_def = config
                .agent(&task_def.agent)
                .ok_or_else(|| AppError::Config(format!("Unknown agent '{}'", task_def.agent)))?;

            let mut tools = ToolRegistry::new();
            for tool_name in &agent_def.tools {
                match registry.get(tool_name) {
                    Some(tool) => tools = tools.with(tool),
                    None => warn!(agent = %task_def.agent, tool = %tool_name, "Configured tool not available"),
                }
            }

            let agent = Agent {
                role: render(&agent_def.role, topic),
                goal: render(&agent_def.goal, topic),
                backstory: render(&agent_def.backstory, topic),
                max_iter: agent_def.max_iter,
                tools,
            };
            let task = Task {
                name: name.clone(),
                description: render(&task_def.description, topic),
                expected_output: render(&task_def.expected_output, topic),
                output_file: task_def
                    .output_file
                    .as_ref()
                    .map(|file| reports_dir.join(render(file, topic))),
            };
            steps.push((task, agent));
        }

        Ok(Self { steps, llm, settings })
    }

    pub fn output_files(&self) -> Vec<&Path> {
        self.steps
            .iter()
            .filter_map(|(task, _)| task.output_file.as_deref())
            .collect()
    }

    fn request(&self, agent: &Agent, messages: &[LLMMessage], with_tools: bool) -> LLMRequest {
        LLMRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            system_instruction: Some(agent.system_prompt()),
            tools: if with_tools { agent.tools.specs() } else { Vec::new() },
        }
    }

    async fn run_task(&self, task: &Task, agent: &Agent, context: Option<&str>, ctx: &ResearchContext) -> AppResult<String> {
        let mut messages = vec![LLMMessage::user(task.prompt(context))];

        if !agent.tools.names().is_empty() {
            for round in 1..=agent.max_iter {
                let response = self
                    .llm
                    .create_chat_completion(&self.request(agent, &messages, true))
                    .await?;

                if response.tool_calls.is_empty() {
                    return final_answer(response.content);
                }

                debug!(task = %task.name, round, calls = response.tool_calls.len(), "Agent requested tools");
                let calls = response.tool_calls.clone();
                messages.push(LLMMessage::assistant_tool_calls(response.content, response.tool_calls));
                for call in &calls {
                    let output = agent.tools.dispatch(call, ctx).await;
                    messages.push(LLMMessage::tool_result(call.id.clone(), output));
                }
            }
            messages.push(LLMMessage::user(FINAL_ANSWER_PROMPT));
        }

        let response = self
            .llm
            .create_chat_completion(&self.request(agent, &messages, false))
            .await?;
        final_answer(response.content)
    }
}

fn final_answer(content: String) -> AppResult<String> {
    if content.trim().is_empty() {
        Err(AppError::EmptyResponse("agent produced no final answer".to_string()))
    } else {
        Ok(content)
    }
}

#[async_trait]
impl Crew for ResearchCrew {
    async fn kickoff(&self, ctx: &ResearchContext) -> AppResult<String> {
        let mut previous: Option<String> = None;

        for (task, agent) in &self.steps {
            info!(task = %task.name, role = %agent.role, tools = ?agent.tools.display_names(), "Starting task");
            let output = self.run_task(task, agent, previous.as_deref(), ctx).await?;

            if let Some(path) = &task.output_file {
                // The report is also returned and stored on the job
                if let Err(e) = write_report(path, &output).await {
                    warn!(path = %path.display(), error = %e, "Failed to write report file");
                }
            }
            previous = Some(output);
        }

        previous.ok_or_else(|| AppError::Agent("crew has no tasks".to_string()))
    }
}

async fn write_report(path: &Path, report: &str) -> AppResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, report).await?;
    info!(path = %path.display(), bytes = report.len(), "Report written");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::llm::LLMAdapter;
    use crate::types::{LLMResponse, TokenUsage, ToolCall};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<AppResult<LLMResponse>>>,
        pub requests: Mutex<Vec<LLMRequest>>,
    }

    impl ScriptedModel {
        pub fn new(responses: Vec<AppResult<LLMResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn llm(self: &Arc<Self>) -> Arc<LLM> {
            Arc::new(LLM::with_adapter("scripted", Box::new(self.clone())))
        }
    }

    #[async_trait]
    impl LLMAdapter for Arc<ScriptedModel> {
        async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Agent("script exhausted".to_string())))
        }
    }

    pub fn text(content: &str) -> AppResult<LLMResponse> {
        Ok(LLMResponse {
            content: content.to_string(),
            finish_reason: "stop".to_string(),
            usage: TokenUsage::default(),
            tool_calls: Vec::new(),
        })
    }

    pub fn tool_call(name: &str, args: &str) -> AppResult<LLMResponse> {
        Ok(LLMResponse {
            content: String::new(),
            finish_reason: "tool_calls".to_string(),
            usage: TokenUsage::default(),
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments: args.to_string(),
            }],
        })
    }

    pub fn settings() -> ModelSettings {
        ModelSettings {
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.5,
            max_tokens: 2048,
        }
    }
}
