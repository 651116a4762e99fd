use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use cognito_research::agents::{execute_research_pipeline, CrewConfig};
use cognito_research::embeddings::create_embedder;
use cognito_research::models::ResearchRequest;
use cognito_research::utils::{init_logger, Throttle};
use cognito_research::{create_router, AppState, Config};

/// Cognito research agent
#[derive(Parser)]
#[command(name = "cognito")]
#[command(author, version, about = "Single-agent web research with a vector-backed job store", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the UI and JSON API (default)
    Serve,

    /// Run one research job and print the report
    Research {
        #[arg(short, long)]
        topic: String,

        #[arg(short, long)]
        user_id: Option<String>,
    },

    /// List recent jobs
    History {
        #[arg(short, long)]
        user_id: Option<String>,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show one job record
    Job {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger();

    let config = Config::from_env()?;
    info!(server = ?config.server, backend = ?config.pinecone.backend, "Configuration loaded");
    let state = build_state(config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(state).await,
        Commands::Research { topic, user_id } => {
            let mut request = ResearchRequest::new(topic);
            request.user_id = user_id;
            let response = execute_research_pipeline(&state, request).await?;

            match response.report {
                Some(report) => println!("{}", report),
                None => {
                    let message = response.user_message.or(response.error).unwrap_or_default();
                    anyhow::bail!("Research job {} failed: {}", response.job_id, message);
                }
            }
            Ok(())
        }
        Commands::History { user_id, limit } => {
            let ops = state.operations(None).await?;
            for summary in ops.get_job_history(user_id.as_deref(), limit).await {
                let job = summary.job;
                println!("{}  {}  {:<8}  {}", job.created_at, job.job_id, job.status.as_str(), job.topic);
            }
            Ok(())
        }
        Commands::Job { id } => {
            let ops = state.operations(None).await?;
            let job = ops
                .get_job(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Job {} not found", id))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
    }
}

fn build_state(config: Config) -> Result<AppState> {
    let embedder = create_embedder(&config.embedding)?;
    let throttle = Throttle::per_minute(config.orchestrator.tokens_per_minute)?;
    let crew_config = CrewConfig::load(
        config.orchestrator.agents_config.as_deref(),
        config.orchestrator.tasks_config.as_deref(),
    )?;

    Ok(AppState::new(config, embedder, Arc::new(throttle), crew_config))
}

async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
