use axum::{response::Html, routing::get, Router};

use crate::models::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

async fn index() -> Html<&'static str> {
    Html(r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Cognito Research Agent</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 2rem; color: #1d1d1f; max-width: 960px; }
    h1 { margin-bottom: 0.5rem; }
    .card { border: 1px solid #ddd; padding: 1rem; border-radius: 8px; margin-bottom: 1rem; }
    label { display: block; margin-top: 0.75rem; font-weight: 600; }
    input { width: 100%; padding: 0.5rem; box-sizing: border-box; }
    button { margin-top: 1rem; padding: 0.6rem 1rem; }
    .report { background: #f6f8fa; padding: 1rem; overflow: auto; line-height: 1.5; }
    .report code { background: #e8eaed; padding: 0 0.2rem; }
    .status { margin-top: 0.75rem; font-weight: 600; }
    .error { color: #b00020; }
    li { margin-bottom: 0.4rem; cursor: pointer; }
  </style>
</head>
<body>
  <h1>Cognito Research Agent</h1>
  <p>Enter a topic and the agent searches the web, stores its sources and writes a markdown report.</p>

  <div class="card">
    <h2>Access and API keys</h2>
    <label>Access password</label>
    <input id="password" type="password" autocomplete="current-password" />
    <label>SerpAPI key</label>
    <input id="serpapiKey" type="password" placeholder="Uses the server key when empty" />
    <label>Pinecone API key</label>
    <input id="pineconeKey" type="password" placeholder="Uses the server key when empty" />
    <label>Groq API key</label>
    <input id="groqKey" type="password" placeholder="Uses the server key when empty" />
  </div>

  <div class="card">
    <h2>Research</h2>
    <label>Topic</label>
    <input id="topic" placeholder="e.g. Rust async runtimes" />
    <button id="researchBtn">Start research</button>
    <div id="status" class="status"></div>
  </div>

  <div class="card">
    <h2>Report</h2>
    <div id="report" class="report"></div>
  </div>

  <div class="card">
    <h2>History</h2>
    <button id="historyBtn">Refresh history</button>
    <ul id="history"></ul>
  </div>

  <script>
    const fields = ['password', 'serpapiKey', 'pineconeKey', 'groqKey'];
    for (const id of fields) {
      const el = document.getElementById(id);
      el.value = sessionStorage.getItem(id) || '';
      el.addEventListener('change', () => sessionStorage.setItem(id, el.value));
    }

    function escapeHtml(text) {
      return text.replace(/&/g, '&amp;').replace(/</g, '&lt;').replace(/>/g, '&gt;')
        .replace(/"/g, '&quot;').replace(/'/g, '&#39;');
    }

    function inline(text) {
      return escapeHtml(text)
        .replace(/`([^`]+)`/g, '<code>$1</code>')
        .replace(/\*\*([^*]+)\*\*/g, '<strong>$1</strong>')
        .replace(/\*([^*]+)\*/g, '<em>$1</em>')
        .replace(/\[([^\]]+)\]\((https?:[^)\s]+)\)/g, '<a href="$2" target="_blank" rel="noopener">$1</a>')
        .replace(/(^|[\s(])(https?:\/\/[^\s)<]+)/g, '$1<a href="$2" target="_blank" rel="noopener">$2</a>');
    }

    // Headings, lists, paragraphs and inline emphasis; input is escaped first.
    function renderMarkdown(markdown) {
      const html = [];
      let list = null;
      let paragraph = [];
      const flushParagraph = () => {
        if (paragraph.length) html.push('<p>' + inline(paragraph.join(' ')) + '</p>');
        paragraph = [];
      };
      const closeList = () => {
        if (list) html.push('</' + list + '>');
        list = null;
      };
      for (const raw of markdown.split('\n')) {
        const line = raw.trimEnd();
        const heading = line.match(/^(#{1,6})\s+(.*)$/);
        const bullet = line.match(/^\s*[-*+]\s+(.*)$/);
        const numbered = line.match(/^\s*\d+[.)]\s+(.*)$/);
        if (heading) {
          flushParagraph(); closeList();
          const level = heading[1].length;
          html.push('<h' + level + '>' + inline(heading[2]) + '</h' + level + '>');
        } else if (bullet || numbered) {
          flushParagraph();
          const kind = bullet ? 'ul' : 'ol';
          if (list !== kind) { closeList(); html.push('<' + kind + '>'); list = kind; }
          html.push('<li>' + inline((bullet || numbered)[1]) + '</li>');
        } else if (!line.trim()) {
          flushParagraph(); closeList();
        } else {
          closeList();
          paragraph.push(line.trim());
        }
      }
      flushParagraph(); closeList();
      return html.join('\n');
    }

    function showReport(markdown) {
      reportEl.innerHTML = renderMarkdown(markdown || '');
    }

    const value = (id) => document.getElementById(id).value.trim();
    const statusEl = document.getElementById('status');
    const reportEl = document.getElementById('report');

    function headers() {
      const h = { 'Content-Type': 'application/json', 'x-access-password': value('password') };
      if (value('pineconeKey')) h['x-pinecone-api-key'] = value('pineconeKey');
      return h;
    }

    function setStatus(text, isError) {
      statusEl.textContent = text;
      statusEl.className = isError ? 'status error' : 'status';
    }

    async function call(path, options) {
      const res = await fetch(path, { headers: headers(), ...options });
      const json = await res.json();
      if (!res.ok) throw new Error(json.user_message || json.error || res.statusText);
      return json;
    }

    document.getElementById('researchBtn').addEventListener('click', async () => {
      const topic = value('topic');
      if (!topic) {
        setStatus('Enter a topic first.', true);
        return;
      }
      setStatus('Researching "' + topic + '". This can take a few minutes...', false);
      reportEl.textContent = '';
      try {
        const body = { topic };
        if (value('serpapiKey')) body.serpapi_api_key = value('serpapiKey');
        if (value('pineconeKey')) body.pinecone_api_key = value('pineconeKey');
        if (value('groqKey')) body.groq_api_key = value('groqKey');
        const job = await call('/api/research', { method: 'POST', body: JSON.stringify(body) });
        if (job.status === 'complete') {
          setStatus('Complete: job ' + job.job_id + ' (' + job.source_count + ' sources, ' +
            job.processing_time_seconds.toFixed(1) + 's)', false);
          showReport(job.report);
        } else {
          setStatus('Failed: ' + (job.user_message || job.error), true);
        }
        loadHistory();
      } catch (err) {
        setStatus(err.message, true);
      }
    });

    async function showJob(jobId) {
      try {
        const job = await call('/api/jobs/' + encodeURIComponent(jobId), { method: 'GET' });
        setStatus('Job ' + job.job_id + ': ' + job.status, job.status === 'error');
        if (job.report) showReport(job.report); else reportEl.textContent = job.error_message || '';
      } catch (err) {
        setStatus(err.message, true);
      }
    }

    async function loadHistory() {
      const list = document.getElementById('history');
      try {
        const jobs = await call('/api/jobs?limit=10', { method: 'GET' });
        list.innerHTML = '';
        for (const job of jobs) {
          const item = document.createElement('li');
          item.textContent = job.created_at + ' | ' + job.topic + ' | ' + job.status;
          item.addEventListener('click', () => showJob(job.job_id));
          list.appendChild(item);
        }
        if (!jobs.length) list.innerHTML = '<li>No research yet.</li>';
      } catch (err) {
        list.innerHTML = '';
        setStatus(err.message, true);
      }
    }

    document.getElementById('historyBtn').addEventListener('click', loadHistory);
  </script>
</body>
</html>
"#)
}
