//! Backend REST client (`/api/*` endpoints).
//! Supports the agent-run triggers, message posting, the recommendations CSV download, and the
//! server-sent conversation stream.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client for the backend HTTP API.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend api error: {0}")]
    Api(String),
    #[error("backend reported an error: {0}")]
    Backend(String),
    #[error("message is empty")]
    EmptyMessage,
}

/// Response of `start-agents` / `start-agents-with-prompt`. Older backends return the whole
/// conversation; streaming backends return only a status and push messages over the socket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartAgentsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conversation: Vec<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    message: &'a str,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(crate::config::resolve_base_url(config))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST /api/start-agents: run the agents with the backend's default prompt.
    pub async fn start_agents(&self) -> Result<StartAgentsResponse, ApiError> {
        let res = self.client.post(self.url("/api/start-agents")).send().await?;
        Self::start_response(res).await
    }

    /// POST /api/start-agents-with-prompt: run the agents with a custom prompt.
    pub async fn start_agents_with_prompt(
        &self,
        prompt: &str,
    ) -> Result<StartAgentsResponse, ApiError> {
        let res = self
            .client
            .post(self.url("/api/start-agents-with-prompt"))
            .json(&PromptRequest { prompt })
            .send()
            .await?;
        Self::start_response(res).await
    }

    /// POST /api/send-message: deliver a user message without the socket.
    pub async fn send_message(&self, message: &str) -> Result<Value, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ApiError::EmptyMessage);
        }
        let res = self
            .client
            .post(self.url("/api/send-message"))
            .json(&MessageRequest { message })
            .send()
            .await?;
        let res = Self::check_status(res).await?;
        let data: Value = res.json().await?;
        if let Some(err) = data.get("error").and_then(Value::as_str) {
            return Err(ApiError::Backend(err.to_string()));
        }
        Ok(data)
    }

    /// GET /api/download-recommendations: the recommendations as CSV text.
    pub async fn download_recommendations(&self) -> Result<String, ApiError> {
        let res = self
            .client
            .get(self.url("/api/download-recommendations"))
            .send()
            .await?;
        let res = Self::check_status(res).await?;
        let text = res.text().await?;
        // A missing file is reported as a JSON body with a 200 status.
        if text.trim_start().starts_with('{') {
            if let Ok(v) = serde_json::from_str::<Value>(&text) {
                if let Some(err) = v.get("error").and_then(Value::as_str) {
                    return Err(ApiError::Backend(err.to_string()));
                }
            }
        }
        Ok(text)
    }

    /// GET /api/stream-conversation: server-sent events, one JSON message per event. Calls
    /// `on_message` for each parsed event until the server ends the stream. Malformed events are
    /// logged and skipped.
    pub async fn stream_conversation(
        &self,
        on_message: &mut (dyn FnMut(Value) + Send),
    ) -> Result<(), ApiError> {
        let res = self
            .client
            .get(self.url("/api/stream-conversation"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let res = Self::check_status(res).await?;
        let mut stream = res.bytes_stream();
        let mut parser = SseParser::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for data in parser.push(&chunk) {
                deliver(&data, on_message);
            }
        }
        if let Some(data) = parser.finish() {
            deliver(&data, on_message);
        }
        Ok(())
    }

    async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("{} {}", status, body)));
        }
        Ok(res)
    }

    async fn start_response(res: reqwest::Response) -> Result<StartAgentsResponse, ApiError> {
        let res = Self::check_status(res).await?;
        let data: StartAgentsResponse = res.json().await?;
        if let Some(err) = data.error.as_deref() {
            return Err(ApiError::Backend(err.to_string()));
        }
        if data.status.as_deref() == Some("error") {
            return Err(ApiError::Backend("agent run failed to start".to_string()));
        }
        Ok(data)
    }
}

fn deliver(data: &str, on_message: &mut (dyn FnMut(Value) + Send)) {
    match serde_json::from_str::<Value>(data) {
        Ok(v) => on_message(v),
        Err(e) => log::warn!("dropping malformed stream event: {}", e),
    }
}

/// Incremental `text/event-stream` parser. Collects `data:` lines and yields the joined data of
/// each event when a blank line ends it; other fields and comments are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseParser {
    /// Feed a chunk; returns the data of every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..i).collect();
            self.buffer.drain(..1);
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                if let Some(ev) = self.take_event() {
                    events.push(ev);
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        events
    }

    /// Flush an event left unterminated when the stream ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).to_string();
            if let Some(d) = rest.trim_end_matches('\r').strip_prefix("data:") {
                self.data.push(d.strip_prefix(' ').unwrap_or(d).to_string());
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}
