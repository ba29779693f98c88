//! Streaming LLM adapters over HTTP.
//!
//! Supports OpenAI-compatible and Anthropic APIs, selected via environment variables.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::model::{Chat, Model};
use crate::sse::SseBuffer;
use crate::types::{Attachment, ChatListener, ChatMessage, Role};

const MAX_TOKENS: u32 = 8192;
const THINKING_BUDGET: u32 = 2048;

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-5-mini",
            Self::Anthropic => "claude-sonnet-4.5",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

struct HttpConfig {
    provider: LlmProvider,
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

/// Model backed by a streaming HTTP API.
pub struct HttpModel {
    config: Arc<HttpConfig>,
}

impl HttpModel {
    pub fn new(provider: LlmProvider, api_key: String, model: Option<String>) -> Self {
        Self {
            config: Arc::new(HttpConfig {
                provider,
                api_key,
                model: model.unwrap_or_else(|| provider.default_model().to_string()),
                base_url: provider.default_base_url().to_string(),
                client: reqwest::Client::new(),
            }),
        }
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        let config = &self.config;
        Self {
            config: Arc::new(HttpConfig {
                provider: config.provider,
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                client: config.client.clone(),
            }),
        }
    }

    /// Create a model from environment variables
    ///
    /// Checks in order:
    /// 1. OPENAI_API_KEY
    /// 2. ANTHROPIC_API_KEY
    ///
    /// `FORGE_LLM_MODEL` and `FORGE_LLM_BASE_URL` override the defaults.
    pub fn from_env() -> ChatResult<Self> {
        let custom_model = std::env::var("FORGE_LLM_MODEL").ok().filter(|m| !m.is_empty());
        let base_url = std::env::var("FORGE_LLM_BASE_URL").ok().filter(|u| !u.is_empty());

        let provider = [
            ("OPENAI_API_KEY", LlmProvider::OpenAI),
            ("ANTHROPIC_API_KEY", LlmProvider::Anthropic),
        ]
        .into_iter()
        .find_map(|(var, provider)| {
            std::env::var(var)
                .ok()
                .filter(|key| !key.is_empty())
                .map(|key| (provider, key))
        });

        let (provider, api_key) = provider.ok_or(ChatError::NotConfigured)?;
        let model = Self::new(provider, api_key, custom_model);
        Ok(match base_url {
            Some(url) => model.with_base_url(url),
            None => model,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

impl Model for HttpModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn create_chat(&self, output_thought: bool) -> Box<dyn Chat> {
        Box::new(HttpChat {
            config: Arc::clone(&self.config),
            output_thought,
            history: Vec::new(),
        })
    }
}

/// A streamed fragment of a reply.
#[derive(Debug, PartialEq, Eq)]
enum Delta {
    Content(String),
    Thought(String),
}

struct HttpChat {
    config: Arc<HttpConfig>,
    output_thought: bool,
    history: Vec<ChatMessage>,
}

impl HttpChat {
    fn request(&self, text: &str, attachments: &[Attachment]) -> reqwest::RequestBuilder {
        let config = &self.config;
        match config.provider {
            LlmProvider::OpenAI => config
                .client
                .post(format!("{}/chat/completions", config.base_url))
                .header("Authorization", format!("Bearer {}", config.api_key))
                .json(&openai_body(
                    &config.model,
                    &self.history,
                    text,
                    attachments,
                )),
            LlmProvider::Anthropic => config
                .client
                .post(format!("{}/messages", config.base_url))
                .header("x-api-key", &config.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&anthropic_body(
                    &config.model,
                    &self.history,
                    text,
                    attachments,
                    self.output_thought,
                )),
        }
    }

    fn parse(&self, data: &str) -> ChatResult<Vec<Delta>> {
        match self.config.provider {
            LlmProvider::OpenAI => parse_openai_event(data),
            LlmProvider::Anthropic => parse_anthropic_event(data),
        }
    }
}

#[async_trait]
impl Chat for HttpChat {
    async fn send(
        &mut self,
        text: &str,
        attachments: &[Attachment],
        listener: &mut dyn ChatListener,
        cancel: &CancellationToken,
    ) -> ChatResult<String> {
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        debug!(
            "Sending {} chars and {} attachment(s) to {}",
            text.len(),
            attachments.len(),
            self.config.model
        );
        let request = self.request(text, attachments);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            response = request.send() => response.map_err(|e| ChatError::Request(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}", status);
            return Err(ChatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut sse = SseBuffer::new();
        let mut content = String::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| ChatError::Stream(e.to_string()))?;

            for data in sse.push(&chunk) {
                for delta in self.parse(&data)? {
                    match delta {
                        Delta::Content(s) => {
                            listener.on_content(&s);
                            content.push_str(&s);
                        }
                        Delta::Thought(s) if self.output_thought => listener.on_thought(&s),
                        Delta::Thought(_) => {}
                    }
                }
            }
        }

        if content.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        self.history.push(ChatMessage::user(text));
        self.history.push(ChatMessage::assistant(content.clone()));
        Ok(content)
    }

    fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

fn openai_body(
    model: &str,
    history: &[ChatMessage],
    text: &str,
    attachments: &[Attachment],
) -> Value {
    let mut messages: Vec<Value> = history
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut parts = vec![json!({ "type": "text", "text": text })];
    for attachment in attachments {
        if attachment.is_image() {
            parts.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", attachment.mime_type, attachment.base64())
                }
            }));
        } else {
            parts.push(json!({ "type": "text", "text": attachment.as_text() }));
        }
    }
    messages.push(json!({ "role": Role::User.as_str(), "content": parts }));

    json!({
        "model": model,
        "messages": messages,
        "stream": true,
        "max_completion_tokens": MAX_TOKENS,
    })
}

fn anthropic_body(
    model: &str,
    history: &[ChatMessage],
    text: &str,
    attachments: &[Attachment],
    output_thought: bool,
) -> Value {
    let mut messages: Vec<Value> = history
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut parts = Vec::new();
    for attachment in attachments {
        if attachment.is_image() {
            parts.push(json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": attachment.mime_type,
                    "data": attachment.base64(),
                }
            }));
        } else {
            parts.push(json!({ "type": "text", "text": attachment.as_text() }));
        }
    }
    parts.push(json!({ "type": "text", "text": text }));
    messages.push(json!({ "role": Role::User.as_str(), "content": parts }));

    let mut body = json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "messages": messages,
        "stream": true,
    });
    if output_thought {
        body["thinking"] = json!({ "type": "enabled", "budget_tokens": THINKING_BUDGET });
    }
    body
}

// OpenAI stream types
#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

fn parse_openai_event(data: &str) -> ChatResult<Vec<Delta>> {
    let chunk: OpenAIChunk = serde_json::from_str(data)?;
    let mut deltas = Vec::new();
    for choice in chunk.choices {
        if let Some(thought) = choice.delta.reasoning_content.filter(|s| !s.is_empty()) {
            deltas.push(Delta::Thought(thought));
        }
        if let Some(content) = choice.delta.content.filter(|s| !s.is_empty()) {
            deltas.push(Delta::Content(content));
        }
    }
    Ok(deltas)
}

// Anthropic stream types
#[derive(Debug, Deserialize)]
struct AnthropicEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<AnthropicDelta>,
    error: Option<AnthropicError>,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    text: Option<String>,
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    message: String,
}

fn parse_anthropic_event(data: &str) -> ChatResult<Vec<Delta>> {
    let event: AnthropicEvent = serde_json::from_str(data)?;
    match event.event_type.as_str() {
        "content_block_delta" => {
            let mut deltas = Vec::new();
            if let Some(delta) = event.delta {
                if let Some(thinking) = delta.thinking {
                    deltas.push(Delta::Thought(thinking));
                }
                if let Some(text) = delta.text {
                    deltas.push(Delta::Content(text));
                }
            }
            Ok(deltas)
        }
        "error" => Err(ChatError::Stream(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string()),
        )),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_models() {
        let openai = HttpModel::new(LlmProvider::OpenAI, "key".to_string(), None);
        assert_eq!(openai.model(), "gpt-5-mini");

        let anthropic = HttpModel::new(LlmProvider::Anthropic, "key".to_string(), None);
        assert_eq!(anthropic.model(), "claude-sonnet-4.5");
    }

    #[test]
    fn test_custom_model_and_base_url() {
        let model = HttpModel::new(
            LlmProvider::OpenAI,
            "key".to_string(),
            Some("qwen-coder".to_string()),
        )
        .with_base_url("http://localhost:8000/v1/");
        assert_eq!(model.name(), "qwen-coder");
        assert_eq!(model.config.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn test_parse_openai_deltas() {
        let data = r#"{"choices":[{"delta":{"reasoning_content":"hmm","content":"class"}}]}"#;
        assert_eq!(
            parse_openai_event(data).unwrap(),
            vec![
                Delta::Thought("hmm".to_string()),
                Delta::Content("class".to_string())
            ]
        );
        assert!(parse_openai_event(r#"{"choices":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_anthropic_deltas() {
        let text = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Foo"}}"#;
        assert_eq!(
            parse_anthropic_event(text).unwrap(),
            vec![Delta::Content("Foo".to_string())]
        );
        let ping = r#"{"type":"ping"}"#;
        assert!(parse_anthropic_event(ping).unwrap().is_empty());
        let error = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert!(parse_anthropic_event(error).unwrap_err().is_transient());
    }

    #[test]
    fn test_bodies_carry_history_and_attachments() {
        let history = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
        let attachments = vec![Attachment::png("shot.png", vec![1, 2, 3])];

        let body = openai_body("m", &history, "fix it", &attachments);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["messages"][2]["content"][1]["type"], json!("image_url"));

        let body = anthropic_body("m", &history, "fix it", &attachments, true);
        assert_eq!(body["messages"][2]["content"][0]["type"], json!("image"));
        assert_eq!(body["thinking"]["budget_tokens"], json!(THINKING_BUDGET));
    }
}
