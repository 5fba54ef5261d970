//! Streaming chat-completion client

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// One role-tagged message on the LLM wire
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Optional generation knobs; `None` leaves the provider default
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Stream of completion text fragments
pub type TokenStream = Pin<Box<dyn futures_util::Stream<Item = Result<String>> + Send>>;

/// Streaming language model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a streaming completion for the given messages
    async fn stream_chat(&self, messages: &[PromptMessage], params: &GenerationParams) -> Result<TokenStream>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// OpenAI-compatible chat-completions client. The response is a line-framed
/// event stream where each `data:` line carries either `[DONE]` or a JSON
/// delta with `choices[0].delta.content`.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: String,
}

impl OpenAiChatModel {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_chat(&self, messages: &[PromptMessage], params: &GenerationParams) -> Result<TokenStream> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            stream: true,
            temperature: params.temperature.or(self.config.temperature),
            top_p: params.top_p.or(self.config.top_p),
            max_tokens: params.max_tokens.or(self.config.max_tokens),
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("chat request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!(
                "chat api returned {}: {}",
                status, body
            )));
        }

        // Event lines can straddle network chunks, so carry a partial-line
        // buffer across reads.
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Unavailable(format!("chat stream: {}", e))))
            .scan(String::new(), |buffer, chunk| {
                let fragments: Vec<Result<String>> = match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        let mut out = Vec::new();
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim_end_matches('\r').to_string();
                            buffer.drain(..=pos);
                            if let Some(fragment) = parse_event_line(&line) {
                                out.push(Ok(fragment));
                            }
                        }
                        out
                    }
                    Err(e) => vec![Err(e)],
                };
                futures_util::future::ready(Some(futures_util::stream::iter(fragments)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

fn parse_event_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ")?.trim();
    if data == "[DONE]" {
        return None;
    }
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let content = chunk.choices.into_iter().next()?.delta.content;
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_line_parsing() {
        let line = r#"data: {"choices":[{"delta":{"content":"你好"}}]}"#;
        assert_eq!(parse_event_line(line).as_deref(), Some("你好"));

        assert_eq!(parse_event_line("data: [DONE]"), None);
        assert_eq!(parse_event_line(": keep-alive"), None);
        assert_eq!(parse_event_line(r#"data: {"choices":[]}"#), None);
    }
}
