//! Ollama API client (http://localhost:11434 by default).
//! Streaming chat via /api/chat (NDJSON) with a single-prompt /api/generate
//! fallback for servers without the multi-turn endpoint.

use crate::chats::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for the Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP error status {status}. Try checking if the model '{model}' is available.")]
    Connectivity {
        status: reqwest::StatusCode,
        model: String,
    },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("ollama api error: {0}")]
    Api(String),
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/tags — list available models.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: TagsResponse = res.json().await?;
        Ok(data.models.unwrap_or_default())
    }

    /// Open the streaming response for a conversation. POSTs the role-tagged
    /// history to /api/chat first; a non-success status falls back to
    /// /api/generate with the history flattened into a single prompt. A
    /// non-success status from the fallback too is a Connectivity error.
    pub async fn open_stream(
        &self,
        model: &str,
        history: &[TurnMessage],
    ) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            stream: true,
            messages: history,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if res.status().is_success() {
            return Ok(res);
        }

        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt: flatten_history(history),
            stream: true,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            return Err(LlmError::Connectivity {
                status: res.status(),
                model: model.to_string(),
            });
        }
        Ok(res)
    }
}

/// One role-tagged turn as both endpoints' request bodies expect it.
#[derive(Debug, Clone, Serialize)]
pub struct TurnMessage {
    pub role: &'static str,
    pub content: String,
}

impl From<&ChatMessage> for TurnMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: message.content.clone(),
        }
    }
}

/// Flatten the history into alternating "Human:"/"Assistant:" turns with a
/// terminal "Assistant:" cue, for the /api/generate fallback.
fn flatten_history(history: &[TurnMessage]) -> String {
    let turns: Vec<String> = history
        .iter()
        .map(|m| {
            let speaker = if m.role == "user" { "Human" } else { "Assistant" };
            format!("{}: {}", speaker, m.content)
        })
        .collect();
    format!("{}\n\nAssistant:", turns.join("\n\n"))
}

/// One newline-delimited record of a streaming response, resolved into the
/// variant the engine acts on. Both endpoint shapes normalize here: the
/// multi-turn endpoint nests content under `message.content`, the fallback
/// carries it in `response`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRecord {
    /// Content to append to the answer (may be empty).
    Delta(String),
    /// Completion marker; carries nothing to merge.
    Done,
    /// Server-reported failure; terminates the stream.
    Error(String),
}

impl StreamRecord {
    /// Parse one line. An explicit error field wins over everything else; a
    /// completion flag wins over any content it happens to carry.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let wire: RecordWire = serde_json::from_str(line)?;
        if let Some(error) = wire.error {
            return Ok(StreamRecord::Error(error));
        }
        if wire.done {
            return Ok(StreamRecord::Done);
        }
        let content = wire
            .response
            .or(wire.message.map(|m| m.content))
            .unwrap_or_default();
        Ok(StreamRecord::Delta(content))
    }
}

#[derive(Debug, Deserialize)]
struct RecordWire {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModel>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [TurnMessage],
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_variant_content() {
        let record = StreamRecord::parse(r#"{"message":{"role":"assistant","content":"Hi"}}"#)
            .expect("parse");
        assert_eq!(record, StreamRecord::Delta("Hi".to_string()));
    }

    #[test]
    fn parse_generate_variant_content() {
        let record = StreamRecord::parse(r#"{"response":"Hi"}"#).expect("parse");
        assert_eq!(record, StreamRecord::Delta("Hi".to_string()));
    }

    #[test]
    fn parse_error_wins_over_content() {
        let record =
            StreamRecord::parse(r#"{"response":"Hi","error":"model not found"}"#).expect("parse");
        assert_eq!(record, StreamRecord::Error("model not found".to_string()));
    }

    #[test]
    fn parse_done_wins_over_content() {
        let record =
            StreamRecord::parse(r#"{"message":{"role":"assistant","content":""},"done":true}"#)
                .expect("parse");
        assert_eq!(record, StreamRecord::Done);
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(StreamRecord::parse("keepalive noise").is_err());
    }

    #[test]
    fn flatten_formats_turns_with_assistant_cue() {
        let history = vec![
            TurnMessage {
                role: "user",
                content: "Hello".to_string(),
            },
            TurnMessage {
                role: "assistant",
                content: "Hi!".to_string(),
            },
            TurnMessage {
                role: "user",
                content: "Tell me more".to_string(),
            },
        ];
        assert_eq!(
            flatten_history(&history),
            "Human: Hello\n\nAssistant: Hi!\n\nHuman: Tell me more\n\nAssistant:"
        );
    }
}
