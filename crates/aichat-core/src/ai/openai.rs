use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::sse::{SseDecoder, SseEvent};
use crate::error::{ChatError, ChatResult};
use crate::state::ChatMessage;

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIErrorBody>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: Option<OpenAIDelta>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIErrorEnvelope {
    error: OpenAIErrorBody,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIModel {
    id: String,
}

#[derive(Deserialize)]
struct OpenAIModelsResponse {
    data: Vec<OpenAIModel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Longest wait for the next piece of a streamed body
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeouts: Timeouts,
}

impl OpenAIClient {
    pub fn new(api_key: &str, base_url: &str) -> ChatResult<Self> {
        Self::with_timeouts(api_key, base_url, Timeouts::default())
    }

    pub fn with_timeouts(api_key: &str, base_url: &str, timeouts: Timeouts) -> ChatResult<Self> {
        let client = Client::builder().connect_timeout(timeouts.connect).build()?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeouts,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Start a streamed chat completion over the full transcript
    pub async fn chat_stream(&self, model: &str, messages: &[ChatMessage]) -> ChatResult<ChatStream> {
        let request = OpenAIRequest {
            model,
            messages,
            stream: true,
        };

        info!(model, messages = messages.len(), "sending chat completion request");

        let send = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();
        let response = tokio::time::timeout(self.timeouts.read, send)
            .await
            .map_err(|_| ChatError::Timeout("response headers".to_string()))?
            .map_err(|e| request_error(e, "connection"))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
        Ok(ChatStream {
            body: Box::pin(body),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            read_timeout: self.timeouts.read,
            done: false,
        })
    }

    pub async fn list_models(&self) -> ChatResult<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(&self.api_key)
            .timeout(self.timeouts.read)
            .send()
            .await
            .map_err(|e| request_error(e, "model list"))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let models_response: OpenAIModelsResponse = response
            .json()
            .await
            .map_err(|e| request_error(e, "model list"))?;
        let mut model_names: Vec<String> = models_response
            .data
            .into_iter()
            .map(|model| model.id)
            .collect();
        model_names.sort();

        Ok(model_names)
    }
}

/// reqwest's own connect and request timeouts surface as `Timeout` too
fn request_error(e: reqwest::Error, stage: &str) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(stage.to_string())
    } else {
        ChatError::Http(e)
    }
}

async fn api_error(response: reqwest::Response) -> ChatError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    ChatError::Api {
        status,
        message: error_message(&text),
    }
}

/// Prefer the structured `error.message`, otherwise the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<OpenAIErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Incoming reply text, one delta at a time
pub struct ChatStream {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    read_timeout: Duration,
    done: bool,
}

impl ChatStream {
    /// Next non-empty piece of content, or `None` once the reply is complete
    pub async fn next_delta(&mut self) -> ChatResult<Option<String>> {
        loop {
            if let Some(delta) = self.pending.pop_front() {
                return Ok(Some(delta));
            }
            if self.done {
                return Ok(None);
            }

            let events = match tokio::time::timeout(self.read_timeout, self.body.next()).await {
                Err(_) => return Err(ChatError::Timeout("response data".to_string())),
                Ok(None) => {
                    self.done = true;
                    self.decoder.finish()
                }
                Ok(Some(Err(e))) => return Err(request_error(e, "response data")),
                Ok(Some(Ok(bytes))) => self.decoder.feed(&bytes),
            };

            for event in events {
                match event {
                    SseEvent::Done => {
                        debug!("stream reported [DONE]");
                        self.done = true;
                    }
                    SseEvent::Data(payload) => {
                        if let Some(delta) = parse_delta(&payload)? {
                            self.pending.push_back(delta);
                        }
                    }
                }
            }
        }
    }

    /// Drain the stream into a single string
    pub async fn collect_text(mut self) -> ChatResult<String> {
        let mut text = String::new();
        while let Some(delta) = self.next_delta().await? {
            text.push_str(&delta);
        }
        Ok(text)
    }
}

fn parse_delta(payload: &str) -> ChatResult<Option<String>> {
    let chunk: OpenAIStreamChunk = serde_json::from_str(payload)?;
    if let Some(error) = chunk.error {
        return Err(ChatError::Api {
            status: 200,
            message: error.message.unwrap_or_else(|| payload.to_string()),
        });
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_content() {
        let payload = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), Some("Hi".to_string()));
    }

    #[test]
    fn test_parse_delta_skips_role_only_and_empty_choices() {
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), None);
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap(), None);
        assert_eq!(parse_delta(r#"{"choices":[]}"#).unwrap(), None);
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{"content":null},"finish_reason":"stop"}]}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_delta_error_payload() {
        let err = parse_delta(r#"{"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(matches!(err, ChatError::Api { ref message, .. } if message == "overloaded"));
    }

    #[test]
    fn test_parse_delta_malformed_json() {
        assert!(matches!(parse_delta("{not json"), Err(ChatError::Json(_))));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Invalid API key","type":"auth"}}"#),
            "Invalid API key"
        );
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OpenAIClient::new("k", "https://api.example.com/v1/").unwrap();
        assert_eq!(
            client.endpoint("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }
}
