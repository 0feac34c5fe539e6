//! OpenAI-compatible model provider.
//!
//! Serves both the embeddings endpoint and streaming chat completions. Works
//! with OpenAI and any endpoint that follows the same API shape (Ollama, vLLM,
//! LM Studio). Streaming responses are parsed incrementally from the SSE body.

use super::{ChatCompletions, ChunkStream, Embeddings, ModelClient, map_http_error, map_send_error};
use crate::config::{OpenAiConfig, resolve_api_key};
use crate::error::{ConfigError, ProviderError};
use crate::types::{ChatCompletionChunk, ConversationMessage, EmbeddingResponse, EmbeddingVector};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{Value, json};
use std::pin::Pin;
use tracing::{debug, warn};

const PROVIDER: &str = "OpenAI";

/// OpenAI-compatible client for embeddings and chat completions.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    embeddings_enabled: bool,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("embeddings_enabled", &self.embeddings_enabled)
            .finish()
    }
}

impl OpenAiClient {
    /// Create a client from configuration.
    ///
    /// Reads the API key from `config.api_key` or the environment variable
    /// named by `config.api_key_env`. Local endpoints work without a key.
    pub fn new(config: &OpenAiConfig) -> Result<Self, ConfigError> {
        let api_key = match resolve_api_key(config.api_key.as_deref(), &config.api_key_env) {
            Ok(key) => key,
            Err(_) if is_local(&config.base_url) => {
                debug!("No API key set for local provider; using dummy bearer token");
                "ollama".to_string()
            }
            Err(e) => return Err(e),
        };
        Ok(Self::with_key(config, api_key))
    }

    /// Create a client with an explicitly provided API key.
    pub fn with_key(config: &OpenAiConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            embeddings_enabled: config.embeddings_enabled,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert messages to OpenAI JSON format.
    fn messages_to_json(messages: &[ConversationMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            })
            .collect()
    }
}

fn is_local(base_url: &str) -> bool {
    base_url.contains("localhost") || base_url.contains("127.0.0.1")
}

#[async_trait]
impl Embeddings for OpenAiClient {
    async fn create_embedding(
        &self,
        model: &str,
        input: &str,
    ) -> Result<EmbeddingVector, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": model,
            "input": input,
            "encoding_format": "float",
        });

        debug!(url = %url, model = %model, input_len = input.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER, status, &body_text));
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::ResponseParse {
                    message: format!("Invalid embedding response: {}", e),
                })?;
        parsed.into_first()
    }
}

#[async_trait]
impl ChatCompletions for OpenAiClient {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ConversationMessage],
    ) -> Result<ChunkStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": model,
            "messages": Self::messages_to_json(messages),
            "stream": true,
        });

        debug!(url = %url, model = %model, messages = messages.len(), "Sending streaming completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER, status, &body_text));
        }

        Ok(parse_sse_stream(response.bytes_stream()))
    }
}

impl ModelClient for OpenAiClient {
    fn embeddings(&self) -> Option<&dyn Embeddings> {
        if self.embeddings_enabled {
            Some(self)
        } else {
            None
        }
    }

    fn chat(&self) -> &dyn ChatCompletions {
        self
    }
}

/// Longest SSE line or event payload accepted before the stream is abandoned.
pub const MAX_SSE_EVENT_BYTES: usize = 1024 * 1024;

/// One line of an SSE body.
#[derive(Debug, PartialEq)]
enum SseField<'a> {
    Blank,
    Data(&'a str),
    Other,
}

fn sse_field(line: &str) -> SseField<'_> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return SseField::Blank;
    }
    // comments and the event:, id: and retry: fields carry nothing we use
    match line.strip_prefix("data:") {
        Some(data) => SseField::Data(data.strip_prefix(' ').unwrap_or(data)),
        None => SseField::Other,
    }
}

/// Outcome of one dispatched SSE event.
#[derive(Debug)]
enum SseEvent {
    Done,
    Chunk(ChatCompletionChunk),
    Error(ProviderError),
}

/// Parse the joined `data` payload of one SSE event.
fn parse_sse_data(data: &str) -> SseEvent {
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            let preview: String = data.chars().take(200).collect();
            warn!(error = %e, data_preview = %preview, "Failed to parse SSE JSON chunk");
            return SseEvent::Error(ProviderError::ResponseParse {
                message: format!("Invalid stream chunk: {}", e),
            });
        }
    };

    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return SseEvent::Error(ProviderError::Streaming { message });
    }

    match serde_json::from_value::<ChatCompletionChunk>(value) {
        Ok(chunk) => SseEvent::Chunk(chunk),
        Err(e) => SseEvent::Error(ProviderError::ResponseParse {
            message: format!("Unexpected stream chunk shape: {}", e),
        }),
    }
}

fn oversized_event() -> ProviderError {
    ProviderError::ResponseParse {
        message: format!(
            "Stream event exceeds {} bytes without completing",
            MAX_SSE_EVENT_BYTES
        ),
    }
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    event: Option<String>,
    finished: bool,
}

impl<S> SseState<S> {
    /// Pop the next complete line. Lines are decoded only once complete, so
    /// multi-byte characters split across network chunks survive intact.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned())
    }

    /// Append one `data` line to the pending event; lines join with `\n`.
    fn push_data(&mut self, data: &str) -> Result<(), ProviderError> {
        let event = self.event.get_or_insert_with(String::new);
        if !event.is_empty() {
            event.push('\n');
        }
        event.push_str(data);
        if event.len() > MAX_SSE_EVENT_BYTES {
            return Err(oversized_event());
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        self.buffer.clear();
        self.event = None;
    }

    fn emit(
        mut self,
        event: SseEvent,
    ) -> Option<(Result<ChatCompletionChunk, ProviderError>, Self)> {
        match event {
            SseEvent::Done => None,
            SseEvent::Chunk(chunk) => Some((Ok(chunk), self)),
            SseEvent::Error(err) => {
                self.finish();
                Some((Err(err), self))
            }
        }
    }
}

/// Turn a raw SSE byte stream into parsed completion chunks.
///
/// Consecutive `data:` lines form one event, dispatched at the next blank
/// line or at the end of the body. Ends at `data: [DONE]` or when the body
/// ends. The first transport error, parse error or event larger than
/// [`MAX_SSE_EVENT_BYTES`] is yielded and terminates the stream. Dropping the
/// returned stream drops the underlying body.
pub fn parse_sse_stream<S, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        event: None,
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            while let Some(line) = state.next_line() {
                match sse_field(&line) {
                    SseField::Data(data) => {
                        if let Err(err) = state.push_data(data) {
                            return state.emit(SseEvent::Error(err));
                        }
                    }
                    SseField::Blank => {
                        if let Some(data) = state.event.take() {
                            return state.emit(parse_sse_data(&data));
                        }
                    }
                    SseField::Other => {}
                }
            }

            if state.finished {
                return match state.event.take() {
                    Some(data) => state.emit(parse_sse_data(&data)),
                    None => None,
                };
            }
            if state.buffer.len() > MAX_SSE_EVENT_BYTES {
                return state.emit(SseEvent::Error(oversized_event()));
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    return state.emit(SseEvent::Error(ProviderError::Streaming {
                        message: format!("Failed to read streaming chunk: {}", e),
                    }));
                }
                None => {
                    // Flush a trailing line that had no newline.
                    state.finished = true;
                    if !state.buffer.is_empty() {
                        state.buffer.push(b'\n');
                    }
                }
            }
        }
    }))
}
