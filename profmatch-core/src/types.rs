//! Core types shared across the handler, the provider clients and the gateway.
//!
//! Provider payloads are modelled as typed records with optional fields: a
//! missing field means "no content", never a parse failure.

use crate::error::{HandlerError, ProviderError};
use serde::{Deserialize, Deserializer, Serialize};

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message as supplied by the caller and sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A validated, non-empty conversation in caller order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    /// Build a conversation from messages. Fails on an empty list.
    pub fn new(messages: Vec<ConversationMessage>) -> Result<Self, HandlerError> {
        if messages.is_empty() {
            return Err(HandlerError::malformed("conversation is empty"));
        }
        Ok(Self { messages })
    }

    /// Parse a request body: a JSON array of `{role, content}` objects.
    ///
    /// Fields other than `role` and `content` are ignored.
    pub fn parse(body: &[u8]) -> Result<Self, HandlerError> {
        let messages: Vec<ConversationMessage> = serde_json::from_slice(body)
            .map_err(|e| HandlerError::malformed(format!("invalid message array: {}", e)))?;
        Self::new(messages)
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// The final message, whose content drives retrieval.
    pub fn last(&self) -> &ConversationMessage {
        // Non-empty by construction.
        &self.messages[self.messages.len() - 1]
    }

    /// Every message except the last, in original order.
    pub fn history(&self) -> &[ConversationMessage] {
        &self.messages[..self.messages.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Fixed-length embedding of a piece of text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Response body of the embeddings endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingData {
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl EmbeddingResponse {
    /// Take the first embedding (`data[0].embedding`).
    pub fn into_first(self) -> Result<EmbeddingVector, ProviderError> {
        self.data
            .into_iter()
            .next()
            .filter(|d| !d.embedding.is_empty())
            .map(|d| EmbeddingVector::new(d.embedding))
            .ok_or(ProviderError::EmptyEmbedding)
    }
}

/// A nearest-neighbour query against the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub namespace: String,
    pub top_k: usize,
    pub include_metadata: bool,
    pub vector: Vec<f32>,
}

/// Matches returned by the vector index, most similar first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub matches: Vec<RetrievedRecord>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// One stored professor record returned by the index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetrievedRecord {
    pub id: String,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: RecordMetadata,
}

impl RetrievedRecord {
    pub fn new(id: impl Into<String>, subject: Option<&str>, stars: Option<f64>) -> Self {
        Self {
            id: id.into(),
            score: None,
            metadata: RecordMetadata {
                subject: subject.map(str::to_string),
                stars,
            },
        }
    }
}

/// Metadata stored alongside each record. Other keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordMetadata {
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub stars: Option<f64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts strings and numbers; anything else is treated as absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts numbers and numeric strings; anything else is treated as absent.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// One server-sent chunk of a streaming chat completion.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// Chunk carrying a single content delta.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            id: None,
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    role: None,
                    content: Some(text.into()),
                },
                finish_reason: None,
            }],
        }
    }

    /// Chunk announcing the assistant role with no content.
    pub fn role_only(role: Role) -> Self {
        Self {
            id: None,
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    role: Some(role.to_string()),
                    content: None,
                },
                finish_reason: None,
            }],
        }
    }

    /// Non-empty `choices[0].delta.content`, if any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
        assert!(serde_json::from_str::<Role>("\"tool\"").is_err());
    }

    #[test]
    fn test_parse_conversation() {
        let body = br#"[
            {"role": "user", "content": "Hi"},
            {"role": "assistant", "content": "Hello", "id": "ignored"},
            {"role": "user", "content": "Who teaches easy calculus?"}
        ]"#;
        let conv = Conversation::parse(body).unwrap();
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.last().content, "Who teaches easy calculus?");
        assert_eq!(conv.history().len(), 2);
        assert_eq!(conv.history()[1], ConversationMessage::assistant("Hello"));
    }

    #[test]
    fn test_parse_rejects_empty_array() {
        let err = Conversation::parse(b"[]").unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRequest { .. }));
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let err = Conversation::parse(br#"{"role":"user","content":"x"}"#).unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRequest { .. }));
        assert!(Conversation::parse(b"not json").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_or_non_text_content() {
        assert!(Conversation::parse(br#"[{"role":"user"}]"#).is_err());
        assert!(Conversation::parse(br#"[{"role":"user","content":42}]"#).is_err());
        assert!(Conversation::parse(br#"[{"role":"user","content":null}]"#).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        assert!(Conversation::parse(br#"[{"role":"tool","content":"x"}]"#).is_err());
    }

    #[test]
    fn test_embedding_response_first() {
        let resp: EmbeddingResponse = serde_json::from_value(json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
            "model": "text-embedding-ada-002"
        }))
        .unwrap();
        let vector = resp.into_first().unwrap();
        assert_eq!(vector.len(), 3);
        assert!((vector.as_slice()[1] - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_embedding_response_empty() {
        let resp: EmbeddingResponse = serde_json::from_value(json!({"data": []})).unwrap();
        assert!(matches!(
            resp.into_first(),
            Err(ProviderError::EmptyEmbedding)
        ));
    }

    #[test]
    fn test_query_request_wire_casing() {
        let req = QueryRequest {
            namespace: "ns1".into(),
            top_k: 3,
            include_metadata: true,
            vector: vec![0.5],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["topK"], 3);
        assert_eq!(value["includeMetadata"], true);
        assert_eq!(value["namespace"], "ns1");
        assert!(value.get("top_k").is_none());
    }

    #[test]
    fn test_query_response_lenient_metadata() {
        let resp: QueryResponse = serde_json::from_value(json!({
            "matches": [
                {"id": "Dr. A", "score": 0.91, "metadata": {"subject": "Math", "stars": 4.5, "review": "great"}},
                {"id": "Dr. B", "score": 0.80, "metadata": {"subject": "Physics", "stars": "3"}},
                {"id": "Dr. C", "metadata": null},
                {"id": "Dr. D"}
            ],
            "namespace": "ns1"
        }))
        .unwrap();
        assert_eq!(resp.matches.len(), 4);
        assert_eq!(resp.matches[0].metadata.subject.as_deref(), Some("Math"));
        assert_eq!(resp.matches[0].metadata.stars, Some(4.5));
        assert_eq!(resp.matches[1].metadata.stars, Some(3.0));
        assert_eq!(resp.matches[2].metadata, RecordMetadata::default());
        assert_eq!(resp.matches[3].metadata, RecordMetadata::default());
    }

    #[test]
    fn test_query_response_without_matches() {
        let resp: QueryResponse = serde_json::from_value(json!({"namespace": "ns1"})).unwrap();
        assert!(resp.matches.is_empty());
    }

    #[test]
    fn test_chunk_text() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {"content": "Hello"}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(chunk.text(), Some("Hello"));
    }

    #[test]
    fn test_chunk_without_content() {
        let role_only: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"role": "assistant"}}]
        }))
        .unwrap();
        assert_eq!(role_only.text(), None);

        let empty: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"content": ""}}]
        }))
        .unwrap();
        assert_eq!(empty.text(), None);

        let no_choices: ChatCompletionChunk =
            serde_json::from_value(json!({"choices": [], "usage": {"total_tokens": 9}})).unwrap();
        assert_eq!(no_choices.text(), None);

        let null_delta: ChatCompletionChunk =
            serde_json::from_value(json!({"choices": [{"delta": null, "finish_reason": "stop"}]}))
                .unwrap();
        assert_eq!(null_delta.text(), None);
    }

    #[test]
    fn test_chunk_constructors() {
        assert_eq!(ChatCompletionChunk::content("x").text(), Some("x"));
        assert_eq!(ChatCompletionChunk::role_only(Role::Assistant).text(), None);
    }
}
