//! Collaborator interfaces and their HTTP implementations.
//!
//! The handler talks to three external capabilities through traits:
//! - [`Embeddings`]: text to vector
//! - [`ChatCompletions`]: message list to a stream of completion chunks
//! - [`VectorIndex`]: vector to nearest stored records
//!
//! A [`ProviderFactory`] builds fresh clients for every request. Use
//! [`HttpProviderFactory`] for the real OpenAI-compatible and Pinecone clients.

pub mod mock;
pub mod openai;
pub mod pinecone;

use crate::config::ServiceConfig;
use crate::error::{HandlerError, ProviderError};
use crate::types::{
    ChatCompletionChunk, ConversationMessage, EmbeddingVector, QueryRequest, QueryResponse,
};
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use tracing::debug;

pub use mock::{
    MockChat, MockEmbeddings, MockModelClient, MockProviderFactory, MockVectorIndex, ScriptedChunk,
};
pub use openai::OpenAiClient;
pub use pinecone::PineconeIndex;

/// Stream of parsed completion chunks from the model provider.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, ProviderError>> + Send>>;

/// Text embedding capability.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed a single input with the given model.
    async fn create_embedding(
        &self,
        model: &str,
        input: &str,
    ) -> Result<EmbeddingVector, ProviderError>;
}

/// Streaming chat completion capability.
#[async_trait]
pub trait ChatCompletions: Send + Sync {
    /// Start a streaming completion. Errors returned here happen before any
    /// chunk is produced; errors after that arrive inside the stream.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ConversationMessage],
    ) -> Result<ChunkStream, ProviderError>;
}

/// A model provider client exposing its capabilities.
pub trait ModelClient: Send + Sync {
    /// Embedding capability, or `None` when the client has none configured.
    fn embeddings(&self) -> Option<&dyn Embeddings>;

    /// Chat completion capability.
    fn chat(&self) -> &dyn ChatCompletions;
}

/// Nearest-neighbour search over stored records.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, ProviderError>;

    /// Namespace queries are scoped to.
    fn namespace(&self) -> &str;
}

/// Builds provider clients. Called once per request; nothing is pooled.
pub trait ProviderFactory: Send + Sync {
    fn model_client(&self) -> Result<Box<dyn ModelClient>, HandlerError>;

    fn vector_index(&self) -> Result<Box<dyn VectorIndex>, HandlerError>;
}

/// Factory for the real HTTP clients, configured from [`ServiceConfig`].
///
/// API keys are read from the environment each time a client is built.
#[derive(Debug, Clone)]
pub struct HttpProviderFactory {
    config: ServiceConfig,
}

impl HttpProviderFactory {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn model_client(&self) -> Result<Box<dyn ModelClient>, HandlerError> {
        let client = OpenAiClient::new(&self.config.openai)?;
        debug!(base_url = %self.config.openai.base_url, "Created model client");
        Ok(Box::new(client))
    }

    fn vector_index(&self) -> Result<Box<dyn VectorIndex>, HandlerError> {
        let index = PineconeIndex::new(&self.config.pinecone)?;
        debug!(
            index = %self.config.pinecone.index,
            namespace = %self.config.pinecone.namespace,
            "Created vector index client"
        );
        Ok(Box::new(index))
    }
}

/// Map an HTTP error status from a provider to the appropriate ProviderError.
pub(crate) fn map_http_error(provider: &str, status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => {
            debug!(provider, body = %body, status = status.as_u16(), "Authentication failed");
            ProviderError::AuthFailed {
                provider: provider.to_string(),
            }
        }
        429 => {
            // Try to extract a number from "Rate limit... try again in Xs"
            let retry_secs = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| {
                    v.get("error")?
                        .get("message")?
                        .as_str()
                        .map(|s| s.to_string())
                })
                .and_then(|msg| {
                    msg.split("in ")
                        .last()
                        .and_then(|s| s.trim_end_matches('.').trim_end_matches('s').parse::<u64>().ok())
                })
                .unwrap_or(5);
            ProviderError::RateLimited {
                retry_after_secs: retry_secs,
            }
        }
        status if status >= 500 => ProviderError::ApiRequest {
            message: format!("{} server error ({}): {}", provider, status, body),
        },
        _ => ProviderError::ApiRequest {
            message: format!("{} HTTP {}: {}", provider, status, body),
        },
    }
}

/// Map a transport-level reqwest failure.
pub(crate) fn map_send_error(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_connect() {
        ProviderError::Connection {
            message: format!("{}: {}", provider, err),
        }
    } else {
        ProviderError::ApiRequest {
            message: format!("{} request failed: {}", provider, err),
        }
    }
}
