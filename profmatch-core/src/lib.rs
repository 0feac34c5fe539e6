//! # ProfMatch Core
//!
//! Retrieval-augmented chat completion for professor recommendations.
//! Embeds the caller's latest message, retrieves the closest professor
//! records from a vector index, and streams a model completion grounded in
//! those records.

pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod prompt;
pub mod providers;
pub mod stream;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{ServiceConfig, load_config};
pub use error::{
    ConfigError, EMBEDDING_UNAVAILABLE_MESSAGE, HandlerError, PROCESSING_ERROR_MESSAGE,
    ProviderError,
};
pub use handler::{ChatCompletionHandler, ModelSettings, PreparedCompletion, TOP_K};
pub use providers::{HttpProviderFactory, ProviderFactory};
pub use stream::{TokenStream, forward_tokens};
pub use types::{
    ChatCompletionChunk, Conversation, ConversationMessage, EmbeddingVector, RecordMetadata,
    RetrievedRecord, Role,
};
