//! Error types for the profmatch core.
//!
//! Uses `thiserror` for public API error types. Provider failures, configuration
//! problems and request-handling failures each get their own enum; the
//! handler-level enum knows how to render itself as the HTTP error payload.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Message returned when the model client has no embedding capability.
pub const EMBEDDING_UNAVAILABLE_MESSAGE: &str = "Embedding service not available";

/// Message returned for every other setup-phase failure.
pub const PROCESSING_ERROR_MESSAGE: &str = "An error occurred during processing";

/// Errors from the embedding, completion and vector-index collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Embedding response contained no vectors")]
    EmptyEmbedding,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration load error: {message}")]
    Load { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load {
            message: err.to_string(),
        }
    }
}

/// Failures surfaced by the chat completion handler before the body starts.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: String },

    #[error("Embedding capability is not configured on the model client")]
    EmbeddingUnavailable,

    #[error("Upstream failure: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Provider setup failed: {0}")]
    Config(#[from] ConfigError),
}

impl HandlerError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        HandlerError::MalformedRequest {
            reason: reason.into(),
        }
    }

    /// The message exposed to callers. Only two messages ever leave the service.
    pub fn public_message(&self) -> &'static str {
        match self {
            HandlerError::EmbeddingUnavailable => EMBEDDING_UNAVAILABLE_MESSAGE,
            _ => PROCESSING_ERROR_MESSAGE,
        }
    }

    /// Status code for the error payload.
    ///
    /// Malformed requests are reported as 500 alongside provider failures.
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}
