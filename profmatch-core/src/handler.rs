//! The chat completion handler: one embedding, one similarity query, one
//! streamed completion per request.

use crate::config::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL, OpenAiConfig};
use crate::error::HandlerError;
use crate::prompt::assemble_messages;
use crate::providers::{ModelClient, ProviderFactory, VectorIndex};
use crate::stream::{TokenStream, forward_tokens};
use crate::types::{Conversation, ConversationMessage, QueryRequest, RetrievedRecord};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Number of records retrieved for each question.
pub const TOP_K: usize = 3;

/// Model identifiers used by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub embedding_model: String,
    pub chat_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

impl From<&OpenAiConfig> for ModelSettings {
    fn from(config: &OpenAiConfig) -> Self {
        Self {
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
        }
    }
}

/// Everything decided before the completion starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCompletion {
    /// Outbound messages: system prompt, history, augmented last message.
    pub messages: Vec<ConversationMessage>,
    /// Records retrieved for the last message, most similar first.
    pub records: Vec<RetrievedRecord>,
}

/// Retrieval-augmented chat completion.
///
/// Holds no per-request state; provider clients come from the factory on
/// every call.
#[derive(Clone)]
pub struct ChatCompletionHandler {
    factory: Arc<dyn ProviderFactory>,
    models: ModelSettings,
}

impl ChatCompletionHandler {
    pub fn new(factory: Arc<dyn ProviderFactory>, models: ModelSettings) -> Self {
        Self { factory, models }
    }

    pub fn models(&self) -> &ModelSettings {
        &self.models
    }

    /// Run retrieval and build the outbound message list without starting a
    /// completion.
    pub async fn prepare(
        &self,
        conversation: &Conversation,
    ) -> Result<PreparedCompletion, HandlerError> {
        let index = self.factory.vector_index()?;
        let client = self.factory.model_client()?;
        self.prepare_with(client.as_ref(), index.as_ref(), conversation)
            .await
    }

    /// Handle a parsed conversation and return the outbound token stream.
    ///
    /// Every error returned here happens before the first byte; failures after
    /// that arrive inside the stream.
    pub async fn handle(&self, conversation: &Conversation) -> Result<TokenStream, HandlerError> {
        let index = self.factory.vector_index()?;
        let client = self.factory.model_client()?;
        let prepared = self
            .prepare_with(client.as_ref(), index.as_ref(), conversation)
            .await?;

        info!(
            model = %self.models.chat_model,
            messages = prepared.messages.len(),
            "Starting streaming completion"
        );
        let upstream = client
            .chat()
            .stream_chat(&self.models.chat_model, &prepared.messages)
            .await
            .map_err(|e| {
                error!(error = %e, "Completion request failed");
                HandlerError::Upstream(e)
            })?;

        Ok(forward_tokens(upstream))
    }

    /// Parse a raw request body and handle it.
    pub async fn handle_body(&self, body: &[u8]) -> Result<TokenStream, HandlerError> {
        let conversation = Conversation::parse(body).inspect_err(|e| {
            warn!(error = %e, body_len = body.len(), "Rejecting malformed request");
        })?;
        debug!(messages = conversation.len(), "Parsed conversation");
        self.handle(&conversation).await
    }

    async fn prepare_with(
        &self,
        client: &dyn ModelClient,
        index: &dyn VectorIndex,
        conversation: &Conversation,
    ) -> Result<PreparedCompletion, HandlerError> {
        let Some(embeddings) = client.embeddings() else {
            error!("Model client has no embedding capability");
            return Err(HandlerError::EmbeddingUnavailable);
        };

        let text = &conversation.last().content;
        info!(
            model = %self.models.embedding_model,
            input_len = text.len(),
            "Creating embedding"
        );
        let vector = embeddings
            .create_embedding(&self.models.embedding_model, text)
            .await
            .map_err(|e| {
                error!(error = %e, "Embedding request failed");
                HandlerError::Upstream(e)
            })?;
        debug!(dimension = vector.len(), "Embedding created");

        let request = QueryRequest {
            namespace: index.namespace().to_string(),
            top_k: TOP_K,
            include_metadata: true,
            vector: vector.into_inner(),
        };
        info!(namespace = %request.namespace, top_k = TOP_K, "Querying vector index");
        let response = index.query(request).await.map_err(|e| {
            error!(error = %e, "Vector index query failed");
            HandlerError::Upstream(e)
        })?;

        let mut records = response.matches;
        if records.len() > TOP_K {
            warn!(returned = records.len(), "Index returned more matches than requested");
            records.truncate(TOP_K);
        }
        info!(
            matches = records.len(),
            ids = ?records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            "Retrieved records"
        );

        let messages = assemble_messages(conversation, &records);
        Ok(PreparedCompletion { messages, records })
    }
}
