//! Deterministic in-memory providers for tests and offline runs.
//!
//! Each mock is cheaply cloneable and shares its recorded calls between clones,
//! so a [`MockProviderFactory`] can hand out fresh clients per request while a
//! test still observes every call.

use super::{
    ChatCompletions, ChunkStream, Embeddings, ModelClient, ProviderFactory, VectorIndex,
};
use crate::error::{HandlerError, ProviderError};
use crate::types::{
    ChatCompletionChunk, ConversationMessage, EmbeddingVector, QueryRequest, QueryResponse,
    RetrievedRecord, Role,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Embeddings that return a fixed vector, or fail on demand.
#[derive(Debug, Clone)]
pub struct MockEmbeddings {
    vector: Vec<f32>,
    fail_with: Option<String>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockEmbeddings {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            fail_with: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Embeddings whose every call fails with an API error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Recorded `(model, input)` pairs.
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl Default for MockEmbeddings {
    fn default() -> Self {
        Self::new(vec![0.1, 0.2, 0.3])
    }
}

#[async_trait]
impl Embeddings for MockEmbeddings {
    async fn create_embedding(
        &self,
        model: &str,
        input: &str,
    ) -> Result<EmbeddingVector, ProviderError> {
        lock(&self.calls).push((model.to_string(), input.to_string()));
        match &self.fail_with {
            Some(message) => Err(ProviderError::ApiRequest {
                message: message.clone(),
            }),
            None if self.vector.is_empty() => Err(ProviderError::EmptyEmbedding),
            None => Ok(EmbeddingVector::new(self.vector.clone())),
        }
    }
}

/// One scripted step of a mock completion stream.
#[derive(Debug, Clone)]
pub enum ScriptedChunk {
    Chunk(ChatCompletionChunk),
    Error(String),
}

/// Chat completions that replay a scripted chunk sequence.
#[derive(Debug, Clone)]
pub struct MockChat {
    script: Vec<ScriptedChunk>,
    fail_on_start: Option<String>,
    calls: Arc<Mutex<Vec<(String, Vec<ConversationMessage>)>>>,
}

impl MockChat {
    pub fn new(script: Vec<ScriptedChunk>) -> Self {
        Self {
            script,
            fail_on_start: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Stream a role announcement followed by one content chunk per token.
    pub fn with_tokens(tokens: &[&str]) -> Self {
        let mut script = vec![ScriptedChunk::Chunk(ChatCompletionChunk::role_only(
            Role::Assistant,
        ))];
        script.extend(
            tokens
                .iter()
                .map(|t| ScriptedChunk::Chunk(ChatCompletionChunk::content(*t))),
        );
        Self::new(script)
    }

    /// Completion requests that fail before any chunk is produced.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_on_start: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Append a mid-stream failure after the scripted chunks.
    pub fn then_error(mut self, message: impl Into<String>) -> Self {
        self.script.push(ScriptedChunk::Error(message.into()));
        self
    }

    /// Recorded `(model, messages)` pairs.
    pub fn calls(&self) -> Vec<(String, Vec<ConversationMessage>)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl ChatCompletions for MockChat {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ConversationMessage],
    ) -> Result<ChunkStream, ProviderError> {
        lock(&self.calls).push((model.to_string(), messages.to_vec()));
        if let Some(message) = &self.fail_on_start {
            return Err(ProviderError::ApiRequest {
                message: message.clone(),
            });
        }
        let items: Vec<Result<ChatCompletionChunk, ProviderError>> = self
            .script
            .iter()
            .map(|step| match step {
                ScriptedChunk::Chunk(chunk) => Ok(chunk.clone()),
                ScriptedChunk::Error(message) => Err(ProviderError::Streaming {
                    message: message.clone(),
                }),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Vector index returning fixed matches, or failing on demand.
#[derive(Debug, Clone)]
pub struct MockVectorIndex {
    namespace: String,
    matches: Vec<RetrievedRecord>,
    fail_with: Option<String>,
    honor_top_k: bool,
    requests: Arc<Mutex<Vec<QueryRequest>>>,
}

impl MockVectorIndex {
    pub fn new(matches: Vec<RetrievedRecord>) -> Self {
        Self {
            namespace: crate::config::DEFAULT_NAMESPACE.to_string(),
            matches,
            fail_with: None,
            honor_top_k: true,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Return every configured match regardless of the requested `top_k`.
    pub fn ignoring_top_k(mut self) -> Self {
        self.honor_top_k = false;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl VectorIndex for MockVectorIndex {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, ProviderError> {
        let top_k = if self.honor_top_k {
            request.top_k
        } else {
            usize::MAX
        };
        lock(&self.requests).push(request);
        if let Some(message) = &self.fail_with {
            return Err(ProviderError::ApiRequest {
                message: message.clone(),
            });
        }
        Ok(QueryResponse {
            matches: self.matches.iter().take(top_k).cloned().collect(),
            namespace: Some(self.namespace.clone()),
        })
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Model client assembled from mock capabilities.
#[derive(Debug, Clone)]
pub struct MockModelClient {
    embeddings: Option<MockEmbeddings>,
    chat: MockChat,
}

impl MockModelClient {
    pub fn new(embeddings: Option<MockEmbeddings>, chat: MockChat) -> Self {
        Self { embeddings, chat }
    }
}

impl ModelClient for MockModelClient {
    fn embeddings(&self) -> Option<&dyn Embeddings> {
        self.embeddings.as_ref().map(|e| e as &dyn Embeddings)
    }

    fn chat(&self) -> &dyn ChatCompletions {
        &self.chat
    }
}

/// Factory handing out clones of shared mocks for each request.
#[derive(Debug, Clone)]
pub struct MockProviderFactory {
    pub embeddings: MockEmbeddings,
    pub chat: MockChat,
    pub index: MockVectorIndex,
    embeddings_available: bool,
    fail_setup: bool,
}

impl MockProviderFactory {
    pub fn new(embeddings: MockEmbeddings, chat: MockChat, index: MockVectorIndex) -> Self {
        Self {
            embeddings,
            chat,
            index,
            embeddings_available: true,
            fail_setup: false,
        }
    }

    /// Model clients built by this factory report no embedding capability.
    pub fn without_embeddings(mut self) -> Self {
        self.embeddings_available = false;
        self
    }

    /// Client construction fails as if an API key were missing.
    pub fn with_setup_failure(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    fn check_setup(&self, var: &str) -> Result<(), HandlerError> {
        if self.fail_setup {
            return Err(HandlerError::Config(crate::error::ConfigError::EnvVarMissing {
                var: var.to_string(),
            }));
        }
        Ok(())
    }
}

impl Default for MockProviderFactory {
    fn default() -> Self {
        Self::new(
            MockEmbeddings::default(),
            MockChat::with_tokens(&["Mock ", "answer."]),
            MockVectorIndex::new(Vec::new()),
        )
    }
}

impl ProviderFactory for MockProviderFactory {
    fn model_client(&self) -> Result<Box<dyn ModelClient>, HandlerError> {
        self.check_setup("OPENAI_API_KEY")?;
        let embeddings = self
            .embeddings_available
            .then(|| self.embeddings.clone());
        Ok(Box::new(MockModelClient::new(embeddings, self.chat.clone())))
    }

    fn vector_index(&self) -> Result<Box<dyn VectorIndex>, HandlerError> {
        self.check_setup("PINECONE_API_KEY")?;
        Ok(Box::new(self.index.clone()))
    }
}
