//! Pinecone vector index client.
//!
//! Queries go to the index's data-plane host. When no host is configured it is
//! looked up once per client through the control plane's describe-index call.

use super::{VectorIndex, map_http_error, map_send_error};
use crate::config::{PineconeConfig, resolve_api_key};
use crate::error::{ConfigError, ProviderError};
use crate::types::{QueryRequest, QueryResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

const PROVIDER: &str = "Pinecone";

/// Subset of the describe-index response we rely on.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(default)]
    pub metric: Option<String>,
}

/// Handle to one namespace of a Pinecone index.
pub struct PineconeIndex {
    client: Client,
    api_key: String,
    control_plane_url: String,
    index: String,
    namespace: String,
    api_version: String,
    host: OnceCell<String>,
}

impl std::fmt::Debug for PineconeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeIndex")
            .field("index", &self.index)
            .field("namespace", &self.namespace)
            .field("host", &self.host.get())
            .finish()
    }
}

impl PineconeIndex {
    pub fn new(config: &PineconeConfig) -> Result<Self, ConfigError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), &config.api_key_env)?;
        Ok(Self::with_key(config, api_key))
    }

    pub fn with_key(config: &PineconeConfig, api_key: String) -> Self {
        let host = OnceCell::new_with(
            config
                .index_host
                .as_deref()
                .filter(|h| !h.is_empty())
                .map(str::to_string),
        );
        Self {
            client: Client::new(),
            api_key,
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            namespace: config.namespace.clone(),
            api_version: config.api_version.clone(),
            host,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Fetch the index description from the control plane.
    pub async fn describe_index(&self) -> Result<IndexDescription, ProviderError> {
        let url = format!("{}/indexes/{}", self.control_plane_url, self.index);
        debug!(url = %url, "Describing index");

        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER, status, &body_text));
        }

        response
            .json::<IndexDescription>()
            .await
            .map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid index description: {}", e),
            })
    }

    async fn host(&self) -> Result<&str, ProviderError> {
        self.host
            .get_or_try_init(|| async {
                let description = self.describe_index().await?;
                debug!(index = %description.name, host = %description.host, "Resolved index host");
                Ok::<_, ProviderError>(description.host)
            })
            .await
            .map(String::as_str)
    }
}

/// Build a data-plane URL. Bare hosts get `https://`; explicit schemes are kept.
fn data_plane_url(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host, path)
    } else {
        format!("https://{}{}", host, path)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, ProviderError> {
        let url = data_plane_url(self.host().await?, "/query");
        debug!(
            url = %url,
            namespace = %request.namespace,
            top_k = request.top_k,
            dimension = request.vector.len(),
            "Querying vector index"
        );

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER, status, &body_text));
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| ProviderError::ResponseParse {
                message: format!("Invalid query response: {}", e),
            })
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
