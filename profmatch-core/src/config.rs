//! Configuration system for profmatch.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment -> CLI overrides. The user config lives
//! at `~/.config/profmatch/config.toml` (platform equivalent).
//!
//! API keys are not resolved here: providers read them through
//! [`resolve_api_key`] when a request builds its clients.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the vector index holding professor reviews.
pub const DEFAULT_INDEX_NAME: &str = "rag";
/// Namespace inside the index.
pub const DEFAULT_NAMESPACE: &str = "ns1";
/// Embedding model used for the query text.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
/// Chat model used for the streamed answer.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Default request body limit for the chat endpoint (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Top-level configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Path of the chat endpoint.
    pub route: String,
    /// Largest request body accepted by the chat endpoint, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            route: "/api/chat".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Embedding and chat completion provider (OpenAI-compatible API).
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key; takes precedence over the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// API base URL, including the version segment.
    pub base_url: String,
    /// Whether the endpoint serves embeddings at all.
    pub embeddings_enabled: bool,
    pub embedding_model: String,
    pub chat_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            embeddings_enabled: true,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("embeddings_enabled", &self.embeddings_enabled)
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

/// Vector index provider (Pinecone data plane).
#[derive(Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key; takes precedence over the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Control plane used to look up the index host.
    pub control_plane_url: String,
    /// Data plane host of the index. Looked up by name when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_host: Option<String>,
    pub index: String,
    pub namespace: String,
    /// Value of the `X-Pinecone-API-Version` header.
    pub api_version: String,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            api_key_env: "PINECONE_API_KEY".to_string(),
            api_key: None,
            control_plane_url: "https://api.pinecone.io".to_string(),
            index_host: None,
            index: DEFAULT_INDEX_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_version: "2024-07".to_string(),
        }
    }
}

impl std::fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("control_plane_url", &self.control_plane_url)
            .field("index_host", &self.index_host)
            .field("index", &self.index)
            .field("namespace", &self.namespace)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl ServiceConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns an empty Vec if the config looks sane. Warnings are
    /// human-readable and never fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.server.route.starts_with('/') {
            warnings.push(format!(
                "server.route ({}) should start with '/'",
                self.server.route
            ));
        }
        if self.server.max_body_bytes == 0 {
            warnings.push("server.max_body_bytes is 0; every chat request will fail".to_string());
        }
        if self.pinecone.index != DEFAULT_INDEX_NAME {
            warnings.push(format!(
                "pinecone.index ({}) differs from the expected index '{}'",
                self.pinecone.index, DEFAULT_INDEX_NAME
            ));
        }
        if self.pinecone.namespace != DEFAULT_NAMESPACE {
            warnings.push(format!(
                "pinecone.namespace ({}) differs from the expected namespace '{}'",
                self.pinecone.namespace, DEFAULT_NAMESPACE
            ));
        }
        if !self.openai.embeddings_enabled {
            warnings.push(
                "openai.embeddings_enabled is false; every chat request will fail".to_string(),
            );
        }
        warnings
    }

    /// Return a copy with explicit API keys removed, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.openai.api_key = copy.openai.api_key.map(|_| "[REDACTED]".to_string());
        copy.pinecone.api_key = copy.pinecone.api_key.map(|_| "[REDACTED]".to_string());
        copy
    }
}

/// Resolve an API key: explicit value first, then the named environment variable.
///
/// Called when a request builds its provider clients, so key rotation in the
/// environment takes effect without a restart.
pub fn resolve_api_key(explicit: Option<&str>, env_var: &str) -> Result<String, ConfigError> {
    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var(env_var)
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ConfigError::EnvVarMissing {
            var: env_var.to_string(),
        })
}

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "profmatch", "profmatch")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Load configuration from all sources, merged in priority order.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `PROFMATCH_`)
/// 3. Explicit config file
/// 4. User config (`~/.config/profmatch/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    config_file: Option<&Path>,
    overrides: Option<&ServiceConfig>,
) -> Result<ServiceConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Invalid {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (PROFMATCH_SERVER__PORT, PROFMATCH_PINECONE__INDEX_HOST, etc.)
    figment = figment.merge(Env::prefixed("PROFMATCH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    Ok(figment.extract()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.route, "/api/chat");
        assert_eq!(config.server.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.openai.embedding_model, "text-embedding-ada-002");
        assert_eq!(config.openai.chat_model, "gpt-4o-mini");
        assert!(config.openai.embeddings_enabled);
        assert_eq!(config.pinecone.index, "rag");
        assert_eq!(config.pinecone.namespace, "ns1");
        assert!(config.pinecone.index_host.is_none());
    }

    #[test]
    fn test_validate_defaults_clean() {
        let warnings = ServiceConfig::default().validate();
        assert!(
            warnings.is_empty(),
            "Default config should have no warnings, got: {:?}",
            warnings
        );
    }

    #[test]
    fn test_validate_flags_index_and_embeddings() {
        let mut config = ServiceConfig::default();
        config.pinecone.index = "other".into();
        config.openai.embeddings_enabled = false;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("pinecone.index"));
        assert!(warnings[1].contains("embeddings_enabled"));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let mut config = ServiceConfig::default();
        config.openai.api_key = Some("sk-secret".into());
        config.pinecone.api_key = Some("pc-secret".into());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("pc-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_redacted_copy() {
        let mut config = ServiceConfig::default();
        config.openai.api_key = Some("sk-secret".into());
        let redacted = config.redacted();
        assert_eq!(redacted.openai.api_key.as_deref(), Some("[REDACTED]"));
        assert!(redacted.pinecone.api_key.is_none());
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-secret"));
    }

    #[test]
    fn test_resolve_api_key_explicit_wins() {
        let key = resolve_api_key(Some("explicit"), "PROFMATCH_TEST_KEY_UNUSED").unwrap();
        assert_eq!(key, "explicit");
    }

    #[test]
    fn test_resolve_api_key_from_env() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::set_var("PROFMATCH_TEST_RESOLVE_KEY", "from-env") };
        let key = resolve_api_key(None, "PROFMATCH_TEST_RESOLVE_KEY").unwrap();
        assert_eq!(key, "from-env");
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("PROFMATCH_TEST_RESOLVE_KEY") };
    }

    #[test]
    fn test_resolve_api_key_missing() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("PROFMATCH_TEST_MISSING_KEY") };
        let err = resolve_api_key(Some(""), "PROFMATCH_TEST_MISSING_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarMissing { var } if var == "PROFMATCH_TEST_MISSING_KEY"));
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = ServiceConfig::default();
        overrides.server.port = 8088;
        overrides.pinecone.index_host = Some("rag-abc.svc.pinecone.io".into());

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(
            config.pinecone.index_host.as_deref(),
            Some("rag-abc.svc.pinecone.io")
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profmatch.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "0.0.0.0"
port = 9000
route = "/api/chat"

[openai]
base_url = "http://localhost:11434/v1"
chat_model = "llama3.1:8b"

[pinecone]
index_host = "rag-123.svc.us-east-1.pinecone.io"
"#,
        )
        .unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.openai.base_url, "http://localhost:11434/v1");
        assert_eq!(config.openai.chat_model, "llama3.1:8b");
        // Untouched fields keep their defaults
        assert_eq!(config.openai.embedding_model, "text-embedding-ada-002");
        assert_eq!(config.pinecone.index, "rag");
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("nope.toml")), None);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = ServiceConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.server.port, 3000);
        assert_eq!(restored.pinecone.namespace, "ns1");
    }
}
