//! Configuration management for Wayfarer services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values
//!
//! The configuration is built once in `main` and handed to each component
//! by reference; nothing below the entry point reads the environment.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// City dataset
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Generative model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds (buffered replies only)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    /// Path to the JSON file holding the city records
    #[serde(default = "default_dataset_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: gemini, openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    /// Vector store provider: postgres, memory
    #[serde(default = "default_vector_provider")]
    pub provider: String,

    /// Postgres URL (pgvector enabled)
    pub url: Option<String>,

    /// Name of the SQL function performing the nearest-neighbor match
    #[serde(default = "default_match_function")]
    pub match_function: String,

    /// Number of snippets retrieved per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// JSON file of pre-embedded snippets for the memory provider
    pub snippets_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Model provider: gemini, mock
    #[serde(default = "default_model_provider")]
    pub provider: String,

    /// API key for the model provider
    pub api_key: Option<String>,

    /// API base URL
    pub api_base: Option<String>,

    /// Model name
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared secret used by the identity provider to sign bearer tokens.
    /// Authentication is disabled when unset.
    pub jwt_secret: Option<String>,

    /// Expected `aud` claim
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// OpenTelemetry endpoint
    pub otel_endpoint: Option<String>,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_dataset_path() -> String { "data/cities.json".to_string() }
fn default_embedding_provider() -> String { "gemini".to_string() }
fn default_embedding_model() -> String { "text-embedding-004".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_provider_timeout() -> u64 { 30 }
fn default_vector_provider() -> String { "postgres".to_string() }
fn default_match_function() -> String { "match_documents".to_string() }
fn default_top_k() -> usize { 3 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_model_provider() -> String { "gemini".to_string() }
fn default_model_name() -> String { "gemini-1.5-flash".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_output_tokens() -> u32 { 2048 }
fn default_model_timeout() -> u64 { 50 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "wayfarer".to_string() }
fn default_rate_limit() -> u32 { 10 }
fn default_burst() -> u32 { 20 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject combinations that can only fail at request time
    pub fn validate(&self) -> Result<()> {
        if matches!(self.embedding.provider.as_str(), "gemini" | "openai")
            && self.embedding.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(AppError::Configuration {
                message: format!(
                    "embedding.api_key is required for provider '{}'",
                    self.embedding.provider
                ),
            });
        }

        if self.model.provider == "gemini"
            && self.model.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(AppError::Configuration {
                message: "model.api_key is required for provider 'gemini'".to_string(),
            });
        }

        if self.server.request_timeout_secs <= self.model.timeout_secs {
            return Err(AppError::Configuration {
                message: format!(
                    "server.request_timeout_secs ({}) must exceed model.timeout_secs ({})",
                    self.server.request_timeout_secs, self.model.timeout_secs
                ),
            });
        }

        if self.vector_store.top_k == 0 {
            return Err(AppError::Configuration {
                message: "vector_store.top_k must be at least 1".to_string(),
            });
        }

        if self.vector_store.provider == "postgres" && self.vector_store.url.is_none() {
            return Err(AppError::Configuration {
                message: "vector_store.url is required for provider 'postgres'".to_string(),
            });
        }

        if !is_sql_identifier(&self.vector_store.match_function) {
            return Err(AppError::Configuration {
                message: format!(
                    "vector_store.match_function '{}' is not a plain SQL identifier",
                    self.vector_store.match_function
                ),
            });
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

/// Letters, digits and underscores, not starting with a digit
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: None,
            match_function: default_match_function(),
            top_k: default_top_k(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            snippets_path: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            api_key: None,
            api_base: None,
            model: default_model_name(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_model_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            otel_endpoint: None,
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            dataset: DatasetConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            model: ModelConfig::default(),
            auth: AuthConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.embedding.provider = "mock".to_string();
        config.model.provider = "mock".to_string();
        config.vector_store.provider = "memory".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.vector_store.top_k, 3);
        assert_eq!(config.vector_store.match_function, "match_documents");
        assert!(config.auth.jwt_secret.is_none());
    }

    #[test]
    fn test_offline_config_is_valid() {
        assert!(offline_config().validate().is_ok());
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let mut config = offline_config();
        config.model.provider = "gemini".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model.api_key"));

        config.model.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let mut config = offline_config();
        config.vector_store.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_must_exceed_model_timeout() {
        let mut config = offline_config();
        config.server.request_timeout_secs = config.model.timeout_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));

        config.server.request_timeout_secs = config.model.timeout_secs + 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = offline_config();
        config.vector_store.provider = "postgres".to_string();
        assert!(config.validate().is_err());

        config.vector_store.url = Some("postgres://localhost/wayfarer".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_match_function_must_be_identifier() {
        assert!(is_sql_identifier("match_documents"));
        assert!(is_sql_identifier("_private2"));
        assert!(!is_sql_identifier("2fast"));
        assert!(!is_sql_identifier("match; drop table documents"));
        assert!(!is_sql_identifier(""));
    }
}
