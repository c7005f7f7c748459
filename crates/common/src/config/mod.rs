//! Configuration management for Vitrine services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Text-generation provider configuration
    pub generation: GenerationConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    pub index: IndexConfig,

    /// Retrieval engine configuration
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Provider: openai, mock
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for the chat-completions service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Temperature for structured extraction calls (date analysis)
    #[serde(default = "default_extraction_temperature")]
    pub extraction_temperature: f32,

    /// Temperature for query expansion calls
    #[serde(default = "default_expansion_temperature")]
    pub expansion_temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
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
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on rate-limit errors
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Provider: pinecone, mock
    #[serde(default = "default_index_provider")]
    pub provider: String,

    /// API key for the vector index
    pub api_key: Option<String>,

    /// Index data-plane host, e.g. "my-index-abc123.svc.us-east-1.pinecone.io"
    pub host: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Civil timezone for date filtering
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Maximum reformulations requested per query
    #[serde(default = "default_max_reformulations")]
    pub max_reformulations: usize,

    /// Maximum disciplines classified per query
    #[serde(default = "default_max_disciplines")]
    pub max_disciplines: usize,

    /// Results requested from the index per sub-search
    #[serde(default = "default_per_query_top_k")]
    pub per_query_top_k: usize,

    /// Maximum grouped events returned
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Leading events exposed for prompt construction
    #[serde(default = "default_prompt_events")]
    pub prompt_events: usize,

    /// Simultaneous outbound sub-searches
    #[serde(default = "default_max_concurrent_searches")]
    pub max_concurrent_searches: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_generation_provider() -> String { "openai".to_string() }
fn default_generation_model() -> String { "gpt-4o-mini".to_string() }
fn default_extraction_temperature() -> f32 { 0.0 }
fn default_expansion_temperature() -> f32 { 0.7 }
fn default_generation_timeout() -> u64 { 30 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_index_provider() -> String { "pinecone".to_string() }
fn default_index_timeout() -> u64 { 30 }
fn default_timezone() -> String { "America/Montreal".to_string() }
fn default_max_reformulations() -> usize { 3 }
fn default_max_disciplines() -> usize { 3 }
fn default_per_query_top_k() -> usize { 10 }
fn default_max_results() -> usize { 10 }
fn default_prompt_events() -> usize { 5 }
fn default_max_concurrent_searches() -> usize { 4 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "vitrine".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

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
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
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

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            generation: GenerationConfig {
                provider: default_generation_provider(),
                api_key: None,
                api_base: None,
                model: default_generation_model(),
                extraction_temperature: default_extraction_temperature(),
                expansion_temperature: default_expansion_temperature(),
                timeout_secs: default_generation_timeout(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
            },
            index: IndexConfig {
                provider: default_index_provider(),
                api_key: None,
                host: None,
                timeout_secs: default_index_timeout(),
            },
            retrieval: RetrievalConfig {
                timezone: default_timezone(),
                max_reformulations: default_max_reformulations(),
                max_disciplines: default_max_disciplines(),
                per_query_top_k: default_per_query_top_k(),
                max_results: default_max_results(),
                prompt_events: default_prompt_events(),
                max_concurrent_searches: default_max_concurrent_searches(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.retrieval.timezone, "America/Montreal");
    }

    #[test]
    fn test_retrieval_caps() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.max_reformulations, 3);
        assert_eq!(config.retrieval.max_disciplines, 3);
        assert_eq!(config.retrieval.max_results, 10);
        assert_eq!(config.retrieval.prompt_events, 5);
        assert_eq!(config.retrieval.max_concurrent_searches, 4);
    }

    #[test]
    fn test_timeouts_as_durations() {
        let config = AppConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }
}
