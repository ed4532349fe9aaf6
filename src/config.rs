use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

use crate::pipeline::chunking::ChunkStrategy;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docpipe server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Storage backend used for documents and chunks.
    pub store_backend: StoreBackend,
    /// Base URL of the vector store (Qdrant) instance.
    pub store_url: String,
    /// Optional API key required to access the vector store.
    pub store_api_key: Option<String>,
    /// Prefix applied to the document and chunk collections.
    pub collection_prefix: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of chunks sent to the embedding provider per batch.
    pub embedding_batch_size: usize,
    /// Default chunking strategy applied when a request omits one.
    pub chunk_strategy: ChunkStrategy,
    /// Default maximum chunk size in characters.
    pub chunk_max_size: usize,
    /// Default overlap carried between adjacent chunks, in characters.
    pub chunk_overlap: usize,
    /// Chunks shorter than this many characters are discarded.
    pub chunk_min_size: usize,
    /// Default number of hits returned by a query.
    pub search_default_limit: usize,
    /// Upper bound applied to the per-query hit limit.
    pub search_max_limit: usize,
    /// Default minimum similarity score accepted from the store.
    pub search_default_threshold: f32,
    /// Answer generation provider, if any.
    pub generation_provider: GenerationProvider,
    /// Model identifier used for answer generation.
    pub generation_model: Option<String>,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: Option<String>,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported storage backends for documents and chunks.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, useful for development and tests.
    Memory,
    /// Qdrant reached over HTTP.
    Qdrant,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic content-hash encoder, no external calls.
    Hash,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported answer generation backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Answer generation disabled; retrieval returns raw chunks only.
    None,
    /// Local Ollama runtime.
    Ollama,
}

const DEFAULT_STORE_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_COLLECTION_PREFIX: &str = "docpipe";
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100;
const DEFAULT_CHUNK_MAX_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_CHUNK_MIN_SIZE: usize = 10;
const DEFAULT_SEARCH_LIMIT: usize = 5;
const DEFAULT_SEARCH_MAX_LIMIT: usize = 50;
const DEFAULT_SEARCH_THRESHOLD: f32 = 0.25;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store_backend: load_env_optional("STORE_BACKEND")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("STORE_BACKEND".to_string()))
                })
                .transpose()?
                .unwrap_or(StoreBackend::Qdrant),
            store_url: load_env_optional("STORE_URL")
                .unwrap_or_else(|| DEFAULT_STORE_URL.to_string()),
            store_api_key: load_env_optional("STORE_API_KEY"),
            collection_prefix: load_env_optional("COLLECTION_PREFIX")
                .unwrap_or_else(|| DEFAULT_COLLECTION_PREFIX.to_string()),
            embedding_provider: load_env("EMBEDDING_PROVIDER")?.parse().map_err(|()| {
                ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
            })?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?.parse().map_err(|_| {
                ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string())
            })?,
            embedding_batch_size: parse_optional(
                "EMBEDDING_BATCH_SIZE",
                DEFAULT_EMBEDDING_BATCH_SIZE,
            )?,
            chunk_strategy: load_env_optional("CHUNK_STRATEGY")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("CHUNK_STRATEGY".to_string()))
                })
                .transpose()?
                .unwrap_or(ChunkStrategy::Sentence),
            chunk_max_size: parse_optional("CHUNK_MAX_SIZE", DEFAULT_CHUNK_MAX_SIZE)?,
            chunk_overlap: parse_optional("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            chunk_min_size: parse_optional("CHUNK_MIN_SIZE", DEFAULT_CHUNK_MIN_SIZE)?,
            search_default_limit: parse_optional("SEARCH_DEFAULT_LIMIT", DEFAULT_SEARCH_LIMIT)?,
            search_max_limit: parse_optional("SEARCH_MAX_LIMIT", DEFAULT_SEARCH_MAX_LIMIT)?,
            search_default_threshold: parse_optional(
                "SEARCH_DEFAULT_THRESHOLD",
                DEFAULT_SEARCH_THRESHOLD,
            )?,
            generation_provider: load_env_optional("GENERATION_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("GENERATION_PROVIDER".to_string()))
                })
                .transpose()?
                .unwrap_or(GenerationProvider::None),
            generation_model: load_env_optional("GENERATION_MODEL"),
            ollama_url: load_env_optional("OLLAMA_URL"),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        store_backend = ?config.store_backend,
        store_url = %config.store_url,
        collection_prefix = %config.collection_prefix,
        embedding_provider = ?config.embedding_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_known_values() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("Qdrant".parse::<StoreBackend>(), Ok(StoreBackend::Qdrant));
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn embedding_provider_parses_case_insensitively() {
        assert_eq!(
            "OLLAMA".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Ollama)
        );
        assert_eq!(
            "hash".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Hash)
        );
        assert!("openai-v9".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn generation_provider_defaults_to_none_variant() {
        assert_eq!(
            "none".parse::<GenerationProvider>(),
            Ok(GenerationProvider::None)
        );
        assert!("bedrock".parse::<GenerationProvider>().is_err());
    }
}
