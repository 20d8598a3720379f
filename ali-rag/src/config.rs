//! Configuration for the retrieval service.
//!
//! A [`RagConfig`] is built either programmatically through
//! [`RagConfig::builder()`] or from the process environment through
//! [`RagConfig::from_env()`]. Both paths validate the result and fail fast
//! with [`RagError::ConfigError`], since no request can succeed without a
//! usable store endpoint.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// `store_url` value that selects the in-memory document store.
pub const MEMORY_STORE_URL: &str = "memory://";

/// `embedding_model` value that selects the in-process feature-hashing embedder.
pub const HASHING_MODEL: &str = "hashing";

/// A secret string whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Credentials used to authenticate against the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreCredentials {
    /// An Elasticsearch API key, sent as `Authorization: ApiKey <key>`.
    ApiKey { key: Secret },
    /// HTTP basic authentication.
    Basic { username: String, password: Secret },
}

/// Configuration parameters for the retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Embedding model identifier. [`HASHING_MODEL`] selects the in-process embedder.
    pub embedding_model: String,
    /// Width of the embedding vectors; must match the store's field width.
    pub embedding_dimensions: usize,
    /// Base URL of an OpenAI-compatible embeddings API.
    pub embedding_url: Option<String>,
    /// API key for the embeddings API.
    pub embedding_api_key: Option<Secret>,
    /// Document store endpoint. [`MEMORY_STORE_URL`] selects the in-memory store.
    pub store_url: String,
    /// Document store credentials.
    pub store_credentials: Option<StoreCredentials>,
    /// Index (collection) name in the document store.
    pub index_name: String,
    /// Number of results returned when the caller does not ask for a specific count.
    pub default_max_results: usize,
    /// Maximum chunk size in characters for free-text ingestion.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Timeout applied to every external request, in seconds.
    pub request_timeout_secs: u64,
    /// Transport-level retries for the store client.
    pub max_retries: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_dimensions: 384,
            embedding_url: None,
            embedding_api_key: None,
            store_url: String::new(),
            store_credentials: None,
            index_name: "agua-clara-ms".to_string(),
            default_max_results: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
            request_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `ELASTICSEARCH_URL` is missing or
    /// any value fails to parse or validate.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Recognized keys: `ELASTICSEARCH_URL`, `ELASTICSEARCH_API_KEY`,
    /// `ELASTICSEARCH_USERNAME`, `ELASTICSEARCH_PASSWORD`, `ELASTICSEARCH_TIMEOUT`,
    /// `ELASTICSEARCH_MAX_RETRIES`, `RAG_INDEX_NAME`, `RAG_EMBEDDING_MODEL`,
    /// `RAG_EMBEDDING_DIMENSIONS`, `RAG_EMBEDDING_URL`, `RAG_EMBEDDING_API_KEY`,
    /// `RAG_MAX_RESULTS`, `RAG_CHUNK_SIZE`, `RAG_CHUNK_OVERLAP`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let store_url = get("ELASTICSEARCH_URL")
            .ok_or_else(|| RagError::ConfigError("ELASTICSEARCH_URL must be set".to_string()))?;
        let mut builder = RagConfig::builder().store_url(store_url);

        if let Some(key) = get("ELASTICSEARCH_API_KEY") {
            builder = builder.store_credentials(StoreCredentials::ApiKey { key: Secret::new(key) });
        } else if let Some(username) = get("ELASTICSEARCH_USERNAME") {
            let password = get("ELASTICSEARCH_PASSWORD").unwrap_or_default();
            let password = Secret::new(password);
            builder = builder.store_credentials(StoreCredentials::Basic { username, password });
        }
        if let Some(index) = get("RAG_INDEX_NAME") {
            builder = builder.index_name(index);
        }
        if let Some(model) = get("RAG_EMBEDDING_MODEL") {
            builder = builder.embedding_model(model);
        }
        if let Some(url) = get("RAG_EMBEDDING_URL") {
            builder = builder.embedding_url(url);
        }
        if let Some(key) = get("RAG_EMBEDDING_API_KEY") {
            builder = builder.embedding_api_key(key);
        }
        if let Some(value) = get("RAG_EMBEDDING_DIMENSIONS") {
            let dims = parse_number("RAG_EMBEDDING_DIMENSIONS", &value)?;
            builder = builder.embedding_dimensions(dims);
        }
        if let Some(value) = get("RAG_MAX_RESULTS") {
            builder = builder.default_max_results(parse_number("RAG_MAX_RESULTS", &value)?);
        }
        if let Some(value) = get("RAG_CHUNK_SIZE") {
            builder = builder.chunk_size(parse_number("RAG_CHUNK_SIZE", &value)?);
        }
        if let Some(value) = get("RAG_CHUNK_OVERLAP") {
            builder = builder.chunk_overlap(parse_number("RAG_CHUNK_OVERLAP", &value)?);
        }
        if let Some(value) = get("ELASTICSEARCH_TIMEOUT") {
            let secs = parse_number("ELASTICSEARCH_TIMEOUT", &value)?;
            builder = builder.request_timeout_secs(secs);
        }
        if let Some(value) = get("ELASTICSEARCH_MAX_RETRIES") {
            builder = builder.max_retries(parse_number("ELASTICSEARCH_MAX_RETRIES", &value)?);
        }

        builder.build()
    }

    /// The request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether the in-memory store was selected.
    pub fn uses_memory_store(&self) -> bool {
        self.store_url == MEMORY_STORE_URL
    }

    /// Whether the in-process hashing embedder was selected.
    pub fn uses_hashing_embedder(&self) -> bool {
        self.embedding_model == HASHING_MODEL
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        RagError::ConfigError(format!("{key} must be a non-negative integer, got '{value}'"))
    })
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the embedding dimensionality.
    pub fn embedding_dimensions(mut self, dims: usize) -> Self {
        self.config.embedding_dimensions = dims;
        self
    }

    /// Set the base URL of an OpenAI-compatible embeddings API.
    pub fn embedding_url(mut self, url: impl Into<String>) -> Self {
        self.config.embedding_url = Some(url.into());
        self
    }

    /// Set the API key for the embeddings API.
    pub fn embedding_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.embedding_api_key = Some(Secret::new(key));
        self
    }

    /// Set the document store endpoint.
    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.config.store_url = url.into();
        self
    }

    /// Set the document store credentials.
    pub fn store_credentials(mut self, credentials: StoreCredentials) -> Self {
        self.config.store_credentials = Some(credentials);
        self
    }

    /// Set the index name.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_name = name.into();
        self
    }

    /// Set the default number of search results.
    pub fn default_max_results(mut self, n: usize) -> Self {
        self.config.default_max_results = n;
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the per-request timeout in seconds.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the number of transport-level retries for the store client.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `store_url` is empty
    /// - `index_name` is empty
    /// - `chunk_overlap >= chunk_size`
    /// - `default_max_results == 0`
    /// - `embedding_dimensions == 0`
    /// - `request_timeout_secs == 0`
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.store_url.trim().is_empty() {
            return Err(RagError::ConfigError("store_url is required".to_string()));
        }
        if config.index_name.trim().is_empty() {
            return Err(RagError::ConfigError("index_name must not be empty".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.default_max_results == 0 {
            return Err(RagError::ConfigError(
                "default_max_results must be greater than zero".to_string(),
            ));
        }
        if config.embedding_dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if config.request_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}
