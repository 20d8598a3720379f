//! The retrieval service.
//!
//! [`RetrievalService`] is the only component that talks to the document
//! store. It composes an [`EmbeddingProvider`] and a [`DocumentStore`] and
//! owns the ingest and query workflows:
//!
//! - ingest: validate → embed(title, summary, content) → upsert by id
//! - search: validate → embed(query) → filtered vector search → map results
//!
//! # Example
//!
//! ```rust,ignore
//! use ali_rag::{RagConfig, RetrievalService, SearchFilters};
//!
//! let service = RetrievalService::from_config(RagConfig::from_env()?)?;
//! service.initialize().await?;
//! service.ingest(&document).await?;
//! let results = service
//!     .search("mental health", None, &SearchFilters::none().with_category("health"))
//!     .await?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::chunking::TextChunker;
use crate::config::RagConfig;
use crate::document::{
    HealthReport, HealthStatus, LegislativeDocument, MAX_RELEVANCE_SCORE, MIN_RELEVANCE_SCORE,
    SearchFilters, SearchResult, TextIngestRequest,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::hashing::HashingEmbeddingProvider;
use crate::inmemory::InMemoryDocumentStore;
use crate::store::DocumentStore;

/// Defaults applied to chunks produced by [`RetrievalService::ingest_text`].
const UPLOAD_SOURCE_TYPE: &str = "upload";
const UPLOAD_CATEGORY: &str = "document";
const UPLOAD_STATUS: &str = "active";

/// Retrieval over legislative documents.
///
/// Holds no per-request state; share it across requests behind an `Arc`.
pub struct RetrievalService {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    chunker: TextChunker,
    /// Set once the index is known to exist with the persisted layout.
    index_ready: OnceCell<()>,
}

impl RetrievalService {
    /// Create a new [`RetrievalServiceBuilder`].
    pub fn builder() -> RetrievalServiceBuilder {
        RetrievalServiceBuilder::default()
    }

    /// Build the service with the provider and store selected by `config`.
    ///
    /// - `store_url == "memory://"` selects [`InMemoryDocumentStore`]; any
    ///   other URL selects the Elasticsearch store.
    /// - `embedding_model == "hashing"` selects [`HashingEmbeddingProvider`];
    ///   any other model uses the OpenAI-compatible provider at `embedding_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a selected backend cannot be
    /// constructed, its feature is disabled, or a model other than `hashing`
    /// has no `embedding_url`.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        let store = store_for(&config)?;
        let embedding_provider = embedding_provider_for(&config)?;
        info!(
            store = store.backend(),
            embedding_provider = embedding_provider.name(),
            index = %config.index_name,
            "retrieval service configured"
        );
        Self::builder().config(config).embedding_provider(embedding_provider).store(store).build()
    }

    /// Return a reference to the service configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Create the index with the persisted layout if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the store error if the index cannot be created.
    pub async fn initialize(&self) -> Result<()> {
        self.create_index().await?;
        let _ = self.index_ready.set(());
        Ok(())
    }

    async fn create_index(&self) -> Result<()> {
        let dimensions = self.config.embedding_dimensions;
        self.store.ensure_index(dimensions).await.map_err(|e| {
            error!(index = %self.config.index_name, error = %e, "failed to create index");
            e
        })?;
        info!(index = %self.config.index_name, dimensions, "index ready");
        Ok(())
    }

    /// Create the index on first use when [`initialize`](Self::initialize)
    /// did not succeed, so a write never lands in a dynamically mapped index.
    async fn ensure_index_ready(&self) -> Result<()> {
        self.index_ready.get_or_try_init(|| self.create_index()).await?;
        Ok(())
    }

    /// Embed and store a document, overwriting any record with the same id.
    ///
    /// Returns the stored document id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a blank id or content, or
    /// content without a single indexable term, and [`RagError::IngestError`]
    /// if embedding, index creation or the store write fails.
    pub async fn ingest(&self, document: &LegislativeDocument) -> Result<String> {
        document.validate()?;

        let embedding =
            self.embedding_provider.embed(&document.embedding_text()).await.map_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
                RagError::ingest(&document.id, e)
            })?;
        if is_zero_vector(&embedding) {
            return Err(RagError::ValidationError(format!(
                "document '{}' has no indexable text",
                document.id
            )));
        }

        let expected = self.config.embedding_dimensions;
        if embedding.len() != expected {
            error!(
                document.id = %document.id,
                actual = embedding.len(),
                expected,
                "embedding dimension mismatch"
            );
            return Err(RagError::ingest(
                &document.id,
                RagError::EmbeddingError {
                    provider: self.embedding_provider.name().to_string(),
                    message: format!(
                        "produced {} dimensions, index expects {expected}",
                        embedding.len()
                    ),
                },
            ));
        }

        self.ensure_index_ready().await.map_err(|e| RagError::ingest(&document.id, e))?;

        let id = self.store.upsert(document, &embedding).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "upsert failed during ingestion");
            RagError::ingest(&document.id, e)
        })?;

        info!(document.id = %id, category = %document.category, "ingested document");
        Ok(id)
    }

    /// Split free text into chunks and ingest each one as its own document.
    ///
    /// Chunk ids are `{document_id}_{index}` and titles `{title} - Part {index + 1}`.
    /// Returns the stored ids in chunk order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a blank id, title or text, and
    /// the first [`RagError::IngestError`] encountered otherwise. Chunks
    /// written before the failure stay written.
    pub async fn ingest_text(&self, request: &TextIngestRequest) -> Result<Vec<String>> {
        if request.document_id.trim().is_empty() {
            return Err(RagError::ValidationError("document_id must not be empty".to_string()));
        }
        if request.title.trim().is_empty() {
            return Err(RagError::ValidationError("title must not be empty".to_string()));
        }

        let chunks = self.chunker.chunk(&request.text);
        if chunks.is_empty() {
            return Err(RagError::ValidationError("text must not be empty".to_string()));
        }

        let pick = |value: &Option<String>, fallback: &str| {
            let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty());
            value.unwrap_or(fallback).to_string()
        };
        let source_type = pick(&request.source_type, UPLOAD_SOURCE_TYPE);
        let category = pick(&request.category, UPLOAD_CATEGORY);
        let file_path = request.file_name.clone().unwrap_or_default();

        let mut ids = Vec::with_capacity(chunks.len());
        for (index, content) in chunks.into_iter().enumerate() {
            let document = LegislativeDocument {
                id: format!("{}_{index}", request.document_id),
                source_type: source_type.clone(),
                category: category.clone(),
                status: UPLOAD_STATUS.to_string(),
                legislative_period: String::new(),
                author: String::new(),
                document_type: UPLOAD_SOURCE_TYPE.to_string(),
                title: format!("{} - Part {}", request.title, index + 1),
                summary: String::new(),
                tokens: u32::try_from(content.split_whitespace().count()).unwrap_or(u32::MAX),
                content,
                date: None,
                municipality: String::new(),
                file_path: file_path.clone(),
            };
            ids.push(self.ingest(&document).await?);
        }

        info!(document.id = %request.document_id, chunk_count = ids.len(), "ingested text");
        Ok(ids)
    }

    /// Return up to `max_results` documents passing every filter, ordered by
    /// non-increasing relevance score.
    ///
    /// `max_results` defaults to the configured `default_max_results`. An
    /// empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a blank query, a query
    /// without searchable terms or a zero `max_results`, and
    /// [`RagError::SearchError`] if embedding or the store query fails.
    pub async fn search(
        &self,
        query: &str,
        max_results: Option<usize>,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::ValidationError("query must not be empty".to_string()));
        }
        let size = max_results.unwrap_or(self.config.default_max_results);
        if size == 0 {
            return Err(RagError::ValidationError("max_results must be positive".to_string()));
        }

        let embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during search");
            RagError::search(e)
        })?;
        if is_zero_vector(&embedding) {
            return Err(RagError::ValidationError(
                "query must contain at least one searchable term".to_string(),
            ));
        }

        let hits = self.store.search(&embedding, filters, size).await.map_err(|e| {
            error!(index = %self.config.index_name, error = %e, "document store search failed");
            RagError::search(e)
        })?;

        let results: Vec<SearchResult> = hits
            .into_iter()
            .take(size)
            .map(|hit| {
                let score = clamp_score(&hit.document.id, hit.score);
                SearchResult::from_document(hit.document, score)
            })
            .collect();

        debug!(result_count = results.len(), size, filters = ?filters.terms(), "search completed");
        Ok(results)
    }

    /// Report store reachability. Never fails.
    ///
    /// Every failure, including a store that does not answer within the
    /// configured request timeout, yields [`HealthStatus::Unhealthy`] with
    /// an `error` diagnostic.
    pub async fn health_check(&self) -> HealthReport {
        let mut diagnostics = BTreeMap::new();
        diagnostics.insert("backend".to_string(), json!(self.store.backend()));
        diagnostics.insert("index".to_string(), json!(self.config.index_name));
        diagnostics.insert("embedding_model".to_string(), json!(self.config.embedding_model));
        diagnostics
            .insert("embedding_provider".to_string(), json!(self.embedding_provider.name()));

        let outcome = tokio::time::timeout(self.config.request_timeout(), self.store.info()).await;
        let status = match outcome {
            Ok(Ok(info)) => {
                diagnostics.insert("reachable".to_string(), Value::Bool(true));
                diagnostics.insert("index_exists".to_string(), Value::Bool(info.index_exists));
                if let Some(cluster_name) = info.cluster_name {
                    diagnostics.insert("cluster_name".to_string(), json!(cluster_name));
                }
                if let Some(version) = info.version {
                    diagnostics.insert("version".to_string(), json!(version));
                }
                if let Some(count) = info.document_count {
                    diagnostics.insert("document_count".to_string(), json!(count));
                }
                if info.index_exists {
                    HealthStatus::Healthy
                } else {
                    warn!(index = %self.config.index_name, "health check found no index");
                    diagnostics.insert(
                        "error".to_string(),
                        json!(format!("index '{}' is missing", self.config.index_name)),
                    );
                    HealthStatus::Unhealthy
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "health check failed");
                diagnostics.insert("reachable".to_string(), Value::Bool(false));
                diagnostics.insert("error".to_string(), json!(e.to_string()));
                HealthStatus::Unhealthy
            }
            Err(_) => {
                warn!(timeout_secs = self.config.request_timeout_secs, "health check timed out");
                diagnostics.insert("reachable".to_string(), Value::Bool(false));
                diagnostics.insert(
                    "error".to_string(),
                    json!(format!(
                        "store did not answer within {}s",
                        self.config.request_timeout_secs
                    )),
                );
                HealthStatus::Unhealthy
            }
        };

        HealthReport { status, diagnostics }
    }

    /// Distinct `category` values across stored documents.
    ///
    /// Best effort: failures are logged and yield an empty set.
    pub async fn list_categories(&self) -> BTreeSet<String> {
        match self.store.categories().await {
            Ok(categories) => categories,
            Err(e) => {
                warn!(error = %e, "failed to list categories");
                BTreeSet::new()
            }
        }
    }

    /// Release store resources.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        info!(store = self.store.backend(), "retrieval service closed");
        Ok(())
    }
}

fn clamp_score(document_id: &str, score: f64) -> f64 {
    if (MIN_RELEVANCE_SCORE..=MAX_RELEVANCE_SCORE).contains(&score) {
        return score;
    }
    warn!(document.id = %document_id, score, "relevance score out of range, clamping");
    if score.is_nan() {
        MIN_RELEVANCE_SCORE
    } else {
        score.clamp(MIN_RELEVANCE_SCORE, MAX_RELEVANCE_SCORE)
    }
}

/// Cosine similarity is undefined for a zero-magnitude vector.
fn is_zero_vector(embedding: &[f32]) -> bool {
    embedding.iter().all(|x| *x == 0.0)
}

fn store_for(config: &RagConfig) -> Result<Arc<dyn DocumentStore>> {
    if config.uses_memory_store() {
        return Ok(Arc::new(InMemoryDocumentStore::new()));
    }

    #[cfg(feature = "elasticsearch")]
    {
        Ok(Arc::new(crate::elasticsearch::ElasticsearchStore::from_config(config)?))
    }

    #[cfg(not(feature = "elasticsearch"))]
    {
        Err(RagError::ConfigError(format!(
            "store_url '{}' requires the `elasticsearch` feature",
            config.store_url
        )))
    }
}

fn embedding_provider_for(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.uses_hashing_embedder() {
        return Ok(Arc::new(HashingEmbeddingProvider::new(config.embedding_dimensions)));
    }
    if config.embedding_url.is_none() {
        return Err(RagError::ConfigError(format!(
            "embedding model '{}' needs an embedding_url; use '{}' for in-process embeddings",
            config.embedding_model,
            crate::config::HASHING_MODEL
        )));
    }

    #[cfg(feature = "openai")]
    {
        Ok(Arc::new(crate::openai::OpenAIEmbeddingProvider::from_config(config)?))
    }

    #[cfg(not(feature = "openai"))]
    {
        Err(RagError::ConfigError(format!(
            "embedding model '{}' requires the `openai` feature",
            config.embedding_model
        )))
    }
}

/// Builder for constructing a [`RetrievalService`].
///
/// `config`, `embedding_provider` and `store` are all required.
#[derive(Default)]
pub struct RetrievalServiceBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl RetrievalServiceBuilder {
    /// Set the service configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the document store.
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [`RetrievalService`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the provider's dimensionality disagrees with the configuration.
    pub fn build(self) -> Result<RetrievalService> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RagError::ConfigError("embedding_provider is required".to_string())
        })?;
        let store =
            self.store.ok_or_else(|| RagError::ConfigError("store is required".to_string()))?;

        if embedding_provider.dimensions() != config.embedding_dimensions {
            return Err(RagError::ConfigError(format!(
                "embedding provider '{}' produces {} dimensions, config expects {}",
                embedding_provider.name(),
                embedding_provider.dimensions(),
                config.embedding_dimensions
            )));
        }

        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap);
        Ok(RetrievalService {
            config,
            embedding_provider,
            store,
            chunker,
            index_ready: OnceCell::new(),
        })
    }
}
