//! Document store trait for persisting embedded documents and scoring them
//! against a query vector.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::document::{LegislativeDocument, SearchFilters};
use crate::error::Result;

/// Painless script used for combined filter + vector scoring.
///
/// Every store realization must score with exactly this formula so that
/// scores stay comparable across backends and migrations.
pub const SCORE_SCRIPT: &str = "cosineSimilarity(params.query_vector, 'embedding') + 1.0";

/// A stored document paired with its `cosine + 1.0` score.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    pub document: LegislativeDocument,
    pub score: f64,
}

/// Reachability and identity information reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreInfo {
    pub cluster_name: Option<String>,
    pub version: Option<String>,
    pub index_exists: bool,
    pub document_count: Option<u64>,
}

/// A storage backend holding legislative documents with a dense vector field.
///
/// Implementations own their connection handles and are shared across
/// requests, so they must be `Send + Sync`.
///
/// # Example
///
/// ```rust,ignore
/// use ali_rag::{DocumentStore, InMemoryDocumentStore, SearchFilters};
///
/// let store = InMemoryDocumentStore::new();
/// store.ensure_index(384).await?;
/// store.upsert(&document, &embedding).await?;
/// let hits = store.search(&query_embedding, &SearchFilters::none(), 5).await?;
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Create the index with the persisted layout. No-op if it already exists.
    async fn ensure_index(&self, dimensions: usize) -> Result<()>;

    /// Write a document and its embedding keyed by `document.id`, overwriting
    /// any existing record. Returns the stored id.
    async fn upsert(&self, document: &LegislativeDocument, embedding: &[f32]) -> Result<String>;

    /// Return up to `size` documents passing every filter, ordered by
    /// descending score.
    async fn search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        size: usize,
    ) -> Result<Vec<StoredHit>>;

    /// Distinct values of the `category` field.
    async fn categories(&self) -> Result<BTreeSet<String>>;

    /// Ping the store and describe the index.
    async fn info(&self) -> Result<StoreInfo>;

    /// Release pooled resources. The default implementation does nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
