//! In-memory document store using cosine similarity.
//!
//! This module provides [`InMemoryDocumentStore`], a dependency-free store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It applies the
//! same exact-match filters and the same `cosine + 1.0` scoring as the
//! Elasticsearch backend, which makes it suitable for development and tests.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{LegislativeDocument, SearchFilters};
use crate::error::{RagError, Result};
use crate::store::{DocumentStore, StoreInfo, StoredHit};

#[derive(Debug, Clone)]
struct StoredDocument {
    document: LegislativeDocument,
    embedding: Vec<f32>,
}

#[derive(Debug, Default)]
struct Index {
    dimensions: Option<usize>,
    documents: HashMap<String, StoredDocument>,
}

/// An in-memory [`DocumentStore`].
///
/// # Example
///
/// ```rust,ignore
/// use ali_rag::{DocumentStore, InMemoryDocumentStore};
///
/// let store = InMemoryDocumentStore::new();
/// store.ensure_index(384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    index: RwLock<Index>,
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn error(message: String) -> RagError {
        RagError::StoreError { backend: "in-memory".to_string(), message }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the widths differ.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn backend(&self) -> &str {
        "in-memory"
    }

    async fn ensure_index(&self, dimensions: usize) -> Result<()> {
        let mut index = self.index.write().await;
        index.dimensions.get_or_insert(dimensions);
        Ok(())
    }

    async fn upsert(&self, document: &LegislativeDocument, embedding: &[f32]) -> Result<String> {
        let mut index = self.index.write().await;
        let dimensions =
            index.dimensions.ok_or_else(|| Self::error("index does not exist".into()))?;
        if embedding.len() != dimensions {
            return Err(Self::error(format!(
                "embedding has {} dimensions, index expects {dimensions}",
                embedding.len()
            )));
        }
        index.documents.insert(
            document.id.clone(),
            StoredDocument { document: document.clone(), embedding: embedding.to_vec() },
        );
        Ok(document.id.clone())
    }

    async fn search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        size: usize,
    ) -> Result<Vec<StoredHit>> {
        let index = self.index.read().await;
        if index.dimensions.is_none() {
            return Err(Self::error("index does not exist".into()));
        }

        let mut scored: Vec<StoredHit> = index
            .documents
            .values()
            .filter(|stored| filters.matches(&stored.document))
            .map(|stored| StoredHit {
                document: stored.document.clone(),
                score: f64::from(cosine_similarity(&stored.embedding, embedding)) + 1.0,
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(size);
        Ok(scored)
    }

    async fn categories(&self) -> Result<BTreeSet<String>> {
        let index = self.index.read().await;
        Ok(index
            .documents
            .values()
            .map(|stored| stored.document.category.clone())
            .filter(|c| !c.is_empty())
            .collect())
    }

    async fn info(&self) -> Result<StoreInfo> {
        let index = self.index.read().await;
        Ok(StoreInfo {
            cluster_name: Some("in-memory".to_string()),
            version: None,
            index_exists: index.dimensions.is_some(),
            document_count: Some(index.documents.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rejects_writes_before_index_exists_and_on_width_mismatch() {
        let store = InMemoryDocumentStore::new();
        let doc = LegislativeDocument {
            id: "a".into(),
            source_type: "law".into(),
            category: "c".into(),
            status: "s".into(),
            legislative_period: "p".into(),
            author: "x".into(),
            document_type: "law".into(),
            title: "t".into(),
            summary: String::new(),
            content: "body".into(),
            date: None,
            municipality: String::new(),
            tokens: 0,
            file_path: String::new(),
        };
        assert!(store.upsert(&doc, &[1.0, 0.0]).await.is_err());

        store.ensure_index(2).await.unwrap();
        assert!(store.upsert(&doc, &[1.0, 0.0, 0.0]).await.is_err());
        assert_eq!(store.upsert(&doc, &[1.0, 0.0]).await.unwrap(), "a");
        assert_eq!(store.info().await.unwrap().document_count, Some(1));
    }
}
