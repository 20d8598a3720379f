//! # ali-rag
//!
//! Retrieval-augmented search and ingestion over legislative documents.
//!
//! ## Overview
//!
//! This crate provides the retrieval core of the Ali API:
//!
//! - [`RetrievalService`] - ingest, search, health check and category listing
//! - [`ChatOrchestrator`] - retrieval-grounded chat turns over a [`ResponseGenerator`]
//! - [`DocumentStore`] - storage trait, with [`InMemoryDocumentStore`] and
//!   `ElasticsearchStore` (feature `elasticsearch`)
//! - [`EmbeddingProvider`] - embedding trait, with [`HashingEmbeddingProvider`] and
//!   `OpenAIEmbeddingProvider` (feature `openai`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ali_rag::{RagConfig, RetrievalService, SearchFilters};
//!
//! let config = RagConfig::builder().store_url("memory://").build()?;
//! let service = RetrievalService::from_config(config)?;
//! service.initialize().await?;
//! service.ingest(&document).await?;
//! let results = service.search("mental health", Some(3), &SearchFilters::none()).await?;
//! ```
//!
//! ## Scoring
//!
//! Every store scores hits as `cosine_similarity(query, embedding) + 1.0`, so
//! `relevance_score` lies in `[0.0, 2.0]`.

pub mod chat;
pub mod chunking;
pub mod config;
pub mod document;
#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod inmemory;
#[cfg(feature = "openai")]
pub mod openai;
pub mod retry;
pub mod service;
pub mod store;

pub use chat::{ChatOrchestrator, ChatTurn, ResponseGenerator, SourceRef};
pub use chunking::TextChunker;
pub use config::{RagConfig, RagConfigBuilder, Secret, StoreCredentials};
pub use document::{
    HealthReport, HealthStatus, LegislativeDocument, SearchFilters, SearchResult,
    TextIngestRequest,
};
#[cfg(feature = "elasticsearch")]
pub use elasticsearch::ElasticsearchStore;
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, RagError, Result};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryDocumentStore;
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
pub use retry::RetryPolicy;
pub use service::{RetrievalService, RetrievalServiceBuilder};
pub use store::{DocumentStore, StoreInfo, StoredHit};
