//! Error types for the `ali-rag` crate.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in retrieval operations.
///
/// Health checks never produce one of these; degraded health is reported as
/// data through [`HealthReport`](crate::document::HealthReport).
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The document store rejected a request or returned a malformed response.
    #[error("Document store error ({backend}): {message}")]
    StoreError {
        /// The document store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The document store could not be reached (connection refused, timeout, 5xx).
    #[error("Document store unavailable ({backend}): {message}")]
    StoreUnavailable {
        /// The document store backend that could not be reached.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A document could not be embedded or written.
    #[error("failed to ingest document '{document_id}': {source}")]
    IngestError {
        /// The caller-supplied id of the document.
        document_id: String,
        /// The underlying cause.
        #[source]
        source: Box<RagError>,
    },

    /// A query could not be embedded or executed.
    #[error("search failed: {source}")]
    SearchError {
        /// The underlying cause.
        #[source]
        source: Box<RagError>,
    },

    /// The response generator failed to produce a reply.
    #[error("Generation error ({generator}): {message}")]
    GenerationError {
        /// The generator that produced the error.
        generator: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input rejected before reaching any backend.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// The closed set of error kinds callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Embedding,
    Store,
    StoreUnavailable,
    Ingest,
    Search,
    Generation,
    Configuration,
    Validation,
}

impl RagError {
    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::EmbeddingError { .. } => ErrorKind::Embedding,
            RagError::StoreError { .. } => ErrorKind::Store,
            RagError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            RagError::IngestError { .. } => ErrorKind::Ingest,
            RagError::SearchError { .. } => ErrorKind::Search,
            RagError::GenerationError { .. } => ErrorKind::Generation,
            RagError::ConfigError(_) => ErrorKind::Configuration,
            RagError::ValidationError(_) => ErrorKind::Validation,
        }
    }

    /// Whether the failure was caused by an unreachable backend, looking
    /// through ingest and search wrappers.
    pub fn is_unavailable(&self) -> bool {
        match self {
            RagError::StoreUnavailable { .. } => true,
            RagError::IngestError { source, .. } | RagError::SearchError { source } => {
                source.is_unavailable()
            }
            _ => false,
        }
    }

    pub(crate) fn ingest(document_id: impl Into<String>, source: RagError) -> Self {
        RagError::IngestError { document_id: document_id.into(), source: Box::new(source) }
    }

    pub(crate) fn search(source: RagError) -> Self {
        RagError::SearchError { source: Box::new(source) }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
