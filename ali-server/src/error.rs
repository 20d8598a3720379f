//! Mapping of service failures onto HTTP responses.
//!
//! Clients get a stable error kind and a generic message. The full error,
//! including backend text, is only written to the server log.

use std::time::Duration;

use ali_rag::{ErrorKind, RagError};
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::protocol::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected at the HTTP boundary. The message is safe to return.
    #[error("{0}")]
    Validation(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("response generation is not configured")]
    GeneratorUnavailable,

    #[error(transparent)]
    Rag(#[from] RagError),
}

impl ApiError {
    /// Status code and machine-readable kind.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ApiError::GeneratorUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "generator_unavailable")
            }
            ApiError::Rag(e) if e.is_unavailable() => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
            }
            ApiError::Rag(e) => match e.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation_error"),
                ErrorKind::Ingest => (StatusCode::INTERNAL_SERVER_ERROR, "ingest_failed"),
                ErrorKind::Generation => (StatusCode::BAD_GATEWAY, "generation_failed"),
                ErrorKind::Configuration => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
                }
                ErrorKind::Search
                | ErrorKind::Embedding
                | ErrorKind::Store
                | ErrorKind::StoreUnavailable => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "search_failed")
                }
            },
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Validation(message) => message.clone(),
            ApiError::Rag(RagError::ValidationError(message)) => message.clone(),
            ApiError::RateLimited { retry_after } => {
                format!("too many requests, retry in {}s", retry_after.as_secs().max(1))
            }
            ApiError::GeneratorUnavailable => self.to_string(),
            ApiError::Rag(e) if e.is_unavailable() => {
                "the document store is temporarily unavailable".to_string()
            }
            ApiError::Rag(e) => match e.kind() {
                ErrorKind::Ingest => "the document could not be stored".to_string(),
                ErrorKind::Generation => "the response could not be generated".to_string(),
                ErrorKind::Configuration => "the service is misconfigured".to_string(),
                _ => "the search could not be completed".to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            error!(error.kind = kind, error = %self, "request failed");
        } else {
            warn!(error.kind = kind, error = %self, "request rejected");
        }

        let body =
            ErrorBody { success: false, error: kind.to_string(), message: self.public_message() };
        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
