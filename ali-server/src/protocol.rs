use std::collections::BTreeMap;

use ali_rag::{ChatTurn, HealthStatus, LegislativeDocument, SearchFilters, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on `max_results` / `top_k` accepted from clients.
pub const MAX_RESULTS_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub legislative_period: Option<String>,
}

impl SearchRequest {
    /// Filters with blank values dropped.
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            source_type: self.source_type.clone(),
            category: self.category.clone(),
            status: self.status.clone(),
            legislative_period: self.legislative_period.clone(),
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleSearchQuery {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleSearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub document: LegislativeDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub document_id: String,
    pub message: String,
}

/// Free text to be chunked and ingested. A missing `document_id` gets a fresh UUID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUploadRequest {
    #[serde(default)]
    pub document_id: Option<String>,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUploadResponse {
    pub success: bool,
    pub message: String,
    pub document_ids: Vec<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

pub type ChatResponse = ChatTurn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub diagnostics: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
}
