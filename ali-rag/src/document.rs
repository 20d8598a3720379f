//! Data types for legislative documents, search results and health reports.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A legislative document as supplied by the caller.
///
/// The embedding is never part of this record: it is always recomputed from
/// `title`, `summary` and `content` at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegislativeDocument {
    /// Caller-supplied identity key. Re-ingesting the same id overwrites.
    pub id: String,
    pub source_type: String,
    pub category: String,
    pub status: String,
    pub legislative_period: String,
    pub author: String,
    pub document_type: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Authoritative full text. Must not be empty.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub municipality: String,
    #[serde(default)]
    pub tokens: u32,
    #[serde(default)]
    pub file_path: String,
}

impl LegislativeDocument {
    /// Check the fields the store cannot do without.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] if `id` or `content` is blank.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RagError::ValidationError("document id must not be empty".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(RagError::ValidationError(format!(
                "document '{}' has empty content",
                self.id
            )));
        }
        Ok(())
    }

    /// The text the embedding is computed over: title, summary and content,
    /// newline-separated, skipping empty parts.
    pub fn embedding_text(&self) -> String {
        [self.title.as_str(), self.summary.as_str(), self.content.as_str()]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Exact-match constraints applied before vector scoring.
///
/// All supplied filters are combined with logical AND. `None` means no
/// constraint on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legislative_period: Option<String>,
}

impl SearchFilters {
    /// Filters with no constraints.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_legislative_period(mut self, period: impl Into<String>) -> Self {
        self.legislative_period = Some(period.into());
        self
    }

    /// Active constraints as `(field, value)` pairs, in a stable order.
    pub fn terms(&self) -> Vec<(&'static str, &str)> {
        [
            ("source_type", self.source_type.as_deref()),
            ("category", self.category.as_deref()),
            ("status", self.status.as_deref()),
            ("legislative_period", self.legislative_period.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }

    /// Whether a stored document passes every constraint.
    pub fn matches(&self, document: &LegislativeDocument) -> bool {
        self.terms().into_iter().all(|(field, value)| {
            let actual = match field {
                "source_type" => &document.source_type,
                "category" => &document.category,
                "status" => &document.status,
                _ => &document.legislative_period,
            };
            actual == value
        })
    }

    /// Drop blank values, so that `""` means "no constraint" rather than
    /// "match empty".
    pub fn normalized(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            source_type: keep(self.source_type),
            category: keep(self.category),
            status: keep(self.status),
            legislative_period: keep(self.legislative_period),
        }
    }
}

/// Lowest possible relevance score (`cosine_similarity == -1`).
pub const MIN_RELEVANCE_SCORE: f64 = 0.0;

/// Highest possible relevance score (`cosine_similarity == 1`).
pub const MAX_RELEVANCE_SCORE: f64 = 2.0;

/// A ranked hit returned from a search.
///
/// `relevance_score` is `cosine_similarity + 1.0`, so it lies in `[0.0, 2.0]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub source_type: String,
    pub category: String,
    pub status: String,
    pub legislative_period: String,
    pub author: String,
    pub document_type: String,
    pub municipality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub tokens: u32,
    pub file_path: String,
    pub relevance_score: f64,
}

impl SearchResult {
    /// Project a stored document into a result with the given score.
    pub fn from_document(document: LegislativeDocument, relevance_score: f64) -> Self {
        Self {
            id: document.id,
            title: document.title,
            content: document.content,
            summary: document.summary,
            source_type: document.source_type,
            category: document.category,
            status: document.status,
            legislative_period: document.legislative_period,
            author: document.author,
            document_type: document.document_type,
            municipality: document.municipality,
            date: document.date,
            tokens: document.tokens,
            file_path: document.file_path,
            relevance_score,
        }
    }
}

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// The result of a health check. Never an error: failures are diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub diagnostics: BTreeMap<String, serde_json::Value>,
}

impl HealthReport {
    /// An unhealthy report carrying a single error message.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        let mut diagnostics = BTreeMap::new();
        diagnostics.insert("error".to_string(), serde_json::Value::String(message.into()));
        Self { status: HealthStatus::Unhealthy, diagnostics }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// A request to split free text into chunks and ingest each one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextIngestRequest {
    /// Base id; chunk ids are `{document_id}_{index}`.
    pub document_id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> LegislativeDocument {
        LegislativeDocument {
            id: "pl-045".into(),
            source_type: "bill".into(),
            category: "health".into(),
            status: "pending".into(),
            legislative_period: "2021-2024".into(),
            author: "Councillor Silva".into(),
            document_type: "bill".into(),
            title: "Mental health program".into(),
            summary: String::new(),
            content: "Creates a municipal mental health program.".into(),
            date: NaiveDate::from_ymd_opt(2023, 4, 12),
            municipality: "Agua Clara".into(),
            tokens: 0,
            file_path: String::new(),
        }
    }

    #[test]
    fn embedding_text_skips_empty_parts() {
        assert_eq!(
            document().embedding_text(),
            "Mental health program\nCreates a municipal mental health program."
        );
    }

    #[test]
    fn validation_requires_id_and_content() {
        assert!(document().validate().is_ok());

        let mut blank_id = document();
        blank_id.id = " ".into();
        assert!(blank_id.validate().is_err());

        let mut blank_content = document();
        blank_content.content = "\n".into();
        assert!(blank_content.validate().is_err());
    }

    #[test]
    fn filters_are_anded() {
        let doc = document();
        assert!(SearchFilters::none().matches(&doc));
        assert!(SearchFilters::none().with_category("health").matches(&doc));
        assert!(
            SearchFilters::none().with_category("health").with_status("pending").matches(&doc)
        );
        assert!(
            !SearchFilters::none().with_category("health").with_status("approved").matches(&doc)
        );
        assert!(!SearchFilters::none().with_category("education").matches(&doc));
    }

    #[test]
    fn blank_filter_values_mean_no_constraint() {
        let filters = SearchFilters {
            category: Some(String::new()),
            status: Some("pending".into()),
            ..SearchFilters::default()
        }
        .normalized();
        assert_eq!(filters.terms(), vec![("status", "pending")]);
    }

    #[test]
    fn deserializes_with_optional_fields_missing() {
        let json = serde_json::json!({
            "id": "lei-1",
            "source_type": "law",
            "category": "education",
            "status": "active",
            "legislative_period": "2021-2024",
            "author": "Mayor",
            "document_type": "law",
            "title": "School meals",
            "content": "Guarantees school meals.",
            "date": "2022-03-01"
        });
        let doc: LegislativeDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.summary, "");
        assert_eq!(doc.date, NaiveDate::from_ymd_opt(2022, 3, 1));
        assert_eq!(doc.tokens, 0);
    }
}
