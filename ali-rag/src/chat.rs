//! Retrieval-grounded chat turns.
//!
//! [`ChatOrchestrator`] searches for context relevant to the user's message,
//! folds the hits into a system prompt and asks a [`ResponseGenerator`] for
//! the reply. Retrieval is advisory: an empty or failed search still yields
//! a reply, just without grounding.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::document::{SearchFilters, SearchResult};
use crate::error::{RagError, Result};
use crate::service::RetrievalService;

/// Number of characters of each hit's content included in the prompt.
const SNIPPET_CHARS: usize = 500;

/// Default number of search hits used as grounding context.
const DEFAULT_CONTEXT_RESULTS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a legislative assistant for a municipal chamber. \
Answer in the language of the question. When legislative context is provided, base your \
answer on it and cite document titles. When no context is provided, say that no matching \
documents were found and answer from general knowledge, clearly marked as such.";

/// A generative model that turns a prompt into a reply.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// A document used to ground a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
    pub relevance_score: f64,
}

/// The outcome of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub reply: String,
    pub sources: Vec<SourceRef>,
    /// Whether any retrieved context was passed to the generator.
    pub grounded: bool,
}

/// Runs retrieval-grounded chat turns.
pub struct ChatOrchestrator {
    service: Arc<RetrievalService>,
    generator: Arc<dyn ResponseGenerator>,
    context_results: usize,
}

impl ChatOrchestrator {
    pub fn new(service: Arc<RetrievalService>, generator: Arc<dyn ResponseGenerator>) -> Self {
        Self { service, generator, context_results: DEFAULT_CONTEXT_RESULTS }
    }

    /// Set how many search hits are used as context.
    pub fn with_context_results(mut self, n: usize) -> Self {
        self.context_results = n.max(1);
        self
    }

    /// Answer `message`, grounding the reply in search results when any exist.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a blank message and
    /// [`RagError::GenerationError`] if the generator fails. Search failures
    /// never fail the turn.
    pub async fn respond(&self, message: &str) -> Result<ChatTurn> {
        if message.trim().is_empty() {
            return Err(RagError::ValidationError("message must not be empty".to_string()));
        }

        let results = match self
            .service
            .search(message, Some(self.context_results), &SearchFilters::none())
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        };

        let grounded = !results.is_empty();
        let system_prompt = if grounded {
            format!("{SYSTEM_PROMPT}\n\nLegislative context:\n\n{}", format_context(&results))
        } else {
            SYSTEM_PROMPT.to_string()
        };

        let reply = self.generator.generate(&system_prompt, message).await.map_err(|e| {
            error!(generator = self.generator.name(), error = %e, "generation failed");
            e
        })?;

        let sources = results
            .into_iter()
            .map(|r| SourceRef { id: r.id, title: r.title, relevance_score: r.relevance_score })
            .collect::<Vec<_>>();
        info!(grounded, source_count = sources.len(), "chat turn completed");

        Ok(ChatTurn { reply, sources, grounded })
    }
}

/// Render hits as numbered context entries for the prompt.
pub fn format_context(results: &[SearchResult]) -> String {
    let mut context = String::new();
    for (i, result) in results.iter().enumerate() {
        let snippet: String = result.content.chars().take(SNIPPET_CHARS).collect();
        let ellipsis = if result.content.chars().count() > SNIPPET_CHARS { "..." } else { "" };
        let _ = write!(
            context,
            "{}. **{}** (Score: {:.2})\n   {snippet}{ellipsis}\n\n",
            i + 1,
            result.title,
            result.relevance_score
        );
    }
    context
}
