//! OpenAI-compatible embedding and chat-completion clients.
//!
//! Both clients talk to any server exposing the OpenAI `/embeddings` and
//! `/chat/completions` endpoints (OpenAI itself, text-embeddings-inference,
//! vLLM, Ollama's compatibility layer, ...).
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::chat::ResponseGenerator;
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::ConfigError(format!("failed to build http client: {e}")))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

// ── OpenAI API shared error type ───────────────────────────────────

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Configuration
///
/// - `base_url` – defaults to `https://api.openai.com/v1`.
/// - `model` – the embedding model identifier.
/// - `dimensions` – expected output width; requested from the API as a
///   Matryoshka truncation when [`with_requested_dimensions`] is used.
/// - `api_key` – optional bearer token.
///
/// [`with_requested_dimensions`]: OpenAIEmbeddingProvider::with_requested_dimensions
///
/// # Example
///
/// ```rust,ignore
/// use ali_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("http://embed:8080/v1", "all-MiniLM-L6-v2", 384)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            dimensions,
            request_dimensions: None,
        })
    }

    /// Create a provider from a validated [`RagConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `embedding_url` is not set.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let base_url = config.embedding_url.clone().ok_or_else(|| {
            RagError::ConfigError("embedding_url is required for the OpenAI provider".to_string())
        })?;
        Ok(Self {
            client: http_client(config.request_timeout())?,
            base_url,
            api_key: config.embedding_api_key.as_ref().map(|k| k.expose().to_string()),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
            request_dimensions: None,
        })
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Ask the API to truncate embeddings to `dims` (Matryoshka support).
    ///
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_requested_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn error(message: String) -> RagError {
        RagError::EmbeddingError { provider: "OpenAI".into(), message }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| Self::error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "OpenAI",
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let mut request =
            self.client.post(endpoint(&self.base_url, "embeddings")).json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "request failed");
            Self::error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = "OpenAI", %detail, "API error");
            return Err(Self::error(detail));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            Self::error(format!("failed to parse response: {e}"))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(Self::error(format!(
                "API returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        // Servers are allowed to return items out of order.
        parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

/// A [`ResponseGenerator`] backed by an OpenAI-compatible chat-completions API.
///
/// # Example
///
/// ```rust,ignore
/// use ali_rag::openai::OpenAIChatGenerator;
///
/// let generator = OpenAIChatGenerator::new("sk-...")?.with_model("gpt-4o-mini");
/// ```
pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIChatGenerator {
    /// Create a generator with the given API key against the OpenAI API.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("LLM API key must not be empty".into()));
        }
        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT)?,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 2000,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn error(message: String) -> RagError {
        RagError::GenerationError { generator: "OpenAI".into(), message }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ResponseGenerator for OpenAIChatGenerator {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        debug!(generator = "OpenAI", model = %self.model, "requesting chat completion");

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_message },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(generator = "OpenAI", error = %e, "request failed");
                Self::error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(generator = "OpenAI", %detail, "API error");
            return Err(Self::error(detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Self::error(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Self::error("API returned no message content".into()))
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://embed:8080/v1/", "embeddings"),
            "http://embed:8080/v1/embeddings"
        );
        assert_eq!(
            endpoint(OPENAI_BASE_URL, "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_generator_requires_key() {
        assert!(matches!(OpenAIChatGenerator::new(""), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn from_config_requires_embedding_url() {
        let config = RagConfig::builder().store_url("memory://").build().unwrap();
        assert!(OpenAIEmbeddingProvider::from_config(&config).is_err());

        let config = RagConfig::builder()
            .store_url("memory://")
            .embedding_url("http://embed:8080/v1")
            .embedding_dimensions(768)
            .build()
            .unwrap();
        let provider = OpenAIEmbeddingProvider::from_config(&config).unwrap();
        assert_eq!(provider.dimensions(), 768);
    }
}
