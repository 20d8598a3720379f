//! Server configuration loaded from the environment.

use std::str::FromStr;

use ali_rag::RagConfig;
use anyhow::{Context, bail};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Console,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "console" | "text" | "pretty" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            other => bail!("LOG_FORMAT must be 'console' or 'json', got '{other}'"),
        }
    }
}

/// Settings for the OpenAI-compatible chat generator.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Requests per minute allowed on each rate-limited route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub search: u32,
    pub simple_search: u32,
    pub upload: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { search: 10, simple_search: 20, upload: 5 }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// `["*"]` allows any origin.
    pub allowed_origins: Vec<String>,
    pub rate_limits: RateLimitConfig,
    /// `None` disables `/chat`.
    pub llm: Option<LlmConfig>,
    pub rag: RagConfig,
}

impl ServerConfig {
    /// Defaults suitable for tests and local runs: in-memory store, hashing embedder.
    pub fn local() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Console,
            allowed_origins: vec!["*".to_string()],
            rate_limits: RateLimitConfig::default(),
            llm: None,
            rag: RagConfig {
                store_url: ali_rag::config::MEMORY_STORE_URL.to_string(),
                embedding_model: ali_rag::config::HASHING_MODEL.to_string(),
                ..RagConfig::default()
            },
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Retrieval settings are read by [`RagConfig::from_lookup`]; a missing
    /// `ELASTICSEARCH_URL` is a startup error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rag = RagConfig::from_lookup(&lookup).context("invalid retrieval configuration")?;

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got '{value}'"))?,
            None => 8000,
        };
        let log_format = match get("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::Console,
        };
        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let defaults = RateLimitConfig::default();
        let rate_limits = RateLimitConfig {
            search: parse_or("RATE_LIMIT_SEARCH", get("RATE_LIMIT_SEARCH"), defaults.search)?,
            simple_search: parse_or(
                "RATE_LIMIT_SIMPLE_SEARCH",
                get("RATE_LIMIT_SIMPLE_SEARCH"),
                defaults.simple_search,
            )?,
            upload: parse_or("RATE_LIMIT_UPLOAD", get("RATE_LIMIT_UPLOAD"), defaults.upload)?,
        };

        let llm = match get("LLM_API_KEY") {
            Some(api_key) => Some(LlmConfig {
                api_key,
                model: get("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                base_url: get("LLM_BASE_URL"),
                temperature: parse_or(
                    "DEFAULT_LLM_TEMPERATURE",
                    get("DEFAULT_LLM_TEMPERATURE"),
                    0.2,
                )?,
                max_tokens: parse_or("MAX_TOKENS", get("MAX_TOKENS"), 2000)?,
            }),
            None => None,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()).to_lowercase(),
            log_format,
            allowed_origins,
            rate_limits,
            llm,
            rag,
        })
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(value) => value.parse().with_context(|| format!("{key} has invalid value '{value}'")),
        None => Ok(default),
    }
}
