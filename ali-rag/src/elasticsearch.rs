//! Elasticsearch document store backend.
//!
//! Provides [`ElasticsearchStore`] which implements [`DocumentStore`] over the
//! Elasticsearch REST API using `reqwest`. Transport failures (connection
//! errors, timeouts, 502/503/504) are retried with the configured
//! [`RetryPolicy`]; every request carries the configured timeout.
//!
//! This module is only available when the `elasticsearch` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use ali_rag::elasticsearch::ElasticsearchStore;
//!
//! let store = ElasticsearchStore::new("http://localhost:9200", "agua-clara-ms")?;
//! store.ensure_index(384).await?;
//! store.upsert(&document, &embedding).await?;
//! let hits = store.search(&query_embedding, &filters, 5).await?;
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{RagConfig, StoreCredentials};
use crate::document::{LegislativeDocument, SearchFilters};
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;
use crate::store::{DocumentStore, SCORE_SCRIPT, StoreInfo, StoredHit};

const BACKEND: &str = "elasticsearch";

/// Number of category buckets requested from the terms aggregation.
const CATEGORY_BUCKETS: usize = 500;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`DocumentStore`] backed by an Elasticsearch index.
pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    index: String,
    credentials: Option<StoreCredentials>,
    retry: RetryPolicy,
}

impl ElasticsearchStore {
    /// Create a store for `index` on the cluster at `url`, with a 30 second
    /// timeout and the default retry policy.
    pub fn new(url: &str, index: impl Into<String>) -> Result<Self> {
        Self::build(url, index.into(), None, DEFAULT_TIMEOUT, RetryPolicy::default())
    }

    /// Create a store from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::build(
            &config.store_url,
            config.index_name.clone(),
            config.store_credentials.clone(),
            config.request_timeout(),
            RetryPolicy::new(config.max_retries),
        )
    }

    fn build(
        url: &str,
        index: String,
        credentials: Option<StoreCredentials>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base_url = Url::parse(url)
            .map_err(|e| RagError::ConfigError(format!("invalid store url '{url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RagError::ConfigError(format!("store url '{url}' cannot be a base url")));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url, index, credentials, retry })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The index this store reads and writes.
    pub fn index(&self) -> &str {
        &self.index
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.endpoint(segments));
        match &self.credentials {
            Some(StoreCredentials::ApiKey { key }) => builder
                .header(reqwest::header::AUTHORIZATION, format!("ApiKey {}", key.expose())),
            Some(StoreCredentials::Basic { username, password }) => {
                builder.basic_auth(username, Some(password.expose()))
            }
            None => builder,
        }
    }

    /// Send a request, retrying transport failures and gateway errors.
    ///
    /// Other non-success statuses are returned to the caller untouched.
    async fn send<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.retry
            .run(what, || {
                let request = build();
                async move {
                    let response = request.send().await.map_err(map_transport_error)?;
                    match response.status() {
                        StatusCode::BAD_GATEWAY
                        | StatusCode::SERVICE_UNAVAILABLE
                        | StatusCode::GATEWAY_TIMEOUT => Err(RagError::StoreUnavailable {
                            backend: BACKEND.to_string(),
                            message: format!("cluster returned {}", response.status()),
                        }),
                        _ => Ok(response),
                    }
                }
            })
            .await
    }

    async fn index_exists(&self) -> Result<bool> {
        let response = self
            .send("index_exists", || self.request(Method::HEAD, &[self.index.as_str()]))
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(store_error(format!("index existence check returned {status}"))),
        }
    }
}

fn store_error(message: String) -> RagError {
    RagError::StoreError { backend: BACKEND.to_string(), message }
}

fn map_transport_error(e: reqwest::Error) -> RagError {
    if e.is_builder() {
        store_error(format!("invalid request: {e}"))
    } else {
        RagError::StoreUnavailable { backend: BACKEND.to_string(), message: e.to_string() }
    }
}

/// Fail on a non-success status, surfacing the cluster's error reason.
async fn expect_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| format!("{}: {}", e.error.kind, e.error.reason))
        .unwrap_or(body);
    Err(store_error(format!("{what} returned {status}: {reason}")))
}

async fn parse_json<T: for<'de> Deserialize<'de>>(response: Response, what: &str) -> Result<T> {
    response.json().await.map_err(|e| store_error(format!("malformed {what} response: {e}")))
}

// ── Request bodies ─────────────────────────────────────────────────

/// Index mapping for the persisted document layout.
pub fn index_mapping(dimensions: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "source_type": { "type": "keyword" },
                "category": { "type": "keyword" },
                "status": { "type": "keyword" },
                "legislative_period": { "type": "keyword" },
                "author": { "type": "keyword" },
                "document_type": { "type": "keyword" },
                "municipality": { "type": "keyword" },
                "file_path": { "type": "keyword" },
                "title": { "type": "text" },
                "summary": { "type": "text" },
                "content": { "type": "text" },
                "embedding": {
                    "type": "dense_vector",
                    "dims": dimensions,
                    "index": true,
                    "similarity": "cosine"
                },
                "date": { "type": "date" },
                "timestamp": { "type": "date" },
                "tokens": { "type": "integer" }
            }
        }
    })
}

/// Script-score query: exact-match filters first, then `cosine + 1.0`.
pub fn search_body(embedding: &[f32], filters: &SearchFilters, size: usize) -> Value {
    let terms = filters.terms();
    let candidates = if terms.is_empty() {
        json!({ "match_all": {} })
    } else {
        let clauses: Vec<Value> =
            terms.into_iter().map(|(field, value)| json!({ "term": { field: value } })).collect();
        json!({ "bool": { "filter": clauses } })
    };

    json!({
        "size": size,
        "_source": { "excludes": ["embedding"] },
        "query": {
            "script_score": {
                "query": candidates,
                "script": {
                    "source": SCORE_SCRIPT,
                    "params": { "query_vector": embedding }
                }
            }
        }
    })
}

/// Terms aggregation over `category`.
pub fn categories_body() -> Value {
    json!({
        "size": 0,
        "aggs": {
            "categories": { "terms": { "field": "category", "size": CATEGORY_BUCKETS } }
        }
    })
}

#[derive(Serialize)]
struct IndexedDocument<'a> {
    #[serde(flatten)]
    document: &'a LegislativeDocument,
    embedding: &'a [f32],
    timestamp: DateTime<Utc>,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    reason: String,
}

#[derive(Deserialize)]
struct WriteResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: HitSource,
}

/// Lenient view of `_source`: documents written by older clients may miss fields.
#[derive(Deserialize, Default)]
#[serde(default)]
struct HitSource {
    source_type: String,
    category: String,
    status: String,
    legislative_period: String,
    author: String,
    document_type: String,
    title: String,
    summary: String,
    content: String,
    date: Option<String>,
    municipality: String,
    tokens: u32,
    file_path: String,
}

impl Hit {
    fn into_stored_hit(self) -> Result<StoredHit> {
        let score =
            self.score.ok_or_else(|| store_error(format!("hit '{}' has no _score", self.id)))?;
        let source = self.source;
        let date = source.date.as_deref().and_then(|d| {
            NaiveDate::parse_from_str(d.get(..10).unwrap_or(d), "%Y-%m-%d").ok()
        });
        Ok(StoredHit {
            document: LegislativeDocument {
                id: self.id,
                source_type: source.source_type,
                category: source.category,
                status: source.status,
                legislative_period: source.legislative_period,
                author: source.author,
                document_type: source.document_type,
                title: source.title,
                summary: source.summary,
                content: source.content,
                date,
                municipality: source.municipality,
                tokens: source.tokens,
                file_path: source.file_path,
            },
            score,
        })
    }
}

#[derive(Deserialize)]
struct AggregationResponse {
    aggregations: Aggregations,
}

#[derive(Deserialize)]
struct Aggregations {
    categories: TermsAggregation,
}

#[derive(Deserialize)]
struct TermsAggregation {
    buckets: Vec<Bucket>,
}

#[derive(Deserialize)]
struct Bucket {
    key: Value,
}

#[derive(Deserialize)]
struct ClusterInfo {
    cluster_name: Option<String>,
    version: Option<ClusterVersion>,
}

#[derive(Deserialize)]
struct ClusterVersion {
    number: Option<String>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

// ── DocumentStore implementation ───────────────────────────────────

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn ensure_index(&self, dimensions: usize) -> Result<()> {
        if self.index_exists().await? {
            debug!(index = %self.index, "elasticsearch index already exists, skipping creation");
            return Ok(());
        }

        let mapping = index_mapping(dimensions);
        let response = self
            .send("create_index", || {
                self.request(Method::PUT, &[self.index.as_str()]).json(&mapping)
            })
            .await?;

        // Another instance may have created it between the check and the write.
        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(store_error(format!("create index returned 400: {body}")));
        }
        expect_success(response, "create index").await?;

        info!(index = %self.index, dimensions, "created elasticsearch index");
        Ok(())
    }

    async fn upsert(&self, document: &LegislativeDocument, embedding: &[f32]) -> Result<String> {
        let body = IndexedDocument { document, embedding, timestamp: Utc::now() };
        let response = self
            .send("upsert", || {
                self.request(Method::PUT, &[self.index.as_str(), "_doc", document.id.as_str()])
                    .json(&body)
            })
            .await?;
        let response = expect_success(response, "index document").await?;
        let written: WriteResponse = parse_json(response, "index document").await?;

        debug!(index = %self.index, document.id = %written.id, "indexed document");
        Ok(written.id)
    }

    async fn search(
        &self,
        embedding: &[f32],
        filters: &SearchFilters,
        size: usize,
    ) -> Result<Vec<StoredHit>> {
        let body = search_body(embedding, filters, size);
        let response = self
            .send("search", || {
                self.request(Method::POST, &[self.index.as_str(), "_search"]).json(&body)
            })
            .await?;
        let response = expect_success(response, "search").await?;
        let parsed: SearchResponse = parse_json(response, "search").await?;

        let hits = parsed
            .hits
            .hits
            .into_iter()
            .map(Hit::into_stored_hit)
            .collect::<Result<Vec<_>>>()?;
        debug!(index = %self.index, hit_count = hits.len(), "search completed");
        Ok(hits)
    }

    async fn categories(&self) -> Result<BTreeSet<String>> {
        let body = categories_body();
        let response = self
            .send("categories", || {
                self.request(Method::POST, &[self.index.as_str(), "_search"]).json(&body)
            })
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(BTreeSet::new());
        }
        let response = expect_success(response, "categories aggregation").await?;
        let parsed: AggregationResponse = parse_json(response, "categories aggregation").await?;

        Ok(parsed
            .aggregations
            .categories
            .buckets
            .into_iter()
            .filter_map(|bucket| match bucket.key {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect())
    }

    async fn info(&self) -> Result<StoreInfo> {
        let response = self.send("cluster_info", || self.request(Method::GET, &[])).await?;
        let response = expect_success(response, "cluster info").await?;
        let cluster: ClusterInfo = parse_json(response, "cluster info").await?;

        let index_exists = self.index_exists().await?;
        let document_count = if index_exists {
            let response = self
                .send("count", || self.request(Method::GET, &[self.index.as_str(), "_count"]))
                .await?;
            let response = expect_success(response, "count").await?;
            let count: CountResponse = parse_json(response, "count").await?;
            Some(count.count)
        } else {
            None
        };

        Ok(StoreInfo {
            cluster_name: cluster.cluster_name,
            version: cluster.version.and_then(|v| v.number),
            index_exists,
            document_count,
        })
    }

    async fn close(&self) -> Result<()> {
        debug!(index = %self.index, "closing elasticsearch store");
        Ok(())
    }
}
