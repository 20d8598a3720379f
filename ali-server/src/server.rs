use std::net::SocketAddr;
use std::sync::Arc;

use ali_rag::{
    ChatOrchestrator, OpenAIChatGenerator, RetrievalService, SearchFilters, SearchResult,
    TextIngestRequest,
};
use anyhow::Context;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, Request},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};

use crate::{
    config::{LlmConfig, RateLimitConfig, ServerConfig},
    error::ApiError,
    protocol::{
        CategoriesResponse, ChatRequest, ChatResponse, HealthResponse, MAX_RESULTS_LIMIT,
        SearchRequest, SimpleSearchQuery, SimpleSearchResponse, TextUploadRequest,
        TextUploadResponse, UploadRequest, UploadResponse,
    },
    rate_limit::{self, RateLimiter},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RetrievalService>,
    /// `None` when no generator is configured.
    pub chat: Option<Arc<ChatOrchestrator>>,
    pub limits: RouteLimits,
    pub allowed_origins: Vec<String>,
}

/// One limiter per rate-limited route.
#[derive(Clone)]
pub struct RouteLimits {
    pub search: Arc<RateLimiter>,
    pub simple_search: Arc<RateLimiter>,
    pub upload: Arc<RateLimiter>,
}

impl RouteLimits {
    pub fn per_minute(config: &RateLimitConfig) -> Self {
        Self {
            search: Arc::new(RateLimiter::per_minute("POST /search", config.search)),
            simple_search: Arc::new(RateLimiter::per_minute("GET /search", config.simple_search)),
            upload: Arc::new(RateLimiter::per_minute("upload", config.upload)),
        }
    }
}

impl AppState {
    pub fn new(
        service: Arc<RetrievalService>,
        chat: Option<Arc<ChatOrchestrator>>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            service,
            chat,
            limits: RouteLimits::per_minute(&config.rate_limits),
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let limits = state.limits.clone();
    let limited = |limiter: &Arc<RateLimiter>| {
        middleware::from_fn_with_state(limiter.clone(), rate_limit::enforce)
    };

    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors_layer(&state.allowed_origins));

    Router::new()
        .route("/health", get(health))
        .route("/search", post(search_documents).layer(limited(&limits.search)))
        .route("/search", get(simple_search).layer(limited(&limits.simple_search)))
        .route("/upload", post(upload_document).layer(limited(&limits.upload)))
        .route("/documents/upload", post(upload_text).layer(limited(&limits.upload)))
        .route("/categories", get(list_categories))
        .route("/chat", post(chat))
        .with_state(state)
        .layer(layers)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id =
        request.headers().get("x-request-id").and_then(|v| v.to_str().ok()).unwrap_or("-");
    info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

/// Build the service graph and serve until ctrl-c or SIGTERM.
///
/// Order: retrieval service → index → chat generator → router. The store
/// is closed after the server drains.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let service = Arc::new(
        RetrievalService::from_config(config.rag.clone())
            .context("failed to build retrieval service")?,
    );
    if let Err(e) = service.initialize().await {
        warn!(error = %e, "index initialization failed, retrying on first ingest");
    }

    let chat = match &config.llm {
        Some(llm) => {
            let generator = Arc::new(chat_generator(llm)?);
            Some(Arc::new(ChatOrchestrator::new(service.clone(), generator)))
        }
        None => {
            info!("LLM_API_KEY not set, /chat disabled");
            None
        }
    };

    let app = app_router(AppState::new(service.clone(), chat, &config));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for ali-server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("ali-server listening on http://{}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.close().await.context("failed to close retrieval service")?;
    info!("ali-server stopped");
    Ok(())
}

fn chat_generator(llm: &LlmConfig) -> anyhow::Result<OpenAIChatGenerator> {
    let mut generator = OpenAIChatGenerator::new(llm.api_key.clone())
        .context("failed to build chat generator")?
        .with_model(llm.model.clone())
        .with_temperature(llm.temperature)
        .with_max_tokens(llm.max_tokens);
    if let Some(base_url) = &llm.base_url {
        generator = generator.with_base_url(base_url.clone());
    }
    Ok(generator)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

fn check_max_results(value: Option<usize>, field: &str) -> Result<Option<usize>, ApiError> {
    match value {
        Some(n) if n == 0 || n > MAX_RESULTS_LIMIT => Err(ApiError::Validation(format!(
            "{field} must be between 1 and {MAX_RESULTS_LIMIT}"
        ))),
        other => Ok(other),
    }
}

fn check_query(query: &str) -> Result<&str, ApiError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::Validation("query must not be empty".to_string()));
    }
    Ok(query)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut report = state.service.health_check().await;
    report
        .diagnostics
        .insert("checked_at".to_string(), serde_json::json!(chrono::Utc::now().to_rfc3339()));
    Json(HealthResponse { status: report.status, diagnostics: report.diagnostics })
}

async fn search_documents(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let query = check_query(&request.query)?;
    let max_results = check_max_results(request.max_results, "max_results")?;
    let results = state.service.search(query, max_results, &request.filters()).await?;
    Ok(Json(results))
}

async fn simple_search(
    State(state): State<AppState>,
    Query(params): Query<SimpleSearchQuery>,
) -> Result<Json<SimpleSearchResponse>, ApiError> {
    let query = check_query(&params.query)?;
    let top_k = check_max_results(params.top_k, "top_k")?;
    let results = state.service.search(query, top_k, &SearchFilters::none()).await?;
    Ok(Json(SimpleSearchResponse { query: query.to_string(), total: results.len(), results }))
}

async fn upload_document(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let document_id = state.service.ingest(&request.document).await?;
    Ok(Json(UploadResponse {
        success: true,
        message: format!("Document '{document_id}' ingested"),
        document_id,
    }))
}

async fn upload_text(
    State(state): State<AppState>,
    Json(request): Json<TextUploadRequest>,
) -> Result<Json<TextUploadResponse>, ApiError> {
    let document_id = request
        .document_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let ingest = TextIngestRequest {
        document_id,
        title: request.title,
        text: request.text,
        file_name: request.file_name.clone(),
        source_type: request.source_type,
        category: request.category,
    };
    let document_ids = state.service.ingest_text(&ingest).await?;
    Ok(Json(TextUploadResponse {
        success: true,
        message: format!("Text split into {} chunks and ingested", document_ids.len()),
        document_ids,
        file_name: request.file_name,
    }))
}

async fn list_categories(State(state): State<AppState>) -> Json<CategoriesResponse> {
    let categories = state.service.list_categories().await.into_iter().collect();
    Json(CategoriesResponse { categories })
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let orchestrator = state.chat.as_ref().ok_or(ApiError::GeneratorUnavailable)?;
    let turn = orchestrator.respond(&request.message).await?;
    Ok(Json(turn))
}
