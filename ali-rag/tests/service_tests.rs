//! Retrieval service and chat orchestrator behavior against in-process backends.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ali_rag::document::{HealthStatus, LegislativeDocument, SearchFilters, TextIngestRequest};
use ali_rag::error::{ErrorKind, RagError, Result};
use ali_rag::store::{DocumentStore, StoreInfo, StoredHit};
use ali_rag::{
    ChatOrchestrator, EmbeddingProvider, HashingEmbeddingProvider, InMemoryDocumentStore,
    RagConfig, ResponseGenerator, RetrievalService,
};
use async_trait::async_trait;

const DIM: usize = 128;

fn document(id: &str, category: &str, title: &str, content: &str) -> LegislativeDocument {
    LegislativeDocument {
        id: id.to_string(),
        source_type: "bill".to_string(),
        category: category.to_string(),
        status: "pending".to_string(),
        legislative_period: "2021-2024".to_string(),
        author: "Councillor Silva".to_string(),
        document_type: "bill".to_string(),
        title: title.to_string(),
        summary: String::new(),
        content: content.to_string(),
        date: None,
        municipality: "Agua Clara".to_string(),
        tokens: 0,
        file_path: String::new(),
    }
}

fn config() -> RagConfig {
    RagConfig::builder()
        .store_url("memory://")
        .embedding_dimensions(DIM)
        .chunk_size(120)
        .chunk_overlap(20)
        .request_timeout_secs(1)
        .build()
        .unwrap()
}

fn service_with(store: Arc<dyn DocumentStore>) -> RetrievalService {
    RetrievalService::builder()
        .config(config())
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(DIM)))
        .store(store)
        .build()
        .unwrap()
}

async fn memory_service() -> RetrievalService {
    let service = service_with(Arc::new(InMemoryDocumentStore::new()));
    service.initialize().await.unwrap();
    service
}

/// A store whose every call fails as unreachable.
struct DownStore;

#[async_trait]
impl DocumentStore for DownStore {
    fn backend(&self) -> &str {
        "down"
    }

    async fn ensure_index(&self, _dimensions: usize) -> Result<()> {
        Err(unreachable_error())
    }

    async fn upsert(&self, _document: &LegislativeDocument, _embedding: &[f32]) -> Result<String> {
        Err(unreachable_error())
    }

    async fn search(&self, _: &[f32], _: &SearchFilters, _: usize) -> Result<Vec<StoredHit>> {
        Err(unreachable_error())
    }

    async fn categories(&self) -> Result<BTreeSet<String>> {
        Err(unreachable_error())
    }

    async fn info(&self) -> Result<StoreInfo> {
        Err(unreachable_error())
    }
}

fn unreachable_error() -> RagError {
    RagError::StoreUnavailable { backend: "down".into(), message: "connection refused".into() }
}

/// A store that never answers its info call.
struct SlowStore;

#[async_trait]
impl DocumentStore for SlowStore {
    fn backend(&self) -> &str {
        "slow"
    }

    async fn ensure_index(&self, _dimensions: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, document: &LegislativeDocument, _embedding: &[f32]) -> Result<String> {
        Ok(document.id.clone())
    }

    async fn search(&self, _: &[f32], _: &SearchFilters, _: usize) -> Result<Vec<StoredHit>> {
        Ok(Vec::new())
    }

    async fn categories(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    async fn info(&self) -> Result<StoreInfo> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(StoreInfo::default())
    }
}

/// An embedder returning vectors of the wrong width.
struct NarrowEmbedder;

#[async_trait]
impl EmbeddingProvider for NarrowEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0; 3])
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "narrow"
    }
}

/// Records the prompts it receives and answers with a fixed reply.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ResponseGenerator for RecordingGenerator {
    async fn generate(&self, system_prompt: &str, _user_message: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(system_prompt.to_string());
        Ok("reply".to_string())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct FailingGenerator;

#[async_trait]
impl ResponseGenerator for FailingGenerator {
    async fn generate(&self, _: &str, _: &str) -> Result<String> {
        Err(RagError::GenerationError { generator: "failing".into(), message: "quota".into() })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[tokio::test]
async fn pl_045_is_found_only_under_its_category() {
    let service = memory_service().await;
    service
        .ingest(&document(
            "pl-045",
            "health",
            "Mental health program",
            "mental health program for public schools and clinics",
        ))
        .await
        .unwrap();
    service
        .ingest(&document("pl-046", "education", "School meals", "school meals for students"))
        .await
        .unwrap();

    let health = service
        .search("mental health", None, &SearchFilters::none().with_category("health"))
        .await
        .unwrap();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].id, "pl-045");
    assert!(health[0].relevance_score > 1.0);

    let education = service
        .search("mental health", None, &SearchFilters::none().with_category("education"))
        .await
        .unwrap();
    assert!(education.iter().all(|r| r.id != "pl-045"));
}

#[tokio::test]
async fn ingested_document_is_found_by_its_title() {
    let service = memory_service().await;
    let doc = document("lei-12", "transport", "Bus fare exemption", "elderly ride free");
    assert_eq!(service.ingest(&doc).await.unwrap(), "lei-12");

    let results = service.search(&doc.title, Some(1), &SearchFilters::none()).await.unwrap();
    assert_eq!(results[0].id, "lei-12");
    assert_eq!(results[0].municipality, "Agua Clara");
}

#[tokio::test]
async fn reingesting_same_id_overwrites() {
    let service = memory_service().await;
    service.ingest(&document("pl-1", "health", "Draft", "vaccination campaign")).await.unwrap();
    service.ingest(&document("pl-1", "health", "Draft", "sanitation works")).await.unwrap();

    let results = service.search("sanitation", None, &SearchFilters::none()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "sanitation works");

    let stale = service.search("vaccination campaign", None, &SearchFilters::none()).await.unwrap();
    assert!(stale.iter().all(|r| !r.content.contains("vaccination")));
}

#[tokio::test]
async fn search_on_empty_store_is_empty_not_an_error() {
    let service = memory_service().await;
    assert!(service.search("anything", None, &SearchFilters::none()).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_query_and_zero_max_results_are_rejected() {
    let service = memory_service().await;
    let err = service.search("   ", None, &SearchFilters::none()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = service.search("health", Some(0), &SearchFilters::none()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn empty_content_is_rejected_before_embedding() {
    let service = memory_service().await;
    let err = service.ingest(&document("pl-2", "health", "t", "  ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unreachable_store_surfaces_typed_errors() {
    let service = service_with(Arc::new(DownStore));

    let err = service.search("health", None, &SearchFilters::none()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Search);
    assert!(err.is_unavailable());

    let err = service.ingest(&document("pl-3", "health", "t", "body")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingest);
    assert!(err.to_string().contains("pl-3"));
    assert!(err.to_string().contains("connection refused"));

    assert!(service.list_categories().await.is_empty());
}

#[tokio::test]
async fn dimension_mismatch_is_an_ingest_error() {
    let service = RetrievalService::builder()
        .config(config())
        .embedding_provider(Arc::new(NarrowEmbedder))
        .store(Arc::new(InMemoryDocumentStore::new()))
        .build()
        .unwrap();
    service.initialize().await.unwrap();

    let err = service.ingest(&document("pl-4", "health", "t", "body")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingest);
    assert!(!err.is_unavailable());
}

#[tokio::test]
async fn health_check_reports_reachable_store() {
    let service = memory_service().await;
    service.ingest(&document("pl-5", "health", "t", "body")).await.unwrap();

    let report = service.health_check().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.diagnostics["backend"], "in-memory");
    assert_eq!(report.diagnostics["document_count"], 1);
    assert_eq!(report.diagnostics["index_exists"], true);
}

#[tokio::test]
async fn health_check_never_fails_when_store_is_down() {
    let report = service_with(Arc::new(DownStore)).health_check().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.diagnostics["reachable"], false);
    assert!(report.diagnostics["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn health_check_never_fails_when_store_is_slow() {
    let report = service_with(Arc::new(SlowStore)).health_check().await;
    assert!(!report.is_healthy());
    assert!(report.diagnostics["error"].as_str().unwrap().contains("did not answer"));
}

#[tokio::test]
async fn health_check_is_unhealthy_until_index_exists() {
    let service = service_with(Arc::new(InMemoryDocumentStore::new()));
    let report = service.health_check().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.diagnostics["reachable"], true);
    assert_eq!(report.diagnostics["index_exists"], false);
    assert!(report.diagnostics["error"].as_str().unwrap().contains("missing"));

    service.initialize().await.unwrap();
    assert!(service.health_check().await.is_healthy());
}

#[tokio::test]
async fn first_ingest_creates_missing_index() {
    let service = service_with(Arc::new(InMemoryDocumentStore::new()));
    service.ingest(&document("pl-6", "health", "Clinic hours", "opening hours")).await.unwrap();

    let report = service.health_check().await;
    assert!(report.is_healthy());
    assert_eq!(report.diagnostics["document_count"], 1);
}

#[tokio::test]
async fn text_without_terms_is_rejected() {
    let service = memory_service().await;

    let err = service.ingest(&document("pl-7", "health", "--", "...")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("pl-7"));

    let err = service.search("?!", None, &SearchFilters::none()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn categories_are_distinct() {
    let service = memory_service().await;
    for (id, category) in [("a", "health"), ("b", "health"), ("c", "education")] {
        service.ingest(&document(id, category, "t", "body")).await.unwrap();
    }
    let categories: Vec<String> = service.list_categories().await.into_iter().collect();
    assert_eq!(categories, vec!["education".to_string(), "health".to_string()]);
}

#[tokio::test]
async fn ingest_text_chunks_with_derived_ids_and_titles() {
    let service = memory_service().await;
    let text = "The council approves the sanitation plan. ".repeat(10);
    let request = TextIngestRequest {
        document_id: "upload-1".to_string(),
        title: "Sanitation plan".to_string(),
        text,
        file_name: Some("plan.txt".to_string()),
        source_type: None,
        category: None,
    };

    let ids = service.ingest_text(&request).await.unwrap();
    assert!(ids.len() > 1);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id, &format!("upload-1_{i}"));
    }

    let results = service
        .search("sanitation plan", Some(10), &SearchFilters::none().with_category("document"))
        .await
        .unwrap();
    assert_eq!(results.len(), ids.len());
    let first = results.iter().find(|r| r.id == "upload-1_0").unwrap();
    assert_eq!(first.title, "Sanitation plan - Part 1");
    assert_eq!(first.source_type, "upload");
    assert_eq!(first.status, "active");
    assert_eq!(first.file_path, "plan.txt");
    assert!(first.tokens > 0);
}

#[tokio::test]
async fn ingest_text_rejects_blank_text() {
    let service = memory_service().await;
    let request = TextIngestRequest {
        document_id: "upload-2".to_string(),
        title: "Empty".to_string(),
        text: " \n ".to_string(),
        file_name: None,
        source_type: None,
        category: None,
    };
    assert_eq!(service.ingest_text(&request).await.unwrap_err().kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn chat_is_grounded_when_search_finds_documents() {
    let service = Arc::new(memory_service().await);
    service
        .ingest(&document("pl-045", "health", "Mental health program", "mental health program"))
        .await
        .unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let orchestrator = ChatOrchestrator::new(service, generator.clone());

    let turn = orchestrator.respond("mental health").await.unwrap();
    assert!(turn.grounded);
    assert_eq!(turn.reply, "reply");
    assert_eq!(turn.sources[0].id, "pl-045");
    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("1. **Mental health program** (Score: "));
}

#[tokio::test]
async fn chat_proceeds_ungrounded_when_search_is_empty() {
    let generator = Arc::new(RecordingGenerator::default());
    let orchestrator = ChatOrchestrator::new(Arc::new(memory_service().await), generator.clone());

    let turn = orchestrator.respond("mental health").await.unwrap();
    assert!(!turn.grounded);
    assert!(turn.sources.is_empty());
    assert!(!generator.prompts.lock().unwrap()[0].contains("**"));
}

#[tokio::test]
async fn chat_proceeds_ungrounded_when_search_fails() {
    let orchestrator = ChatOrchestrator::new(
        Arc::new(service_with(Arc::new(DownStore))),
        Arc::new(RecordingGenerator::default()),
    );
    let turn = orchestrator.respond("mental health").await.unwrap();
    assert!(!turn.grounded);
    assert_eq!(turn.reply, "reply");
}

#[tokio::test]
async fn chat_surfaces_generation_failure() {
    let orchestrator =
        ChatOrchestrator::new(Arc::new(memory_service().await), Arc::new(FailingGenerator));
    let err = orchestrator.respond("mental health").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);
    assert_eq!(orchestrator.respond(" ").await.unwrap_err().kind(), ErrorKind::Validation);
}
