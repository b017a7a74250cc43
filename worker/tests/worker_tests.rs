//! End-to-end worker pool tests against in-memory fakes — no Postgres, no
//! network. Grounded on the teacher's `ai-service` integration test style
//! (plain `#[tokio::test]` functions, one scenario each) adapted to this
//! crate's trait-object seams.

use async_trait::async_trait;
use bff_shared::config::Config;
use bff_shared::db::{GenerationRow, MetadataStore, NewRow};
use bff_shared::error::{CoreError, CoreResult};
use bff_shared::providers::{Artifact, GenerationProvider, InvokeOutcome, OpRequest, PollOutcome, ProviderManager};
use bff_shared::queue::{Broker, InMemoryBroker, Job};
use bff_shared::store::ObjectStore;
use bff_shared::types::{Kind, Operation, ProviderId, RowStatus};
use bff_worker::worker::run_queue;
use bff_worker::WorkerContext;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct FakeMetadataStore {
    rows: Mutex<HashMap<Uuid, GenerationRow>>,
}

impl FakeMetadataStore {
    fn seed_pending(&self, client_task_id: &str) -> Uuid {
        let id = Uuid::new_v4();
        let row = GenerationRow {
            id,
            client_task_id: client_task_id.to_string(),
            user_id: None,
            source_image_id: None,
            prompt: Some("a cat".to_string()),
            style: None,
            asset_url: None,
            status: RowStatus::Pending,
            provider_job_id: None,
            provider: "openai-like".to_string(),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().insert(id, row);
        id
    }
}

#[async_trait]
impl MetadataStore for FakeMetadataStore {
    async fn create_pending(&self, _kind: Kind, _fields: NewRow) -> CoreResult<Uuid> {
        unimplemented!("dispatch-only, not exercised here")
    }

    async fn set_processing(&self, _kind: Kind, row_id: Uuid, provider_job_id: Option<&str>) -> CoreResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&row_id).unwrap();
        if row.status == RowStatus::Pending {
            row.status = RowStatus::Processing;
            if let Some(id) = provider_job_id {
                row.provider_job_id = Some(id.to_string());
            }
        }
        Ok(())
    }

    async fn attach_provider_job(&self, _kind: Kind, row_id: Uuid, provider_job_id: &str) -> CoreResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&row_id).unwrap();
        if row.status == RowStatus::Processing {
            row.provider_job_id = Some(provider_job_id.to_string());
        }
        Ok(())
    }

    async fn set_complete(&self, _kind: Kind, row_id: Uuid, asset_url: &str) -> CoreResult<String> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&row_id).unwrap();
        if row.status == RowStatus::Processing {
            row.status = RowStatus::Complete;
            row.asset_url = Some(asset_url.to_string());
        }
        Ok(row.asset_url.clone().unwrap())
    }

    async fn set_failed(&self, _kind: Kind, row_id: Uuid, error_msg: &str) -> CoreResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&row_id).unwrap();
        row.status = RowStatus::Failed;
        row.metadata = serde_json::json!({ "error": error_msg });
        Ok(())
    }

    async fn get(&self, _kind: Kind, row_id: Uuid) -> CoreResult<GenerationRow> {
        self.rows.lock().unwrap().get(&row_id).cloned().ok_or_else(|| CoreError::NotFound("row".to_string()))
    }

    async fn get_by_client_task(&self, _kind: Kind, client_task_id: &str) -> CoreResult<Option<GenerationRow>> {
        Ok(self.rows.lock().unwrap().values().find(|r| r.client_task_id == client_task_id).cloned())
    }
}

#[derive(Default)]
struct FakeObjectStore {
    puts: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn fetch(&self, _url: &str) -> CoreResult<Vec<u8>> {
        Ok(vec![1, 2, 3])
    }

    async fn put(&self, kind: Kind, client_task_id: &str, name: &str, _bytes: &[u8], _content_type: &str) -> CoreResult<String> {
        let path = format!("{}/{}/{}", kind.plural(), client_task_id, name);
        self.puts.lock().unwrap().push(path.clone());
        Ok(format!("https://objects.internal/{path}"))
    }
}

/// Always returns the same bytes synchronously, mirroring the teacher's
/// `local.rs` provider stand-in used in tests.
struct AlwaysSyncProvider;

#[async_trait]
impl GenerationProvider for AlwaysSyncProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAiLike
    }

    fn kind(&self) -> Kind {
        Kind::Images
    }

    async fn invoke(&self, _op: Operation, _request: &OpRequest) -> CoreResult<InvokeOutcome> {
        Ok(InvokeOutcome::Sync {
            artifacts: vec![Artifact { name: "0.png".to_string(), content_type: "image/png".to_string(), bytes: vec![9] }],
        })
    }

    async fn poll(&self, _op: Operation, _id: &str) -> CoreResult<PollOutcome> {
        unimplemented!()
    }
}

/// Fails transiently twice, then succeeds — exercises the worker's retry
/// policy (spec §4.6: "retry up to N times with backoff").
struct FlakyThenSyncProvider {
    calls: AtomicU32,
}

#[async_trait]
impl GenerationProvider for FlakyThenSyncProvider {
    fn id(&self) -> ProviderId {
        ProviderId::StabilityLike
    }

    fn kind(&self) -> Kind {
        Kind::Images
    }

    async fn invoke(&self, _op: Operation, _request: &OpRequest) -> CoreResult<InvokeOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < 2 {
            return Err(CoreError::ProviderTransient("simulated hiccup".to_string()));
        }
        Ok(InvokeOutcome::Sync {
            artifacts: vec![Artifact { name: "0.png".to_string(), content_type: "image/png".to_string(), bytes: vec![1] }],
        })
    }

    async fn poll(&self, _op: Operation, _id: &str) -> CoreResult<PollOutcome> {
        unimplemented!()
    }
}

struct AlwaysAsyncProvider;

#[async_trait]
impl GenerationProvider for AlwaysAsyncProvider {
    fn id(&self) -> ProviderId {
        ProviderId::FluxLike
    }

    fn kind(&self) -> Kind {
        Kind::Models
    }

    async fn invoke(&self, _op: Operation, _request: &OpRequest) -> CoreResult<InvokeOutcome> {
        Ok(InvokeOutcome::Async { provider_job_id: "job-123".to_string() })
    }

    async fn poll(&self, _op: Operation, _id: &str) -> CoreResult<PollOutcome> {
        Ok(PollOutcome::InProgress)
    }
}

struct AlwaysPermanentFailureProvider;

#[async_trait]
impl GenerationProvider for AlwaysPermanentFailureProvider {
    fn id(&self) -> ProviderId {
        ProviderId::RecraftLike
    }

    fn kind(&self) -> Kind {
        Kind::Images
    }

    async fn invoke(&self, _op: Operation, _request: &OpRequest) -> CoreResult<InvokeOutcome> {
        Err(CoreError::ProviderPermanent("rejected by provider".to_string()))
    }

    async fn poll(&self, _op: Operation, _id: &str) -> CoreResult<PollOutcome> {
        unimplemented!()
    }
}

fn test_context(
    metadata: Arc<dyn MetadataStore>,
    store: Arc<dyn ObjectStore>,
    broker: Arc<dyn Broker>,
    providers: Vec<Box<dyn GenerationProvider>>,
) -> Arc<WorkerContext> {
    Arc::new(WorkerContext {
        config: test_config(),
        broker,
        store,
        providers: Arc::new(ProviderManager::new(providers)),
        metadata,
    })
}

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        object_store_url: "https://objects.internal".to_string(),
        object_store_credential: String::new(),
        broker_url: String::new(),
        registration_secret: String::new(),
        storefront_suffix: "storefronts.example.com".to_string(),
        providers: bff_shared::config::ProvidersConfig { credentials: HashMap::new(), timeouts_ms: HashMap::new() },
        queues: bff_shared::config::QueueConfig::default(),
        rate_limits: bff_shared::config::RateLimitConfig::default(),
        test_assets_mode: false,
    }
}

fn sample_job(row_id: Uuid, operation: Operation, provider: ProviderId) -> Job {
    Job {
        internal_task_id: Uuid::new_v4(),
        row_id,
        kind: operation.kind(),
        operation,
        provider,
        params: serde_json::json!({ "prompt": "a cat" }),
        input_urls: vec![],
        mask_url: None,
        input_model_url: None,
        attempts: 0,
        enqueued_at: Utc::now(),
    }
}

#[tokio::test]
async fn sync_job_uploads_artifact_and_completes_row() {
    let metadata = Arc::new(FakeMetadataStore::default());
    let row_id = metadata.seed_pending("task-1");
    let broker = Arc::new(InMemoryBroker::new());
    let ctx = test_context(
        metadata.clone(),
        Arc::new(FakeObjectStore::default()),
        broker.clone(),
        vec![Box::new(AlwaysSyncProvider)],
    );

    broker.enqueue("default", sample_job(row_id, Operation::TextToImage, ProviderId::OpenAiLike)).await.unwrap();

    let handle = tokio::spawn(run_queue(ctx.clone(), "default", 1));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let row = metadata.get(Kind::Images, row_id).await.unwrap();
    assert_eq!(row.status, RowStatus::Complete);
    assert!(row.asset_url.unwrap().ends_with("images/task-1/0.png"));

    handle.abort();
}

#[tokio::test]
async fn async_job_stores_provider_job_id_and_stays_processing() {
    let metadata = Arc::new(FakeMetadataStore::default());
    let row_id = metadata.seed_pending("task-2");
    let broker = Arc::new(InMemoryBroker::new());
    let ctx = test_context(
        metadata.clone(),
        Arc::new(FakeObjectStore::default()),
        broker.clone(),
        vec![Box::new(AlwaysAsyncProvider)],
    );

    broker.enqueue("async_other", sample_job(row_id, Operation::TextToModel, ProviderId::FluxLike)).await.unwrap();

    let handle = tokio::spawn(run_queue(ctx.clone(), "async_other", 1));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let row = metadata.get(Kind::Models, row_id).await.unwrap();
    assert_eq!(row.status, RowStatus::Processing);
    assert_eq!(row.provider_job_id.as_deref(), Some("job-123"));

    handle.abort();
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let metadata = Arc::new(FakeMetadataStore::default());
    let row_id = metadata.seed_pending("task-3");
    let broker = Arc::new(InMemoryBroker::new());
    let ctx = test_context(
        metadata.clone(),
        Arc::new(FakeObjectStore::default()),
        broker.clone(),
        vec![Box::new(FlakyThenSyncProvider { calls: AtomicU32::new(0) })],
    );

    broker.enqueue("default", sample_job(row_id, Operation::ImageToImage, ProviderId::StabilityLike)).await.unwrap();

    let handle = tokio::spawn(run_queue(ctx.clone(), "default", 1));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let row = metadata.get(Kind::Images, row_id).await.unwrap();
    assert_eq!(row.status, RowStatus::Complete);

    handle.abort();
}

#[tokio::test]
async fn permanent_failure_marks_row_failed_without_retry() {
    let metadata = Arc::new(FakeMetadataStore::default());
    let row_id = metadata.seed_pending("task-4");
    let broker = Arc::new(InMemoryBroker::new());
    let ctx = test_context(
        metadata.clone(),
        Arc::new(FakeObjectStore::default()),
        broker.clone(),
        vec![Box::new(AlwaysPermanentFailureProvider)],
    );

    broker.enqueue("default", sample_job(row_id, Operation::RemoveBackground, ProviderId::RecraftLike)).await.unwrap();

    let handle = tokio::spawn(run_queue(ctx.clone(), "default", 1));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let row = metadata.get(Kind::Images, row_id).await.unwrap();
    assert_eq!(row.status, RowStatus::Failed);
    assert_eq!(row.metadata["error"], "provider_error");

    handle.abort();
}

#[tokio::test]
async fn duplicate_delivery_on_non_pending_row_is_a_no_op() {
    let metadata = Arc::new(FakeMetadataStore::default());
    let row_id = metadata.seed_pending("task-5");
    metadata.set_processing(Kind::Images, row_id, None).await.unwrap();
    metadata.set_complete(Kind::Images, row_id, "https://objects.internal/images/task-5/0.png").await.unwrap();

    let broker = Arc::new(InMemoryBroker::new());
    let ctx = test_context(
        metadata.clone(),
        Arc::new(FakeObjectStore::default()),
        broker.clone(),
        vec![Box::new(AlwaysSyncProvider)],
    );

    broker.enqueue("default", sample_job(row_id, Operation::TextToImage, ProviderId::OpenAiLike)).await.unwrap();

    let handle = tokio::spawn(run_queue(ctx.clone(), "default", 1));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let row = metadata.get(Kind::Images, row_id).await.unwrap();
    assert_eq!(row.asset_url.unwrap(), "https://objects.internal/images/task-5/0.png");

    handle.abort();
}
