pub mod worker;

use bff_shared::config::Config;
use bff_shared::db::{DatabaseManager, MetadataStore, PgMetadataStore};
use bff_shared::providers::downscale::DownscaleProvider;
use bff_shared::providers::model3d::Model3DProvider;
use bff_shared::providers::remote_image::RemoteImageProvider;
use bff_shared::providers::ProviderManager;
use bff_shared::queue::{Broker, InMemoryBroker};
use bff_shared::store::{HttpObjectStore, ObjectStore};
use bff_shared::types::ProviderId;
use std::sync::Arc;

/// Everything a worker pool needs, wired once at startup — mirrors the
/// teacher's `AIService::new` constructor assembling provider manager,
/// model registry and usage tracker behind one shared handle. `metadata`
/// and `store` are trait objects so tests can swap in in-memory fakes
/// without a real Postgres connection or object store.
pub struct WorkerContext {
    pub config: Config,
    pub broker: Arc<dyn Broker>,
    pub store: Arc<dyn ObjectStore>,
    pub providers: Arc<ProviderManager>,
    pub metadata: Arc<dyn MetadataStore>,
}

impl WorkerContext {
    pub async fn new(config: Config, broker: Arc<dyn Broker>) -> anyhow::Result<Self> {
        let db = DatabaseManager::new(&config.database_url).await?;
        let pool = db.pool().clone();

        let store = Arc::new(HttpObjectStore::new(
            config.object_store_url.clone(),
            config.object_store_credential.clone(),
            config.test_assets_mode,
        ));

        let mut adapters: Vec<Box<dyn bff_shared::providers::GenerationProvider>> = Vec::new();
        for (name, provider_id) in [
            ("provider_a", ProviderId::OpenAiLike),
            ("provider_b", ProviderId::StabilityLike),
            ("provider_c", ProviderId::RecraftLike),
            ("provider_d", ProviderId::FluxLike),
        ] {
            let credential = config.providers.credentials.get(name).cloned().unwrap_or_default();
            let timeout_ms = config.providers.timeouts_ms.get(name).copied().unwrap_or(30_000);
            let base_url = format!("https://{name}.example-providers.internal");
            adapters.push(Box::new(RemoteImageProvider::new(
                provider_id,
                base_url.clone(),
                credential.clone(),
                timeout_ms,
            )));
            adapters.push(Box::new(Model3DProvider::new(provider_id, base_url, credential, timeout_ms)));
        }
        adapters.push(Box::new(DownscaleProvider::new()));

        Ok(Self {
            broker,
            store,
            providers: Arc::new(ProviderManager::new(adapters)),
            metadata: Arc::new(PgMetadataStore::new(pool)),
            config,
        })
    }
}
