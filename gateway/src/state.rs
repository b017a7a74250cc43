//! `AppState` — mirrors the teacher's `AppStateInner` (one `Arc<...Inner>`
//! handed to every handler via axum's `State` extractor) generalized from a
//! single `ai_service` handle to the gateway's five collaborators (C1-C5).

use bff_shared::config::Config;
use bff_shared::credits::{AlwaysApprove, CreditGate};
use bff_shared::db::PgMetadataStore;
use bff_shared::providers::downscale::DownscaleProvider;
use bff_shared::providers::model3d::Model3DProvider;
use bff_shared::providers::remote_image::RemoteImageProvider;
use bff_shared::providers::ProviderManager;
use bff_shared::queue::{Broker, InMemoryBroker};
use bff_shared::ratelimit::RateLimiter;
use bff_shared::store::{HttpObjectStore, ObjectStore};
use bff_shared::tenant::{PgTenantRegistry, TenantRegistry};
use bff_shared::types::ProviderId;
use std::sync::Arc;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub config: Config,
    pub tenants: Arc<dyn TenantRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metadata: Arc<PgMetadataStore>,
    pub store: Arc<dyn ObjectStore>,
    pub broker: Arc<dyn Broker>,
    pub providers: Arc<ProviderManager>,
    pub credits: Arc<dyn CreditGate>,
}

impl AppStateInner {
    pub async fn new(config: Config, broker: Arc<dyn Broker>) -> anyhow::Result<Self> {
        let pool = sqlx::PgPool::connect(&config.database_url).await?;

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
            tenants: Arc::new(PgTenantRegistry::new(pool.clone())),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limits.clone())),
            metadata: Arc::new(PgMetadataStore::new(pool)),
            store,
            providers: Arc::new(ProviderManager::new(adapters)),
            credits: Arc::new(AlwaysApprove),
            broker,
            config,
        })
    }

    /// Test/dev wiring with an in-process broker — real deployments hand
    /// the gateway a client for the external broker (spec §1).
    pub async fn new_in_process(config: Config) -> anyhow::Result<Self> {
        Self::new(config, Arc::new(InMemoryBroker::new())).await
    }
}
