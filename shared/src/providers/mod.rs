//! Provider Clients (spec §4.5, C5). Generalized from the teacher's
//! `ai-service::providers::AIProvider` trait + `AIProviderManager` registry
//! (one adapter per provider, each declaring its completion style) from
//! text-generation operations to the spec's image/sketch/3D operations.
//! `invoke` covers both sync and async providers; `poll` is only ever
//! called for a provider that returned `InvokeOutcome::Async`.

pub mod downscale;
pub mod model3d;
pub mod remote_image;

use crate::error::CoreResult;
use crate::types::{Kind, Operation, ProviderId};
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    Sync { artifacts: Vec<Artifact> },
    Async { provider_job_id: String },
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    InProgress,
    Done { artifacts: Vec<Artifact> },
    Failed { reason: String },
}

/// Pre-validated request — provider-specific parameter validation happens
/// in the dispatch layer, never here (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct OpRequest {
    pub prompt: Option<String>,
    pub select_prompt: Option<String>,
    pub style: Option<String>,
    /// Pre-fetched input image bytes, positional for multi-view 3D ops.
    pub input_images: Vec<Vec<u8>>,
    pub mask: Option<Vec<u8>>,
    pub input_model: Option<Vec<u8>>,
    pub params: serde_json::Value,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn id(&self) -> ProviderId;
    /// Which table-kind of operation this adapter serves — `Images` for the
    /// sync image family, `Models` for the 3D family. Lets `ProviderManager`
    /// tell apart the two distinct adapters a provider id can have (e.g.
    /// `flux-like` has both an image adapter and a 3D adapter).
    fn kind(&self) -> Kind;
    async fn invoke(&self, op: Operation, request: &OpRequest) -> CoreResult<InvokeOutcome>;
    /// Only called for providers whose `invoke` returned `Async`.
    async fn poll(&self, op: Operation, provider_job_id: &str) -> CoreResult<PollOutcome>;
}

pub struct ProviderManager {
    providers: HashMap<(ProviderId, Kind), Box<dyn GenerationProvider>>,
}

impl ProviderManager {
    pub fn new(providers: Vec<Box<dyn GenerationProvider>>) -> Self {
        let mut map = HashMap::new();
        for provider in providers {
            map.insert((provider.id(), provider.kind()), provider);
        }
        Self { providers: map }
    }

    pub fn get(&self, provider_id: ProviderId, kind: Kind) -> CoreResult<&dyn GenerationProvider> {
        self.providers
            .get(&(provider_id, kind))
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                crate::error::CoreError::Internal(format!(
                    "provider {provider_id} not configured for {kind:?}"
                ))
            })
    }
}
