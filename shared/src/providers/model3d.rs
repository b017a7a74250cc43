//! Async 3D-model providers (spec §4.5, §6): text-to-model, image-to-model,
//! refine-model. All three are fire-and-poll — `invoke` hands the job to the
//! remote provider and returns its job id immediately, `poll` is what the
//! worker's async queue repeatedly calls until the job settles.

use super::{Artifact, GenerationProvider, InvokeOutcome, OpRequest, PollOutcome};
use crate::error::{CoreError, CoreResult};
use crate::types::{Kind, Operation, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct Model3DProvider {
    id: ProviderId,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: std::time::Duration,
}

impl Model3DProvider {
    pub fn new(id: ProviderId, base_url: String, api_key: String, timeout_ms: u64) -> Self {
        Self {
            id,
            http: reqwest::Client::new(),
            base_url,
            api_key,
            timeout: std::time::Duration::from_millis(timeout_ms),
        }
    }

    fn endpoint_for(&self, op: Operation) -> CoreResult<&'static str> {
        match op {
            Operation::TextToModel => Ok("text-to-model"),
            Operation::ImageToModel => Ok("image-to-model"),
            Operation::RefineModel => Ok("refine-model"),
            other => Err(CoreError::Internal(format!("model3d provider cannot handle {other:?}"))),
        }
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    prompt: Option<&'a str>,
    view_count: usize,
    has_input_model: bool,
    params: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum PollResponse {
    Pending,
    Running,
    Succeeded { asset_url: String },
    Failed { reason: String },
}

#[async_trait]
impl GenerationProvider for Model3DProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> Kind {
        Kind::Models
    }

    async fn invoke(&self, op: Operation, request: &OpRequest) -> CoreResult<InvokeOutcome> {
        let endpoint = self.endpoint_for(op)?;

        // Multi-view positional constraint (spec §4.7): [front, left, back, right],
        // front required, no gaps permitted among the views that are present.
        if op == Operation::ImageToModel && request.input_images.is_empty() {
            return Err(CoreError::Validation(
                "image-to-model requires at least a front view".to_string(),
            ));
        }

        let body = SubmitRequest {
            prompt: request.prompt.as_deref(),
            view_count: request.input_images.len(),
            has_input_model: request.input_model.is_some(),
            params: &request.params,
        };

        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::ProviderTransient(e.to_string()))?;

        if resp.status().is_client_error() {
            return Err(CoreError::ProviderPermanent(format!(
                "provider rejected submission: {}",
                resp.status()
            )));
        }
        if !resp.status().is_success() {
            return Err(CoreError::ProviderTransient(format!("status {}", resp.status())));
        }

        let submitted: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::ProviderTransient(format!("bad submit response: {e}")))?;

        Ok(InvokeOutcome::Async { provider_job_id: submitted.job_id })
    }

    async fn poll(&self, _op: Operation, provider_job_id: &str) -> CoreResult<PollOutcome> {
        let url = format!("{}/jobs/{}", self.base_url, provider_job_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CoreError::ProviderTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::ProviderTransient(format!("poll status {}", resp.status())));
        }

        let parsed: PollResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::ProviderTransient(format!("bad poll response: {e}")))?;

        match parsed {
            PollResponse::Pending | PollResponse::Running => Ok(PollOutcome::InProgress),
            PollResponse::Succeeded { asset_url } => {
                let bytes = self
                    .http
                    .get(&asset_url)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(|e| CoreError::ProviderTransient(e.to_string()))?
                    .bytes()
                    .await
                    .map_err(|e| CoreError::ProviderTransient(e.to_string()))?;
                Ok(PollOutcome::Done {
                    artifacts: vec![Artifact {
                        name: "model.glb".to_string(),
                        content_type: "model/gltf-binary".to_string(),
                        bytes: bytes.to_vec(),
                    }],
                })
            }
            PollResponse::Failed { reason } => Ok(PollOutcome::Failed { reason }),
        }
    }
}
