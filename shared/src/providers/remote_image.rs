//! Sync, remote image-family providers (provider_a..d): one HTTP call in,
//! artifact bytes out — mirrors the shape of the teacher's
//! `OpenAIProvider::create_chat_completion`, generalized from chat
//! completions to an image-generation request/response.

use super::{Artifact, GenerationProvider, InvokeOutcome, OpRequest, PollOutcome};
use crate::error::{CoreError, CoreResult};
use crate::types::{Kind, Operation, ProviderId};
use async_trait::async_trait;
use serde::Serialize;

pub struct RemoteImageProvider {
    id: ProviderId,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: std::time::Duration,
}

impl RemoteImageProvider {
    pub fn new(id: ProviderId, base_url: String, api_key: String, timeout_ms: u64) -> Self {
        Self {
            id,
            http: reqwest::Client::new(),
            base_url,
            api_key,
            timeout: std::time::Duration::from_millis(timeout_ms),
        }
    }

    fn endpoint_for(&self, op: Operation) -> &'static str {
        match op {
            Operation::TextToImage => "text-to-image",
            Operation::ImageToImage => "image-to-image",
            Operation::SketchToImage => "sketch-to-image",
            Operation::RemoveBackground => "remove-background",
            Operation::ImageInpaint => "inpaint",
            Operation::SearchAndRecolor => "recolor",
            Operation::Upscale => "upscale",
            _ => "unsupported",
        }
    }
}

#[derive(Serialize)]
struct RemoteRequest<'a> {
    prompt: Option<&'a str>,
    select_prompt: Option<&'a str>,
    style: Option<&'a str>,
    image_count: usize,
    has_mask: bool,
    params: &'a serde_json::Value,
}

#[async_trait]
impl GenerationProvider for RemoteImageProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> Kind {
        Kind::Images
    }

    async fn invoke(&self, op: Operation, request: &OpRequest) -> CoreResult<InvokeOutcome> {
        let endpoint = self.endpoint_for(op);
        let body = RemoteRequest {
            prompt: request.prompt.as_deref(),
            select_prompt: request.select_prompt.as_deref(),
            style: request.style.as_deref(),
            image_count: request.input_images.len(),
            has_mask: request.mask.is_some(),
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
                "provider rejected request: {}",
                resp.status()
            )));
        }
        if !resp.status().is_success() {
            return Err(CoreError::ProviderTransient(format!("status {}", resp.status())));
        }

        let bytes = resp.bytes().await.map_err(|e| CoreError::ProviderTransient(e.to_string()))?;

        Ok(InvokeOutcome::Sync {
            artifacts: vec![Artifact {
                name: "0.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: bytes.to_vec(),
            }],
        })
    }

    async fn poll(&self, _op: Operation, _provider_job_id: &str) -> CoreResult<PollOutcome> {
        Err(CoreError::Internal("sync provider does not support polling".to_string()))
    }
}
