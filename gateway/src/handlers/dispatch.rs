//! Generation dispatch (spec §4.7, C1-C6). One shared pipeline — validate,
//! rate-limit, credit-check, persist, enqueue — behind eleven thin per-
//! endpoint handlers, grounded on the teacher's `ai-service::handlers`
//! pattern of a single `handle_completion` core wrapped by named routes.

use crate::extractors::AuthenticatedTenant;
use crate::state::AppState;
use crate::validation;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use bff_shared::db::{MetadataStore, NewRow};
use bff_shared::error::{CoreError, CoreResult};
use bff_shared::queue::Job;
use bff_shared::types::Operation;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "task_id")]
    pub client_task_id: String,
    pub user_id: Option<String>,
    pub provider: Option<String>,
    pub prompt: Option<String>,
    pub select_prompt: Option<String>,
    pub style: Option<String>,
    /// Wire name varies per endpoint (spec §6): `input_image_asset_url` and
    /// `input_sketch_asset_url` carry a single URL, `input_image_asset_urls`
    /// carries the multi-view list — all three deserialize into this one
    /// positional list.
    #[serde(
        default,
        alias = "input_image_asset_url",
        alias = "input_image_asset_urls",
        alias = "input_sketch_asset_url",
        deserialize_with = "deserialize_input_urls"
    )]
    pub input_urls: Vec<Option<String>>,
    #[serde(alias = "input_mask_asset_url")]
    pub mask_url: Option<String>,
    #[serde(alias = "input_model_asset_url")]
    pub input_model_url: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Accepts either a single URL string or an ordered list (with gaps encoded
/// as `null`) and normalizes both into the positional `Vec<Option<String>>`
/// the rest of the dispatch pipeline expects.
fn deserialize_input_urls<'de, D>(deserializer: D) -> Result<Vec<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<Option<String>>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => Ok(vec![Some(url)]),
        OneOrMany::Many(urls) => Ok(urls),
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub celery_task_id: Uuid,
    pub status: &'static str,
}

/// Stable fingerprint over the fields that define "the same request" for
/// idempotency purposes (spec §4.4, Open Question: resubmission with a
/// different body under the same `client_task_id` is a conflict, not a
/// silent no-op).
fn fingerprint(operation: Operation, req: &GenerateRequest) -> String {
    let canonical = serde_json::json!({
        "operation": operation,
        "provider": req.provider,
        "prompt": req.prompt,
        "select_prompt": req.select_prompt,
        "style": req.style,
        "input_urls": req.input_urls,
        "mask_url": req.mask_url,
        "input_model_url": req.input_model_url,
        "params": req.params,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn dispatch(
    state: &AppState,
    tenant: &AuthenticatedTenant,
    operation: Operation,
    req: GenerateRequest,
) -> CoreResult<(StatusCode, Json<GenerateResponse>)> {
    let route_family = operation.route_family();
    let limit = state.rate_limiter.check(&tenant.id.to_string(), route_family);
    if !limit.allowed {
        return Err(CoreError::RateLimited { retry_after: limit.retry_after_secs });
    }

    let provider = validation::validate(operation, &req)?;

    if !state.credits.reserve(req.user_id.as_deref(), operation).await {
        return Err(CoreError::InsufficientCredits);
    }

    let kind = operation.kind();
    let new_fingerprint = fingerprint(operation, &req);

    if let Some(existing) = state.metadata.get_by_client_task(kind, &req.client_task_id).await? {
        let existing_fingerprint = existing
            .metadata
            .get("request_fingerprint")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if existing_fingerprint != new_fingerprint {
            return Err(CoreError::Conflict(
                "client_task_id already used with a different request body".to_string(),
            ));
        }
        return Ok((
            StatusCode::ACCEPTED,
            Json(GenerateResponse { celery_task_id: existing.id, status: "pending" }),
        ));
    }

    let metadata = serde_json::json!({
        "operation": operation,
        "request_fingerprint": new_fingerprint,
    });

    let row_id = state
        .metadata
        .create_pending(
            kind,
            NewRow {
                client_task_id: req.client_task_id.clone(),
                user_id: req.user_id.clone(),
                source_image_id: None,
                prompt: req.prompt.clone(),
                style: req.style.clone(),
                provider: provider.to_string(),
                metadata,
            },
        )
        .await?;

    let input_urls: Vec<String> = req.input_urls.into_iter().flatten().collect();
    let mut params = req.params.clone();
    if let (serde_json::Value::Object(map), Some(select_prompt)) =
        (&mut params, req.select_prompt.clone())
    {
        map.insert("select_prompt".to_string(), serde_json::Value::String(select_prompt));
    }

    let job = Job {
        internal_task_id: row_id,
        row_id,
        kind,
        operation,
        provider,
        params,
        input_urls,
        mask_url: req.mask_url.clone(),
        input_model_url: req.input_model_url.clone(),
        attempts: 0,
        enqueued_at: Utc::now(),
    };

    state.broker.enqueue(operation.queue_name(), job).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse { celery_task_id: row_id, status: "pending" }),
    ))
}

macro_rules! endpoint {
    ($name:ident, $op:expr) => {
        pub async fn $name(
            State(state): State<AppState>,
            tenant: AuthenticatedTenant,
            Json(req): Json<GenerateRequest>,
        ) -> CoreResult<(StatusCode, Json<GenerateResponse>)> {
            dispatch(&state, &tenant, $op, req).await
        }
    };
}

endpoint!(text_to_image, Operation::TextToImage);
endpoint!(image_to_image, Operation::ImageToImage);
endpoint!(sketch_to_image, Operation::SketchToImage);
endpoint!(remove_background, Operation::RemoveBackground);
endpoint!(image_inpaint, Operation::ImageInpaint);
endpoint!(search_and_recolor, Operation::SearchAndRecolor);
endpoint!(upscale, Operation::Upscale);
endpoint!(downscale, Operation::Downscale);
endpoint!(text_to_model, Operation::TextToModel);
endpoint!(image_to_model, Operation::ImageToModel);
endpoint!(refine_model, Operation::RefineModel);
