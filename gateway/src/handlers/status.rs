//! Task status endpoint (spec §4.8, C1/C5/C6). `service` names the route
//! family the original request was dispatched under — it picks which table
//! to read (`model_3d_other`/`model_3d_refine` land in `models`, everything
//! else in `images`) and, for the `downscale` family only, the field name
//! the payload renders the asset under (`image_url` instead of `asset_url`,
//! a quirk carried over bit-exactly per spec §9 rather than "fixed").
//!
//! A `processing` row in an async family is where this handler does real
//! work: it polls the provider on the caller's behalf and finalizes the row
//! the same way the worker would, so a client spamming status checks can
//! observe completion without waiting on the worker's own poll loop.

use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use bff_shared::db::{GenerationRow, MetadataStore};
use bff_shared::error::{CoreError, CoreResult};
use bff_shared::providers::PollOutcome;
use bff_shared::types::{Kind, Operation, RowStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub celery_task_id: Uuid,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn kind_for_family(family: &str) -> Kind {
    match family {
        "model_3d_other" | "model_3d_refine" => Kind::Models,
        _ => Kind::Images,
    }
}

fn status_str(status: RowStatus) -> &'static str {
    match status {
        RowStatus::Pending => "pending",
        RowStatus::Processing => "processing",
        RowStatus::Complete => "complete",
        RowStatus::Failed => "failed",
    }
}

fn render(row: &GenerationRow, family: &str) -> StatusResponse {
    let (asset_url, image_url) = match (&row.asset_url, family == "downscale") {
        (Some(url), true) => (None, Some(url.clone())),
        (asset, false) => (asset.clone(), None),
        (None, true) => (None, None),
    };
    StatusResponse {
        celery_task_id: row.id,
        status: status_str(row.status),
        asset_url,
        image_url,
        error: row.metadata.get("error").and_then(|v| v.as_str()).map(str::to_owned),
    }
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(internal_task_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> CoreResult<Json<StatusResponse>> {
    let kind = kind_for_family(&query.service);
    let row = state.metadata.get(kind, internal_task_id).await?;

    if row.status != RowStatus::Processing {
        return Ok(Json(render(&row, &query.service)));
    }

    let operation: Operation = serde_json::from_value(
        row.metadata.get("operation").cloned().unwrap_or(serde_json::Value::Null),
    )
    .map_err(|_| CoreError::Internal("row is missing its recorded operation".to_string()))?;

    if !operation.is_async_family() {
        // Sync families never poll; "processing" means the worker hasn't
        // finished yet (or died mid-job, surfaced by set_failed elsewhere).
        return Ok(Json(render(&row, &query.service)));
    }

    let provider_job_id = row
        .provider_job_id
        .as_deref()
        .ok_or_else(|| CoreError::Internal("async row missing provider_job_id".to_string()))?;

    let provider_id = bff_shared::types::ProviderId::parse(&row.provider)
        .ok_or_else(|| CoreError::Internal("corrupt provider id on row".to_string()))?;
    let provider = state.providers.get(provider_id, kind)?;

    match provider.poll(operation, provider_job_id).await {
        Ok(PollOutcome::InProgress) => Ok(Json(render(&row, &query.service))),
        Ok(PollOutcome::Done { artifacts }) => {
            let artifact = artifacts
                .first()
                .ok_or_else(|| CoreError::Internal("provider returned no artifacts".to_string()))?;
            let asset_url = state
                .store
                .put(kind, &row.client_task_id, &artifact.name, &artifact.bytes, &artifact.content_type)
                .await?;
            let final_url = state.metadata.set_complete(kind, internal_task_id, &asset_url).await?;
            let mut row = row;
            row.status = RowStatus::Complete;
            row.asset_url = Some(final_url);
            Ok(Json(render(&row, &query.service)))
        }
        Ok(PollOutcome::Failed { reason }) => {
            state.metadata.set_failed(kind, internal_task_id, &reason).await?;
            let mut row = row;
            row.status = RowStatus::Failed;
            Ok(Json(render(&row, &query.service)))
        }
        Err(err) if err.is_retryable() => {
            // Transient poll failure: report the row as still processing
            // rather than surfacing a 5xx for what is normal provider lag.
            Ok(Json(render(&row, &query.service)))
        }
        Err(err) => {
            state.metadata.set_failed(kind, internal_task_id, &err.sanitized_message()).await?;
            let mut row = row;
            row.status = RowStatus::Failed;
            Ok(Json(render(&row, &query.service)))
        }
    }
}
