//! Worker pool (spec §4.6, §5, C6). Grounded on the teacher's
//! `ai_service::worker::start_worker`, but with the Temporal task-queue
//! framing replaced by plain `tokio` tasks over a `Semaphore` per queue —
//! the spec's redesign note says the contract is the CAS-protected row
//! state, not the language-level concurrency primitive (spec §9).

use crate::WorkerContext;
use bff_shared::db::MetadataStore;
use bff_shared::providers::{InvokeOutcome, OpRequest};
use bff_shared::queue::Job;
use bff_shared::store::ObjectStore;
use bff_shared::types::RowStatus;
use bff_shared::{CoreError, CoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const MAX_PROVIDER_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 200;
const RETRY_CAP_MS: u64 = 5_000;

/// Runs one queue's worker pool until the broker is shut down (`dequeue`
/// returns `None`). Each permit is one concurrently-running job, bounding
/// the queue at the concurrency configured in spec §4.6's table.
pub async fn run_queue(ctx: Arc<WorkerContext>, queue: &'static str, concurrency: usize) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    tracing::info!(queue, concurrency, "starting worker pool");

    loop {
        let Some(job) = ctx.broker.dequeue(queue).await else {
            tracing::info!(queue, "broker closed, worker pool exiting");
            return;
        };

        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let internal_task_id = job.internal_task_id;
            if let Err(err) = process_job(&ctx, job).await {
                tracing::error!(%internal_task_id, error = %err, "job processing failed");
            }
        });
    }
}

async fn process_job(ctx: &WorkerContext, job: Job) -> CoreResult<()> {
    let row = ctx.metadata.get(job.kind, job.row_id).await?;
    if row.status != RowStatus::Pending {
        tracing::debug!(row_id = %job.row_id, status = ?row.status, "duplicate delivery, skipping");
        return Ok(());
    }

    ctx.metadata.set_processing(job.kind, job.row_id, None).await?;

    // From here on, the row is "processing": any failure must resolve to a
    // `failed` row rather than an orphaned in-progress one (spec §4.6).
    if let Err(err) = run_job_body(ctx, &job, &row.client_task_id).await {
        ctx.metadata.set_failed(job.kind, job.row_id, &err.sanitized_message()).await?;
    }

    Ok(())
}

async fn run_job_body(ctx: &WorkerContext, job: &Job, client_task_id: &str) -> CoreResult<()> {
    let mut input_images = Vec::with_capacity(job.input_urls.len());
    for url in &job.input_urls {
        input_images.push(ctx.store.fetch(url).await?);
    }

    let mask = match &job.mask_url {
        Some(url) => Some(ctx.store.fetch(url).await?),
        None => None,
    };
    let input_model = match &job.input_model_url {
        Some(url) => Some(ctx.store.fetch(url).await?),
        None => None,
    };

    let request = OpRequest {
        prompt: job.params.get("prompt").and_then(|v| v.as_str()).map(str::to_owned),
        select_prompt: job.params.get("select_prompt").and_then(|v| v.as_str()).map(str::to_owned),
        style: job.params.get("style").and_then(|v| v.as_str()).map(str::to_owned),
        input_images,
        mask,
        input_model,
        params: job.params.clone(),
    };

    let provider = ctx.providers.get(job.provider, job.kind)?;
    let outcome = invoke_with_retry(provider, job.operation, &request).await?;

    match outcome {
        InvokeOutcome::Sync { artifacts } => {
            let artifact = artifacts
                .first()
                .ok_or_else(|| CoreError::Internal("provider returned no artifacts".to_string()))?;
            let asset_url = ctx
                .store
                .put(job.kind, client_task_id, &artifact.name, &artifact.bytes, &artifact.content_type)
                .await?;
            ctx.metadata.set_complete(job.kind, job.row_id, &asset_url).await?;
        }
        InvokeOutcome::Async { provider_job_id } => {
            ctx.metadata.attach_provider_job(job.kind, job.row_id, &provider_job_id).await?;
        }
    }

    Ok(())
}

async fn invoke_with_retry(
    provider: &dyn bff_shared::providers::GenerationProvider,
    operation: bff_shared::types::Operation,
    request: &OpRequest,
) -> CoreResult<InvokeOutcome> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match provider.invoke(operation, request).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) if err.is_retryable() && attempt < MAX_PROVIDER_ATTEMPTS => {
                let backoff_ms = (RETRY_BASE_MS * 2u64.pow(attempt - 1)).min(RETRY_CAP_MS);
                tracing::warn!(attempt, error = %err, "provider call failed, retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
