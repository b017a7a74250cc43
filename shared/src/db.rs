//! Metadata Store Adapter (spec §4.4, C4). CRUD on the two append-/update
//! tables (`images`, `models`) with compare-and-set status transitions so
//! concurrent finalize attempts detect a loser and become a no-op success
//! (spec §3 invariants 2-5, §4.8 invariant).
//!
//! Connection management follows the teacher's
//! `shared::database::DatabaseManager` (a thin `PgPool` wrapper with a
//! health check); the CRUD surface is new, grounded on the narrow
//! create/read/transition contract spec.md §4.4 calls out explicitly.

use crate::error::{CoreError, CoreResult};
use crate::types::{Kind, RowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(database_url: &str) -> CoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRow {
    pub id: Uuid,
    pub client_task_id: String,
    pub user_id: Option<String>,
    pub source_image_id: Option<Uuid>,
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub asset_url: Option<String>,
    pub status: RowStatus,
    pub provider_job_id: Option<String>,
    pub provider: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewRow {
    pub client_task_id: String,
    pub user_id: Option<String>,
    pub source_image_id: Option<Uuid>,
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub provider: String,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Inserts a pending row, enforcing `(client_task_id, kind)` uniqueness.
    /// On conflict, returns the existing row id (spec §4.4, idempotency).
    async fn create_pending(&self, kind: Kind, fields: NewRow) -> CoreResult<Uuid>;

    async fn set_processing(&self, kind: Kind, row_id: Uuid, provider_job_id: Option<&str>) -> CoreResult<()>;

    /// Records the provider-side job id for an async job that is already
    /// `processing` (spec §4.6 step 4b — the row stays processing, only the
    /// handle used for later polling changes).
    async fn attach_provider_job(&self, kind: Kind, row_id: Uuid, provider_job_id: &str) -> CoreResult<()>;

    /// Compare-and-set to complete; requires current status == processing.
    /// Returns the asset_url that ended up persisted — the caller's own
    /// value if it won the race, or the winner's if it lost (spec §4.8).
    async fn set_complete(&self, kind: Kind, row_id: Uuid, asset_url: &str) -> CoreResult<String>;

    async fn set_failed(&self, kind: Kind, row_id: Uuid, error_msg: &str) -> CoreResult<()>;

    async fn get(&self, kind: Kind, row_id: Uuid) -> CoreResult<GenerationRow>;

    async fn get_by_client_task(&self, kind: Kind, client_task_id: &str) -> CoreResult<Option<GenerationRow>>;
}

pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
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

fn parse_status(s: &str) -> CoreResult<RowStatus> {
    match s {
        "pending" => Ok(RowStatus::Pending),
        "processing" => Ok(RowStatus::Processing),
        "complete" => Ok(RowStatus::Complete),
        "failed" => Ok(RowStatus::Failed),
        other => Err(CoreError::Internal(format!("corrupt status {other}"))),
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn create_pending(&self, kind: Kind, fields: NewRow) -> CoreResult<Uuid> {
        let table = kind.table_name();

        if let Some(existing) = self.get_by_client_task(kind, &fields.client_task_id).await? {
            return Ok(existing.id);
        }

        let id = Uuid::new_v4();
        let query = format!(
            "INSERT INTO {table}
             (id, client_task_id, user_id, source_image_id, prompt, style, asset_url, status, provider_job_id, provider, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, NULL, 'pending', NULL, $7, $8, $9)
             ON CONFLICT (client_task_id) DO NOTHING"
        );

        sqlx::query(&query)
            .bind(id)
            .bind(&fields.client_task_id)
            .bind(&fields.user_id)
            .bind(fields.source_image_id)
            .bind(&fields.prompt)
            .bind(&fields.style)
            .bind(&fields.provider)
            .bind(&fields.metadata)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        // Someone else may have inserted concurrently; the unique constraint
        // on client_task_id makes this read authoritative either way.
        match self.get_by_client_task(kind, &fields.client_task_id).await? {
            Some(row) => Ok(row.id),
            None => Ok(id),
        }
    }

    async fn set_processing(&self, kind: Kind, row_id: Uuid, provider_job_id: Option<&str>) -> CoreResult<()> {
        let table = kind.table_name();
        let query = format!(
            "UPDATE {table} SET status = 'processing', provider_job_id = COALESCE($2, provider_job_id)
             WHERE id = $1 AND status = 'pending'"
        );
        let result = sqlx::query(&query)
            .bind(row_id)
            .bind(provider_job_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            // Another delivery already claimed it; not an error (spec §4.6 step 1).
            tracing::debug!(%row_id, "set_processing no-op: row not pending");
        }
        Ok(())
    }

    async fn attach_provider_job(&self, kind: Kind, row_id: Uuid, provider_job_id: &str) -> CoreResult<()> {
        let table = kind.table_name();
        let query = format!(
            "UPDATE {table} SET provider_job_id = $2 WHERE id = $1 AND status = 'processing'"
        );
        sqlx::query(&query)
            .bind(row_id)
            .bind(provider_job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_complete(&self, kind: Kind, row_id: Uuid, asset_url: &str) -> CoreResult<String> {
        let table = kind.table_name();
        let query = format!(
            "UPDATE {table} SET status = 'complete', asset_url = $2
             WHERE id = $1 AND status = 'processing'"
        );
        let result = sqlx::query(&query)
            .bind(row_id)
            .bind(asset_url)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(asset_url.to_string());
        }

        // CAS lost: someone else already finalized. Read back the winner's
        // URL (spec §4.4, §4.8 "first successful CAS wins; others read").
        let row = self.get(kind, row_id).await?;
        row.asset_url.ok_or_else(|| {
            CoreError::Conflict("row not complete after losing finalize race".to_string())
        })
    }

    async fn set_failed(&self, kind: Kind, row_id: Uuid, error_msg: &str) -> CoreResult<()> {
        let table = kind.table_name();
        let sanitized: String = error_msg.chars().take(200).collect();
        let query = format!(
            "UPDATE {table} SET status = 'failed', metadata = metadata || jsonb_build_object('error', $2::text)
             WHERE id = $1 AND status IN ('pending', 'processing')"
        );
        sqlx::query(&query)
            .bind(row_id)
            .bind(sanitized)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, kind: Kind, row_id: Uuid) -> CoreResult<GenerationRow> {
        let table = kind.table_name();
        let query = format!(
            "SELECT id, client_task_id, user_id, source_image_id, prompt, style, asset_url, status, provider_job_id, provider, metadata, created_at
             FROM {table} WHERE id = $1"
        );
        #[allow(clippy::type_complexity)]
        let row: (
            Uuid,
            String,
            Option<String>,
            Option<Uuid>,
            Option<String>,
            Option<String>,
            Option<String>,
            String,
            Option<String>,
            String,
            serde_json::Value,
            DateTime<Utc>,
        ) = sqlx::query_as(&query)
            .bind(row_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("row {row_id} not found")))?;

        Ok(GenerationRow {
            id: row.0,
            client_task_id: row.1,
            user_id: row.2,
            source_image_id: row.3,
            prompt: row.4,
            style: row.5,
            asset_url: row.6,
            status: parse_status(&row.7)?,
            provider_job_id: row.8,
            provider: row.9,
            metadata: row.10,
            created_at: row.11,
        })
    }

    async fn get_by_client_task(&self, kind: Kind, client_task_id: &str) -> CoreResult<Option<GenerationRow>> {
        let table = kind.table_name();
        let query = format!(
            "SELECT id, client_task_id, user_id, source_image_id, prompt, style, asset_url, status, provider_job_id, provider, metadata, created_at
             FROM {table} WHERE client_task_id = $1"
        );
        #[allow(clippy::type_complexity)]
        let row: Option<(
            Uuid,
            String,
            Option<String>,
            Option<Uuid>,
            Option<String>,
            Option<String>,
            Option<String>,
            String,
            Option<String>,
            String,
            serde_json::Value,
            DateTime<Utc>,
        )> = sqlx::query_as(&query)
            .bind(client_task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(GenerationRow {
                id: r.0,
                client_task_id: r.1,
                user_id: r.2,
                source_image_id: r.3,
                prompt: r.4,
                style: r.5,
                asset_url: r.6,
                status: parse_status(&r.7)?,
                provider_job_id: r.8,
                provider: r.9,
                metadata: r.10,
                created_at: r.11,
            })
        })
        .transpose()
    }
}

/// Column-exact DDL for the two tables (applied by migrations in a real
/// deployment; kept here as the single source of truth for column names).
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id UUID PRIMARY KEY,
    client_task_id TEXT NOT NULL UNIQUE,
    user_id TEXT,
    source_image_id UUID,
    prompt TEXT,
    style TEXT,
    asset_url TEXT,
    status TEXT NOT NULL,
    provider_job_id TEXT,
    provider TEXT NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS models (
    id UUID PRIMARY KEY,
    client_task_id TEXT NOT NULL UNIQUE,
    user_id TEXT,
    source_image_id UUID,
    prompt TEXT,
    style TEXT,
    asset_url TEXT,
    status TEXT NOT NULL,
    provider_job_id TEXT,
    provider TEXT NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL
);
"#;
