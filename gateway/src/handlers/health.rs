//! Health check (no auth required, spec §6 "Headers" — applies to
//! non-public endpoints only). Grounded on the teacher's
//! `auth-service::handlers::health::health_check`, trimmed to the one
//! dependency this BFF actually has: the metadata database.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    match sqlx::query("SELECT 1").fetch_one(state.metadata.pool()).await {
        Ok(_) => (StatusCode::OK, Json(HealthStatus { status: "healthy", database: "healthy" })),
        Err(err) => {
            tracing::warn!(error = %err, "database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus { status: "unhealthy", database: "unreachable" }),
            )
        }
    }
}

/// Root service info (spec §4.1/§6), public. A plain liveness marker, no
/// dependency check — that's what `/health` is for.
pub async fn root_info() -> Json<HealthStatus> {
    Json(HealthStatus { status: "healthy", database: "unchecked" })
}

/// `/auth/health` (spec §4.1/§6), public: the auth subsystem's health is the
/// same Postgres connection `/health` checks, so this delegates directly.
pub async fn auth_health(state: State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    health_check(state).await
}
