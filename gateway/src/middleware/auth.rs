//! API key authentication middleware (spec §4.1, §6 "Headers"). Adapted
//! from the teacher's `auth-service::middleware::auth::auth_middleware`
//! (bearer-JWT extraction + claims-into-extensions) to the spec's single
//! `X-API-Key` header checked against the tenant registry.

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bff_shared::error::CoreError;

pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let api_key = match request.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(key) => key,
        None => return CoreError::Auth("Missing API key".to_string()).into_response(),
    };

    let tenant = match state.tenants.authenticate(api_key).await {
        Ok(tenant) => tenant,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(tenant);
    next.run(request).await
}
