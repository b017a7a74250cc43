//! Tenant registration (spec §4.1, C1). Grounded on the teacher's
//! `auth-service::handlers::auth` registration flow, replacing JWT issuance
//! with the spec's opaque, bcrypt-hashed API key.

use crate::state::AppState;
use axum::extract::State;
use axum::response::Json;
use bff_shared::error::{CoreError, CoreResult};
use bff_shared::tenant::validate_identifier;
use bff_shared::types::TenantType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub verification_secret: String,
    pub tenant_type: String,
    pub tenant_identifier: String,
    pub display_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub api_key: String,
    pub tenant_id: String,
    pub tenant_type: TenantType,
    pub message: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> CoreResult<Json<RegisterResponse>> {
    if request.verification_secret != state.config.registration_secret {
        return Err(CoreError::Auth("invalid verification secret".to_string()));
    }

    let tenant_type = TenantType::from_str(&request.tenant_type)
        .ok_or_else(|| CoreError::Validation(format!("unknown tenant_type '{}'", request.tenant_type)))?;

    validate_identifier(tenant_type, &request.tenant_identifier, &state.config.storefront_suffix)?;

    let registered = state
        .tenants
        .register(
            &request.verification_secret,
            tenant_type,
            &request.tenant_identifier,
            request.display_name,
            request.metadata,
        )
        .await?;

    Ok(Json(RegisterResponse {
        api_key: registered.api_key,
        tenant_id: registered.tenant_id.to_string(),
        tenant_type,
        message: "tenant registered successfully".to_string(),
    }))
}
