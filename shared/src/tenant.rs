//! Auth & Tenant Registry (spec §4.1, C1).
//!
//! Generalized from the teacher's JWT-based `AuthManager`/`TenantManager`
//! pair to the spec's opaque-API-key model: keys are random, prefixed by
//! tenant type, stored hashed with bcrypt, and hash-then-compare on lookup.

use crate::error::{CoreError, CoreResult};
use crate::types::TenantType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub tenant_type: TenantType,
    pub identifier: String,
    pub display_name: Option<String>,
    pub active: bool,
    pub metadata: serde_json::Value,
}

pub struct RegisteredKey {
    pub api_key: String,
    pub tenant_id: Uuid,
}

#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn register(
        &self,
        verification_secret: &str,
        tenant_type: TenantType,
        tenant_identifier: &str,
        display_name: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> CoreResult<RegisteredKey>;

    async fn authenticate(&self, api_key: &str) -> CoreResult<Tenant>;
}

/// Generates a >=128-bit-entropy opaque key, human-debuggable via a
/// tenant-type prefix (spec §4.1).
pub fn generate_api_key(tenant_type: TenantType) -> String {
    let mut bytes = [0u8; 24]; // 192 bits
    rand::thread_rng().fill_bytes(&mut bytes);
    let body = hex_encode(&bytes);
    format!("{}_{}", tenant_type.key_prefix(), body)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn validate_identifier(
    tenant_type: TenantType,
    identifier: &str,
    storefront_suffix: &str,
) -> CoreResult<()> {
    if identifier.is_empty() {
        return Err(CoreError::Validation("tenant_identifier must not be empty".to_string()));
    }
    if tenant_type == TenantType::Storefront {
        let suffix = format!(".{}", storefront_suffix);
        if !identifier.ends_with(&suffix) || identifier.len() <= suffix.len() {
            return Err(CoreError::Validation(format!(
                "storefront tenant_identifier must look like <name>{}",
                suffix
            )));
        }
    }
    Ok(())
}

pub struct PgTenantRegistry {
    pool: PgPool,
}

impl PgTenantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRegistry for PgTenantRegistry {
    async fn register(
        &self,
        verification_secret: &str,
        tenant_type: TenantType,
        tenant_identifier: &str,
        display_name: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> CoreResult<RegisteredKey> {
        let _ = verification_secret; // checked by caller against the server-held constant
        let metadata = metadata.unwrap_or(serde_json::json!({}));

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM tenants WHERE identifier = $1",
        )
        .bind(tenant_identifier)
        .fetch_optional(&mut *tx)
        .await?;

        let tenant_id = if let Some((id,)) = existing {
            // Re-registration: one active key per tenant (spec §4.1).
            sqlx::query("UPDATE api_keys SET active = false WHERE tenant_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            id
        } else {
            let id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO tenants (id, tenant_type, identifier, display_name, active, metadata, created_at)
                 VALUES ($1, $2, $3, $4, true, $5, $6)",
            )
            .bind(id)
            .bind(tenant_type.to_string())
            .bind(tenant_identifier)
            .bind(&display_name)
            .bind(&metadata)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            id
        };

        let plaintext = generate_api_key(tenant_type);
        let hashed = bcrypt::hash(&plaintext, bcrypt::DEFAULT_COST)
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO api_keys (key_hash, key_prefix, tenant_id, active, created_at)
             VALUES ($1, $2, $3, true, $4)",
        )
        .bind(&hashed)
        .bind(tenant_type.key_prefix())
        .bind(tenant_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RegisteredKey { api_key: plaintext, tenant_id })
    }

    async fn authenticate(&self, api_key: &str) -> CoreResult<Tenant> {
        if api_key.is_empty() {
            return Err(CoreError::Auth("Missing API key".to_string()));
        }

        let prefix = api_key.split('_').next().unwrap_or("");
        let candidates = sqlx::query_as::<_, (String, Uuid)>(
            "SELECT key_hash, tenant_id FROM api_keys WHERE key_prefix = $1 AND active = true",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        let tenant_id = candidates
            .into_iter()
            .find(|(hash, _)| bcrypt::verify(api_key, hash).unwrap_or(false))
            .map(|(_, id)| id)
            .ok_or_else(|| CoreError::Auth("Invalid or inactive API key".to_string()))?;

        let row = sqlx::query_as::<_, (Uuid, String, String, Option<String>, bool, serde_json::Value)>(
            "SELECT id, tenant_type, identifier, display_name, active, metadata FROM tenants WHERE id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::Auth("Invalid or inactive API key".to_string()))?;

        if !row.4 {
            return Err(CoreError::Auth("Invalid or inactive API key".to_string()));
        }

        Ok(Tenant {
            id: row.0,
            tenant_type: TenantType::from_str(&row.1)
                .ok_or_else(|| CoreError::Internal("corrupt tenant_type".to_string()))?,
            identifier: row.2,
            display_name: row.3,
            active: row.4,
            metadata: row.5,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_carry_the_tenant_type_prefix() {
        let key = generate_api_key(TenantType::Dev);
        assert!(key.starts_with("dev_"));
        assert!(key.len() > 32);
    }

    #[test]
    fn storefront_identifiers_must_match_host_suffix() {
        assert!(validate_identifier(TenantType::Storefront, "acme.storefronts.example.com", "storefronts.example.com").is_ok());
        assert!(validate_identifier(TenantType::Storefront, "acme", "storefronts.example.com").is_err());
        assert!(validate_identifier(TenantType::App, "any-id-at-all", "storefronts.example.com").is_ok());
    }
}
