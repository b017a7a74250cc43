//! Pulls the `Tenant` the auth middleware already validated out of request
//! extensions, the same `Extension`-based hand-off the teacher's services
//! use for JWT claims — wrapped in a local newtype since `FromRequestParts`
//! can't be implemented directly on `bff_shared::tenant::Tenant`.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use bff_shared::tenant::Tenant;
use std::ops::Deref;

pub struct AuthenticatedTenant(pub Tenant);

impl Deref for AuthenticatedTenant {
    type Target = Tenant;
    fn deref(&self) -> &Tenant {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedTenant
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Tenant>()
            .cloned()
            .map(AuthenticatedTenant)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
