//! Object Store Adapter (spec §4.3, C3). Generalized from the teacher's
//! `file-service::storage::StorageProvider` trait (upload/download/delete)
//! down to the two operations the core actually needs: `fetch` any
//! client-supplied input URL, and `put` an artifact at a deterministic path.

use crate::error::{CoreError, CoreResult};
use crate::types::Kind;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, url: &str) -> CoreResult<Vec<u8>>;

    async fn put(
        &self,
        kind: Kind,
        client_task_id: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> CoreResult<String>;
}

/// Builds the bit-exact path from spec §6, switching to the `test_outputs/`
/// prefix under `TEST_ASSETS_MODE` (spec §6).
pub fn artifact_path(kind: Kind, client_task_id: &str, name: &str, test_assets_mode: bool) -> String {
    let base = format!("{}/{}/{}", kind.plural(), client_task_id, name);
    if test_assets_mode {
        format!("test_outputs/{}", base)
    } else {
        base
    }
}

pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    credential: String,
    test_assets_mode: bool,
}

impl HttpObjectStore {
    pub fn new(base_url: String, credential: String, test_assets_mode: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            credential,
            test_assets_mode,
        }
    }

    /// Bounded exponential backoff: <=5 attempts, base 200ms, cap 5s (spec §4.3).
    async fn with_retry<F, Fut>(&self, mut op: F) -> CoreResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if attempt >= 5 => {
                    tracing::warn!(status = %resp.status(), "object store request failed permanently");
                    return Err(CoreError::InputFetch);
                }
                Ok(_) | Err(_) if attempt >= 5 => return Err(CoreError::InputFetch),
                _ => {
                    let backoff_ms = (200u64 * 2u64.pow(attempt - 1)).min(5000);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, url: &str) -> CoreResult<Vec<u8>> {
        let url = url.to_string();
        let resp = self.with_retry(|| self.http.get(&url).send()).await?;
        resp.bytes().await.map(|b| b.to_vec()).map_err(|_| CoreError::InputFetch)
    }

    async fn put(
        &self,
        kind: Kind,
        client_task_id: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> CoreResult<String> {
        let path = artifact_path(kind, client_task_id, name, self.test_assets_mode);
        let put_url = format!("{}/{}", self.base_url, path);
        let body = bytes.to_vec();
        let ct = content_type.to_string();
        let credential = self.credential.clone();

        self.with_retry(|| {
            self.http
                .put(&put_url)
                .header("Content-Type", ct.clone())
                .header("Authorization", format!("Bearer {}", credential))
                .body(body.clone())
                .send()
        })
        .await
        .map_err(|_| CoreError::StorePut)?;

        Ok(format!("{}/{}", self.base_url, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_is_bit_exact() {
        assert_eq!(artifact_path(Kind::Images, "t1", "0.png", false), "images/t1/0.png");
        assert_eq!(artifact_path(Kind::Models, "t2", "model.glb", false), "models/t2/model.glb");
    }

    #[test]
    fn test_assets_mode_adds_prefix() {
        assert_eq!(
            artifact_path(Kind::Images, "t1", "0.png", true),
            "test_outputs/images/t1/0.png"
        );
    }
}
