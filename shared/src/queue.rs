//! Task Queue contract (spec §4.6, C6). The broker itself — a FIFO per
//! named queue with at-least-once delivery — is an external collaborator
//! (spec §1): this module only fixes the `Broker` contract the dispatch
//! layer and worker pool depend on, plus an in-process implementation
//! (named queues over `tokio::mpsc`) suitable for tests and for running the
//! whole system in a single process. A production deployment swaps this
//! for a real broker client without touching the dispatch or worker code.

use crate::error::{CoreError, CoreResult};
use crate::types::{Kind, Operation, ProviderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

/// The opaque job record carried on the wire (spec §4.6 `QueuedJob`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub internal_task_id: Uuid,
    pub row_id: Uuid,
    pub kind: Kind,
    pub operation: Operation,
    pub provider: ProviderId,
    pub params: serde_json::Value,
    pub input_urls: Vec<String>,
    pub mask_url: Option<String>,
    pub input_model_url: Option<String>,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn enqueue(&self, queue: &str, job: Job) -> CoreResult<()>;

    /// Blocks until a job is available on `queue`, or returns `None` if the
    /// broker has been shut down.
    async fn dequeue(&self, queue: &str) -> Option<Job>;
}

type Channel = (mpsc::UnboundedSender<Job>, Arc<Mutex<mpsc::UnboundedReceiver<Job>>>);

#[derive(Default)]
pub struct InMemoryBroker {
    channels: RwLock<HashMap<String, Channel>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    async fn channel_for(&self, queue: &str) -> Channel {
        if let Some(chan) = self.channels.read().await.get(queue) {
            return chan.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Arc::new(Mutex::new(rx)))
            })
            .clone()
    }
}

impl Clone for Channel {
    // Channel is a pure alias (tuple); `#[derive(Clone)]` isn't directly
    // available on a type alias, so the impl is spelled out.
    fn clone(&self) -> Self {
        (self.0.clone(), self.1.clone())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, queue: &str, job: Job) -> CoreResult<()> {
        let (tx, _) = self.channel_for(queue).await;
        tx.send(job).map_err(|_| CoreError::Internal("queue closed".to_string()))
    }

    async fn dequeue(&self, queue: &str) -> Option<Job> {
        let (_, rx) = self.channel_for(queue).await;
        let mut rx = rx.lock().await;
        rx.recv().await
    }
}

/// Real cross-process broker (spec §1, §4.6): one Redis list per named
/// queue, `LPUSH`/`BRPOP` for FIFO-with-blocking-pop, grounded on the
/// teacher's `RedisService` (`ConnectionManager` over a `Client`, clone per
/// call) generalized from a cache client to a work queue.
pub struct RedisBroker {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisBroker {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoreError::Internal(format!("invalid broker url: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CoreError::Internal(format!("broker connection failed: {e}")))?;
        Ok(Self { connection, key_prefix: key_prefix.into() })
    }

    fn list_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.key_prefix, queue)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, queue: &str, job: Job) -> CoreResult<()> {
        let payload = serde_json::to_string(&job)
            .map_err(|e| CoreError::Internal(format!("job serialization failed: {e}")))?;
        self.connection
            .clone()
            .lpush::<_, _, ()>(self.list_key(queue), payload)
            .await
            .map_err(|e| CoreError::Internal(format!("broker enqueue failed: {e}")))
    }

    async fn dequeue(&self, queue: &str) -> Option<Job> {
        let key = self.list_key(queue);
        loop {
            // 0-second timeout: block indefinitely, the same "wait for work"
            // contract the in-memory channel gives the worker loop.
            let popped: redis::RedisResult<Option<(String, String)>> =
                self.connection.clone().brpop(&key, 0.0).await;
            match popped {
                Ok(Some((_, payload))) => match serde_json::from_str(&payload) {
                    Ok(job) => return Some(job),
                    Err(err) => {
                        tracing::error!(error = %err, "dropping malformed queue payload");
                        continue;
                    }
                },
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(error = %err, "broker dequeue error, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
            }
        }
    }
}

/// Picks the broker backend from `broker_url` (spec §1): `memory://` stays
/// in-process (single-binary dev/test runs), anything else is handed to
/// `RedisBroker` so the gateway and worker binaries, run as separate
/// processes, share one real queue.
pub async fn broker_from_url(broker_url: &str) -> CoreResult<Arc<dyn Broker>> {
    if broker_url.starts_with("memory://") {
        return Ok(Arc::new(InMemoryBroker::new()));
    }
    Ok(Arc::new(RedisBroker::connect(broker_url, "bff").await?))
}
