//! Credit/subscription subsystem contract (spec §1: treated as an external
//! pre-check the core only calls through, never implements).

use crate::types::Operation;
use async_trait::async_trait;

#[async_trait]
pub trait CreditGate: Send + Sync {
    async fn reserve(&self, user_id: Option<&str>, op: Operation) -> bool;
}

/// Dev/test stand-in that always approves — the real gate is an external
/// service the dispatch layer calls through this trait (spec §4.7 step 3).
pub struct AlwaysApprove;

#[async_trait]
impl CreditGate for AlwaysApprove {
    async fn reserve(&self, _user_id: Option<&str>, _op: Operation) -> bool {
        true
    }
}
