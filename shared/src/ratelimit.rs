//! Ingress rate limiter (spec §4.2, C2): a token bucket per
//! `(tenant_id, route_family)`, process-wide state behind short critical
//! sections — following the shape of the teacher's
//! `auth-service::middleware::rate_limit::RateLimiter`, generalized from
//! fixed-window counters to a true token bucket per spec's "Retry-After"
//! contract.

use crate::config::{BucketLimit, RateLimitConfig};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    limits: RateLimitConfig,
    buckets: RwLock<HashMap<(String, String), Bucket>>,
}

pub struct RateLimitOutcome {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self { limits, buckets: RwLock::new(HashMap::new()) }
    }

    fn limit_for(&self, route_family: &str) -> BucketLimit {
        self.limits
            .families
            .get(route_family)
            .copied()
            .unwrap_or(BucketLimit { capacity: 10, refill_per_sec: 1.0 })
    }

    /// Consumes one token for `(tenant_id, route_family)` if available.
    pub fn check(&self, tenant_id: &str, route_family: &str) -> RateLimitOutcome {
        let limit = self.limit_for(route_family);
        let key = (tenant_id.to_string(), route_family.to_string());
        let now = Instant::now();

        let mut buckets = self.buckets.write().unwrap();
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            tokens: limit.capacity as f64,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * limit.refill_per_sec).min(limit.capacity as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitOutcome { allowed: true, retry_after_secs: 0 }
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = (deficit / limit.refill_per_sec).ceil().max(1.0) as u64;
            RateLimitOutcome { allowed: false, retry_after_secs: wait_secs }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn limiter_with(capacity: u32, refill_per_sec: f64) -> RateLimiter {
        let mut families = Map::new();
        families.insert("image_sync".to_string(), BucketLimit { capacity, refill_per_sec });
        RateLimiter::new(RateLimitConfig { families })
    }

    #[test]
    fn exhausts_then_blocks_with_retry_after() {
        let limiter = limiter_with(4, 1.0);
        for _ in 0..4 {
            assert!(limiter.check("tenant-a", "image_sync").allowed);
        }
        let blocked = limiter.check("tenant-a", "image_sync");
        assert!(!blocked.allowed);
        assert!(blocked.retry_after_secs >= 1);
    }

    #[test]
    fn separate_tenants_have_independent_buckets() {
        let limiter = limiter_with(1, 1.0);
        assert!(limiter.check("tenant-a", "image_sync").allowed);
        assert!(!limiter.check("tenant-a", "image_sync").allowed);
        assert!(limiter.check("tenant-b", "image_sync").allowed);
    }

    #[test]
    fn separate_route_families_have_independent_buckets() {
        let mut families = Map::new();
        families.insert("image_sync".to_string(), BucketLimit { capacity: 1, refill_per_sec: 1.0 });
        families.insert("downscale".to_string(), BucketLimit { capacity: 1, refill_per_sec: 1.0 });
        let limiter = RateLimiter::new(RateLimitConfig { families });

        assert!(limiter.check("tenant-a", "image_sync").allowed);
        assert!(limiter.check("tenant-a", "downscale").allowed);
        assert!(!limiter.check("tenant-a", "image_sync").allowed);
    }
}
