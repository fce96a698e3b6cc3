use crate::{actor::CoreHandle, policy::BannedIps, policy::OriginPolicy, ratelimit::RateLimiter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handles the transport layer needs on every request: the core actor, the policy
/// surfaces (ban list, origin, rate limiter) and a monotonically increasing id generator for
/// newly connected broadcast clients.
#[derive(Clone)]
pub struct AppState {
    pub core: CoreHandle,
    pub banned: BannedIps,
    pub origin: OriginPolicy,
    pub rate_limit: Option<RateLimiter>,
    next_client_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        core: CoreHandle,
        banned: BannedIps,
        origin: OriginPolicy,
        rate_limit: Option<RateLimiter>,
    ) -> Self {
        Self {
            core,
            banned,
            origin,
            rate_limit,
            next_client_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }
}
