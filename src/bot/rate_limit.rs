//! Per-hostmask command flood protection.
//!
//! Each hostmask gets its own `governor` token bucket, kept in a
//! `DashMap`. Commands over the budget are dropped by the caller.

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;
use tracing::debug;

/// Type alias for governor's direct rate limiter.
type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Entries kept before the map is cleared.
const MAX_ENTRIES: usize = 10_000;

/// Command budget per hostmask.
#[derive(Debug)]
pub struct CommandLimiter {
    limiters: DashMap<String, DirectRateLimiter>,
    /// `None` disables limiting.
    quota: Option<Quota>,
}

impl CommandLimiter {
    /// Allow `per_minute` commands per hostmask, all of them as a burst.
    /// Zero disables the limit.
    pub fn new(per_minute: u32) -> Self {
        Self {
            limiters: DashMap::new(),
            quota: NonZeroU32::new(per_minute).map(Quota::per_minute),
        }
    }

    /// Returns `true` if `hostmask` may run another command now.
    pub fn check(&self, hostmask: &str) -> bool {
        let Some(quota) = self.quota else {
            return true;
        };

        if self.limiters.len() > MAX_ENTRIES {
            self.limiters.clear();
            debug!("cleared command rate limiters (exceeded {} entries)", MAX_ENTRIES);
        }

        let limiter = self
            .limiters
            .entry(hostmask.to_owned())
            .or_insert_with(|| GovRateLimiter::direct(quota));

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(source = %hostmask, "command rate limit exceeded");
        }
        allowed
    }

    /// Number of tracked hostmasks.
    pub fn tracked(&self) -> usize {
        self.limiters.len()
    }
}
