// workflow-events/src/rate_limit.rs
// ============================================================================
// Module: Sliding-Window Rate Limiter
// Description: Per-(clientId, scope) trimmed timestamp array.
// Purpose: Gate engine-internal and public-run request volume.
// Dependencies: tokio::sync::Mutex, tokio::time, workflow-core::limits
// ============================================================================

//! ## Overview
//! A sliding-window timestamp-array limiter: stamps older than the window
//! are trimmed on every check rather than reset on a fixed boundary, so a
//! burst at the edge of one window cannot immediately repeat at the start
//! of the next.

use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request is within the window's cap.
    Allowed,
    /// The request exceeds the cap; retry after the given delay.
    Limited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },
}

/// A sliding-window limiter keyed by `(client_id, scope)`.
pub struct RateLimiter {
    window: Duration,
    cap: u32,
    entries: Mutex<BTreeMap<(String, String), Vec<Instant>>>,
}

impl RateLimiter {
    /// Builds a limiter allowing `cap` requests per `window` per key.
    #[must_use]
    pub fn new(window: Duration, cap: u32) -> Self {
        Self { window, cap, entries: Mutex::new(BTreeMap::new()) }
    }

    /// Builds a limiter from a requests-per-minute figure, the shape both
    /// org-wide defaults and per-workflow overrides are expressed in.
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(Duration::from_secs(60), requests_per_minute)
    }

    /// Checks and, if allowed, records a request for `(client_id, scope)` at
    /// the current instant, under this limiter's default cap.
    pub async fn check(&self, client_id: &str, scope: &str) -> RateLimitDecision {
        self.check_with_cap(client_id, scope, None).await
    }

    /// Checks and, if allowed, records a request for `(client_id, scope)` at
    /// the current instant, using `cap_override` in place of the limiter's
    /// default cap when present. The sliding window stays the same; only the
    /// per-key ceiling changes — this is how a workflow's own
    /// `publicRateLimit.maxPerMinute` overrides the engine-wide public
    /// default on the same shared limiter instance.
    pub async fn check_with_cap(&self, client_id: &str, scope: &str, cap_override: Option<u32>) -> RateLimitDecision {
        let cap = cap_override.unwrap_or(self.cap);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let stamps = entries.entry((client_id.to_string(), scope.to_string())).or_default();
        stamps.retain(|stamp| now.saturating_duration_since(*stamp) < self.window);
        if stamps.len() >= cap as usize {
            let oldest = stamps[0];
            let retry_at = oldest + self.window;
            let retry_after_secs = retry_at.saturating_duration_since(now).as_secs_f64().ceil() as u64;
            return RateLimitDecision::Limited { retry_after_secs };
        }
        stamps.push(now);
        RateLimitDecision::Allowed
    }

    /// Drops every `(client_id, scope)` entry whose stamp list is empty
    /// after trimming. Intended to run on a fixed interval, every
    /// `RATE_LIMITER_REAP_INTERVAL_SECS`.
    pub async fn reap(&self) {
        let now = Instant::now();
        let window = self.window;
        let mut entries = self.entries.lock().await;
        for stamps in entries.values_mut() {
            stamps.retain(|stamp| now.saturating_duration_since(*stamp) < window);
        }
        entries.retain(|_, stamps| !stamps.is_empty());
    }
}

/// Spawns a background task that calls [`RateLimiter::reap`] every
/// `workflow_core::limits::RATE_LIMITER_REAP_INTERVAL_SECS`. The task runs
/// until the returned handle is dropped or aborted.
pub fn spawn_reaper(limiter: std::sync::Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(workflow_core::limits::RATE_LIMITER_REAP_INTERVAL_SECS);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            limiter.reap().await;
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_cap_then_limits() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert_eq!(limiter.check("client-1", "internal").await, RateLimitDecision::Allowed);
        assert_eq!(limiter.check("client-1", "internal").await, RateLimitDecision::Allowed);
        assert!(matches!(limiter.check("client-1", "internal").await, RateLimitDecision::Limited { .. }));
    }

    #[tokio::test]
    async fn distinct_scopes_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert_eq!(limiter.check("client-1", "scope-a").await, RateLimitDecision::Allowed);
        assert_eq!(limiter.check("client-1", "scope-b").await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn reap_clears_stale_entries() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 1);
        limiter.check("client-1", "scope").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.reap().await;
        assert!(limiter.entries.lock().await.is_empty());
    }
}
