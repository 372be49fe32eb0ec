// workflow-core/src/cancel.rs
// ============================================================================
// Module: Run Cancellation Token
// Description: A cheap, cloneable cancellation handle shared by one run's
//              interpreter task and every handler it dispatches into.
// Purpose: Let `sleep`/`fetch`/`agent`/etc. handlers observe cancellation
//          without the interpreter owning their I/O directly.
// Dependencies: tokio::sync::Notify
// ============================================================================

//! ## Overview
//! Per the design notes, cancellation is a token passed into every handler;
//! handlers that issue I/O propagate it into their underlying client. This
//! is a minimal implementation: a flag plus a notifier, not a full
//! `tokio_util::sync::CancellationToken` (not part of this workspace's
//! dependency set).

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cloneable, run-scoped cancellation handle.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner { cancelled: AtomicBool::new(false), notify: Notify::new() }),
        }
    }

    /// Marks this token (and every clone of it) as cancelled.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns true if [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled; resolves immediately if already
    /// cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
