//! Cancellation signal for in-flight `connect`/`reconnect` calls (spec §5).
//!
//! The BLE stack's own connect future is not guaranteed cancellable, so
//! cancellation here is expressed the same way the teacher races
//! `tokio::select!` against a shutdown signal in `main.rs`: a flag plus a
//! `Notify` to wake anyone racing against it, rather than a dedicated
//! cancellation-token crate (none appears anywhere in the corpus).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug)]
struct Shared {
    aborted: AtomicBool,
    notify: Notify,
}

/// The caller-held side: fires the signal exactly once.
#[derive(Debug, Clone)]
pub struct AbortController {
    shared: Arc<Shared>,
}

impl Default for AbortController {
    fn default() -> Self {
        AbortController {
            shared: Arc::new(Shared {
                aborted: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal { shared: Arc::clone(&self.shared) }
    }

    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

/// The callee-held side: observed by `connect`/`reconnect`.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    shared: Arc<Shared>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the signal fires. Used as the losing side of a race
    /// against the BLE stack's own connect future.
    pub async fn aborted(&self) {
        loop {
            // Register for the next notification before checking the flag:
            // otherwise an `abort()` landing between the check and the
            // `notified().await` below calls `notify_waiters()` while nobody
            // is registered yet, and the wakeup is lost forever.
            let notified = self.shared.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// Waits on `signal` if present, otherwise never resolves — lets callers
/// always have a branch to race against in a `tokio::select!` even when no
/// signal was supplied.
pub async fn wait(signal: &Option<AbortSignal>) {
    match signal {
        Some(signal) => signal.aborted().await,
        None => std::future::pending::<()>().await,
    }
}
