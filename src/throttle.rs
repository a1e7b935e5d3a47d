//! Trailing-edge throttle for a single-parameter async function (spec §4.13).
//!
//! Out of this crate's BLE-specific core but specified as an external
//! collaborator that callers are expected to wrap slider-style inputs with
//! (e.g. `set_speed`) before they ever reach the command mutex. Built the
//! same way the teacher wraps shared mutable state behind a `Mutex` plus a
//! spawned background task rather than reaching for a dedicated
//! throttle/debounce crate — nothing in the corpus depends on one.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

/// Raised in place of the wrapped function's result when a pending call is
/// replaced by a newer one before it ever fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("superseded by a newer call")]
pub struct Superseded;

type BoxFuture<E> = Pin<Box<dyn Future<Output = E> + Send>>;
type AsyncFn<A, E> = Arc<dyn Fn(A) -> BoxFuture<E> + Send + Sync>;

struct PendingSlot<A, E> {
    args: A,
    responder: oneshot::Sender<Result<E, Superseded>>,
}

struct Inner<A, E> {
    f: AsyncFn<A, E>,
    interval: Duration,
    last_fired_at: Mutex<Option<Instant>>,
    pending: Mutex<Option<PendingSlot<A, E>>>,
    timer_scheduled: Mutex<bool>,
}

/// Wraps one async unary function with trailing-edge throttling at a fixed
/// minimum interval.
pub struct Throttle<A, E> {
    inner: Arc<Inner<A, E>>,
}

impl<A, E> Clone for Throttle<A, E> {
    fn clone(&self) -> Self {
        Throttle { inner: Arc::clone(&self.inner) }
    }
}

impl<A, E> Throttle<A, E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, Fut>(interval: Duration, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E> + Send + 'static,
    {
        let f: AsyncFn<A, E> = Arc::new(move |args| Box::pin(f(args)));
        Throttle {
            inner: Arc::new(Inner {
                f,
                interval,
                last_fired_at: Mutex::new(None),
                pending: Mutex::new(None),
                timer_scheduled: Mutex::new(false),
            }),
        }
    }

    /// First call in a quiet window fires immediately. A call within the
    /// window is buffered as pending, replacing (and superseding) whatever
    /// was already buffered; once the window elapses the last-buffered call
    /// fires with its own arguments. Each call's returned future resolves
    /// with the outcome of whichever firing actually carried its arguments,
    /// or `Err(Superseded)` if a later call replaced it first.
    pub async fn call(&self, args: A) -> Result<E, Superseded> {
        let now = Instant::now();
        let due = {
            let last = self.inner.last_fired_at.lock().unwrap();
            match *last {
                None => true,
                Some(last) => now.duration_since(last) >= self.inner.interval,
            }
        };

        if due {
            *self.inner.last_fired_at.lock().unwrap() = Some(now);
            if let Some(old) = self.inner.pending.lock().unwrap().take() {
                let _ = old.responder.send(Err(Superseded));
            }
            return Ok((self.inner.f)(args).await);
        }

        let (tx, rx) = oneshot::channel();
        let old = self.inner.pending.lock().unwrap().replace(PendingSlot {
            args,
            responder: tx,
        });
        if let Some(old) = old {
            let _ = old.responder.send(Err(Superseded));
        }

        let needs_timer = {
            let mut scheduled = self.inner.timer_scheduled.lock().unwrap();
            if *scheduled {
                false
            } else {
                *scheduled = true;
                true
            }
        };

        if needs_timer {
            let inner = Arc::clone(&self.inner);
            let remaining = {
                let last = inner.last_fired_at.lock().unwrap();
                let last = last.expect("a due=false call implies a prior firing exists");
                inner.interval.saturating_sub(now.duration_since(last))
            };
            tokio::spawn(async move {
                tokio::time::sleep(remaining).await;
                *inner.timer_scheduled.lock().unwrap() = false;
                if let Some(slot) = inner.pending.lock().unwrap().take() {
                    *inner.last_fired_at.lock().unwrap() = Some(Instant::now());
                    let result = (inner.f)(slot.args).await;
                    let _ = slot.responder.send(Ok(result));
                }
            });
        }

        rx.await.unwrap_or(Err(Superseded))
    }
}
