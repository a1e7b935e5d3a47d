//! Periodic status polling for the legacy protocol only (spec §4.8).
//!
//! FTMS is notification-driven and opts out by returning an empty ask-stats
//! payload; this manager is a direct generalisation of the teacher's
//! ask-stats loop in `bluetooth/mod.rs`'s `monitor_notifications`, split out
//! so its session-token fencing and error budget can be tested in
//! isolation from the rest of the orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, error};

use crate::ble::BleCharacteristic;
use crate::codec::Codec;
use crate::transport;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// A monotone fence distinguishing live polling runs from superseded ones.
/// `stop()` bumps the token so timer callbacks captured before the stop
/// become no-ops; wraps before overflow (spec §3, "modulo a safe maximum").
#[derive(Debug, Default)]
pub struct SessionToken(AtomicU64);

impl SessionToken {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(if v == u64::MAX { 0 } else { v + 1 })
            })
            .unwrap()
    }
}

/// Emitted when a poll write fails; the orchestrator forwards these to the
/// `error` event channel.
#[derive(Debug, Clone)]
pub struct PollError {
    pub message: String,
    pub consecutive_errors: u32,
}

/// Owns the lifetime of one polling run. Holds only weak references to the
/// write characteristic and codec so a stray timer firing after `stop()`
/// cannot extend their lifetime (spec §9, "weak references in the poll
/// manager").
pub struct PollManager {
    token: Arc<SessionToken>,
    handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for PollManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollManager")
            .field("token", &self.token.current())
            .finish()
    }
}

impl Default for PollManager {
    fn default() -> Self {
        PollManager {
            token: Arc::new(SessionToken::default()),
            handle: std::sync::Mutex::new(None),
        }
    }
}

impl PollManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new polling run, implicitly stopping any previous one.
    /// `write_char` and `codec` are held weakly; `on_error` is invoked (off
    /// the polling task, synchronously within its tick) on every failed
    /// write, and the loop stops once `max_consecutive_errors` is reached.
    pub fn start(
        &self,
        write_char: Weak<dyn BleCharacteristic>,
        codec: &'static dyn Codec,
        interval: Duration,
        max_consecutive_errors: u32,
        on_error: impl Fn(PollError) + Send + Sync + 'static,
    ) {
        self.stop();
        let token = Arc::clone(&self.token);
        let my_generation = token.current();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it, the spec's cadence starts after one interval
            let mut consecutive_errors = 0u32;
            loop {
                ticker.tick().await;

                if token.current() != my_generation {
                    debug!("poll tick superseded, stopping");
                    return;
                }

                let Some(write_char) = write_char.upgrade() else {
                    debug!("poll characteristic gone, stopping");
                    return;
                };

                let payload = codec.ask_stats();
                if payload.is_empty() {
                    continue;
                }

                match transport::write(&*write_char, &payload, transport::DEFAULT_WRITE_TIMEOUT)
                    .await
                {
                    Ok(()) => {
                        consecutive_errors = 0;
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        error!(error = %e, consecutive_errors, "poll write failed");
                        on_error(PollError {
                            message: e.to_string(),
                            consecutive_errors,
                        });
                        if consecutive_errors >= max_consecutive_errors {
                            debug!("poll error budget exhausted, stopping");
                            return;
                        }
                    }
                }
            }
        });

        *self.handle.lock().unwrap() = Some(task);
    }

    /// Idempotent. Bumps the session token (fencing any in-flight tick) and
    /// aborts the background task.
    pub fn stop(&self) {
        self.token.bump();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for PollManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockCharacteristic;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_consecutive_errors() {
        let ch: Arc<dyn BleCharacteristic> =
            Arc::new(MockCharacteristic::new("fe01").with_write_error("nope"));
        let weak = Arc::downgrade(&ch);
        let codec = crate::registry::codec_for(crate::codec::CodecName::Standard);
        let errors = Arc::new(AtomicUsize::new(0));
        let errors2 = Arc::clone(&errors);

        let manager = PollManager::new();
        manager.start(
            weak,
            codec,
            Duration::from_millis(10),
            3,
            move |_e| {
                errors2.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(errors.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_error_counter() {
        let ch = Arc::new(MockCharacteristic::new("fe01"));
        let ch_dyn: Arc<dyn BleCharacteristic> = ch.clone();
        let weak = Arc::downgrade(&ch_dyn);
        let codec = crate::registry::codec_for(crate::codec::CodecName::Standard);
        let errors = Arc::new(AtomicUsize::new(0));
        let errors2 = Arc::clone(&errors);

        let manager = PollManager::new();
        manager.start(weak, codec, Duration::from_millis(10), 3, move |_e| {
            errors2.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(55)).await;
        tokio::task::yield_now().await;
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(!ch.written_payloads().is_empty());
    }

    #[tokio::test]
    async fn ftms_ask_stats_empty_payload_skips_write() {
        let ch: Arc<dyn BleCharacteristic> = Arc::new(MockCharacteristic::new("2ad9"));
        let weak = Arc::downgrade(&ch);
        let codec = crate::registry::codec_for(crate::codec::CodecName::Ftms);
        assert!(codec.ask_stats().is_empty());

        let manager = PollManager::new();
        let fired = Arc::new(Mutex::new(false));
        let fired2 = Arc::clone(&fired);
        manager.start(weak, codec, Duration::from_millis(5), 3, move |_e| {
            *fired2.lock().unwrap() = true;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!*fired.lock().unwrap());
        assert!(ch.written_payloads().is_empty());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let manager = PollManager::new();
        manager.stop();
        manager.stop();
    }

    #[test]
    fn session_token_wraps_instead_of_overflowing() {
        let token = SessionToken(AtomicU64::new(u64::MAX));
        assert_eq!(token.bump(), u64::MAX);
        assert_eq!(token.current(), 0);
    }
}
