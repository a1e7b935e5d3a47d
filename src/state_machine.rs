//! Connection lifecycle state machine (spec §4.9).
//!
//! A small, explicit alternative to the teacher's own `ConnectionStatus`
//! enum in `bluetooth/mod.rs`, plus the transition table the teacher left
//! implicit in `connect_and_monitor`'s control flow.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::logger::{Logger, NoopLogger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Error = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Error,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Whether `to` is a legal transition out of `from`, per spec §4.9's table
/// exactly — no transition outside this table is accepted, including a
/// state transitioning to itself (callers that want idempotent re-entry,
/// e.g. `disconnect()` on an already-disconnected machine, must check the
/// current state themselves rather than relying on a no-op self-transition).
///
/// | from         | allowed to                 |
/// |--------------|-----------------------------|
/// | Disconnected | Connecting                  |
/// | Connecting   | Connected, Error, Disconnected |
/// | Connected    | Disconnected                |
/// | Error        | Disconnected, Connecting     |
pub fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;
    matches!(
        (from, to),
        (Disconnected, Connecting)
            | (Connecting, Connected)
            | (Connecting, Error)
            | (Connecting, Disconnected)
            | (Connected, Disconnected)
            | (Error, Connecting)
            | (Error, Disconnected)
    )
}

pub type Observer = Box<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

/// Thread-safe holder of the current [`ConnectionState`] plus its observers.
///
/// The atomic mirror lets [`StateMachine::snapshot`] be lock-free; the
/// observer list and the authoritative transition check still go through a
/// mutex since a transition must be validated and published atomically with
/// respect to concurrent transitions.
pub struct StateMachine {
    current: AtomicU8,
    observers: Mutex<Vec<Observer>>,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.snapshot())
            .finish()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        StateMachine {
            current: AtomicU8::new(ConnectionState::Disconnected as u8),
            observers: Mutex::new(Vec::new()),
            logger: Arc::new(NoopLogger),
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        StateMachine {
            current: AtomicU8::new(ConnectionState::Disconnected as u8),
            observers: Mutex::new(Vec::new()),
            logger,
        }
    }

    pub fn snapshot(&self) -> ConnectionState {
        ConnectionState::from_u8(self.current.load(Ordering::SeqCst))
    }

    /// Attempt to move to `to`. Returns the previous state on success.
    ///
    /// An invalid transition indicates a bug in the orchestrator's own call
    /// sequencing, not a condition callers should expect to recover from; it
    /// surfaces as [`crate::error::Error::InvalidTransition`] rather than
    /// being silently clamped like wire data is.
    ///
    /// Each observer runs inside `catch_unwind` so a panicking observer is
    /// caught and logged rather than propagated — and, just as importantly,
    /// rather than poisoning `observers` and bricking every future
    /// transition (spec §4.9, same rule `events.rs::Channel::emit` applies
    /// to listener callbacks).
    pub fn transition(&self, to: ConnectionState) -> crate::error::Result<ConnectionState> {
        let observers = self.observers.lock().unwrap();
        let from = self.snapshot();
        if !is_valid_transition(from, to) {
            return Err(crate::error::Error::InvalidTransition { from, to });
        }
        self.current.store(to as u8, Ordering::SeqCst);
        if from != to {
            for observer in observers.iter() {
                let result =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer(from, to)));
                if let Err(panic) = result {
                    let message = panic_message(&panic);
                    warn!("state transition observer panicked: {message}");
                    self.logger.error(&format!("state transition observer panicked: {message}"));
                }
            }
        }
        drop(observers);
        Ok(from)
    }

    /// Register an observer invoked on every state change (not on no-op
    /// self-transitions). Returns an unsubscribe thunk.
    pub fn subscribe(&self, observer: Observer) -> usize {
        let mut observers = self.observers.lock().unwrap();
        observers.push(observer);
        observers.len() - 1
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
