//! Typed publish/subscribe event fan-out (spec §4.11).
//!
//! Richer than a bare `tokio::sync::broadcast` channel: listeners need
//! per-handle unsubscribe, one-shot auto-removal, remove-all, and a
//! listener-count query, none of which `broadcast::Receiver` exposes
//! directly. Grounded in the same "typed channel of boxed closures"
//! approach the teacher uses for its own notification dispatch in
//! `bluetooth/mod.rs`, generalised into a reusable bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::logger::Logger;
use crate::state::TreadmillState;
use crate::state_machine::ConnectionState;

/// A state-change notification as published on the `connectionStateChange`
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Error payload published on the `error` channel. Distinct from
/// [`crate::error::Error`] so non-fatal peer-reported strings (spec §7's
/// "peer errors... strings wrapped") can be represented without inventing
/// an `Error` variant for every possible message shape.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    pub message: String,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorValue { message: message.into() }
    }
}

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Channel<T> {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, (Listener<T>, bool)>>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Channel {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Channel<T> {
    fn subscribe(&self, once: bool, handler: Listener<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().insert(id, (handler, once));
        id
    }

    fn unsubscribe(&self, id: u64) -> bool {
        self.listeners.lock().unwrap().remove(&id).is_some()
    }

    fn remove_all(&self) {
        self.listeners.lock().unwrap().clear();
    }

    fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Runs every listener, catching and logging panics so one bad listener
    /// never stops the rest from observing the event (spec §4.11). One-shot
    /// listeners are removed after firing.
    fn emit(&self, value: &T, logger: &dyn Logger) {
        let snapshot: Vec<(u64, bool)> = {
            let listeners = self.listeners.lock().unwrap();
            listeners.iter().map(|(id, (_, once))| (*id, *once)).collect()
        };
        let mut to_remove = Vec::new();
        for (id, once) in snapshot {
            let handler_ptr = {
                let listeners = self.listeners.lock().unwrap();
                listeners.get(&id).map(|_| ())
            };
            if handler_ptr.is_none() {
                continue; // removed by an earlier listener in this same emit
            }
            let result = {
                let listeners = self.listeners.lock().unwrap();
                let Some((handler, _)) = listeners.get(&id) else {
                    continue;
                };
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(value)))
            };
            if let Err(panic) = result {
                let message = panic_message(&panic);
                warn!(listener_id = id, "event listener panicked: {message}");
                logger.error(&format!("event listener panicked: {message}"));
            }
            if once {
                to_remove.push(id);
            }
        }
        if !to_remove.is_empty() {
            let mut listeners = self.listeners.lock().unwrap();
            for id in to_remove {
                listeners.remove(&id);
            }
        }
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

/// Which channel remove-all targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    State,
    Error,
    ConnectionStateChange,
}

/// The orchestrator's event fan-out: three typed channels plus a logger
/// fallback for unheard errors (spec §4.11: "an `error` emit with zero
/// listeners routes the error to the logger's error sink").
pub struct EventBus {
    state: Channel<TreadmillState>,
    error: Channel<ErrorValue>,
    connection: Channel<ConnectionStateChange>,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("state_listeners", &self.state.listener_count())
            .field("error_listeners", &self.error.listener_count())
            .field("connection_listeners", &self.connection.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        EventBus {
            state: Channel::default(),
            error: Channel::default(),
            connection: Channel::default(),
            logger,
        }
    }

    pub fn subscribe_state(&self, handler: impl Fn(&TreadmillState) + Send + Sync + 'static) -> u64 {
        self.state.subscribe(false, Box::new(handler))
    }

    pub fn subscribe_state_once(
        &self,
        handler: impl Fn(&TreadmillState) + Send + Sync + 'static,
    ) -> u64 {
        self.state.subscribe(true, Box::new(handler))
    }

    pub fn unsubscribe_state(&self, id: u64) -> bool {
        self.state.unsubscribe(id)
    }

    pub fn emit_state(&self, value: TreadmillState) {
        self.state.emit(&value, &*self.logger);
    }

    pub fn subscribe_error(&self, handler: impl Fn(&ErrorValue) + Send + Sync + 'static) -> u64 {
        self.error.subscribe(false, Box::new(handler))
    }

    pub fn unsubscribe_error(&self, id: u64) -> bool {
        self.error.unsubscribe(id)
    }

    /// Emits on the `error` channel. If nobody is listening, routes to the
    /// logger instead so the error is never silently dropped.
    pub fn emit_error(&self, value: ErrorValue) {
        if self.error.listener_count() == 0 {
            self.logger.error(&value.message);
            return;
        }
        self.error.emit(&value, &*self.logger);
    }

    pub fn subscribe_connection_state(
        &self,
        handler: impl Fn(&ConnectionStateChange) + Send + Sync + 'static,
    ) -> u64 {
        self.connection.subscribe(false, Box::new(handler))
    }

    pub fn unsubscribe_connection_state(&self, id: u64) -> bool {
        self.connection.unsubscribe(id)
    }

    pub fn emit_connection_state(&self, change: ConnectionStateChange) {
        self.connection.emit(&change, &*self.logger);
    }

    pub fn remove_all(&self, kind: Option<EventKind>) {
        match kind {
            Some(EventKind::State) => self.state.remove_all(),
            Some(EventKind::Error) => self.error.remove_all(),
            Some(EventKind::ConnectionStateChange) => self.connection.remove_all(),
            None => {
                self.state.remove_all();
                self.error.remove_all();
                self.connection.remove_all();
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::State => self.state.listener_count(),
            EventKind::Error => self.error.listener_count(),
            EventKind::ConnectionStateChange => self.connection.listener_count(),
        }
    }

    /// Bridges the `state` channel to a lazily-subscribed broadcast
    /// receiver: the returned receiver only starts observing once created,
    /// and dropping every clone of it detaches the bridge (the internal
    /// listener outlives individual receivers but stops mattering once none
    /// remain, matching spec §4.11's "subscribed exactly when at least one
    /// listener exists for that channel" without a reference-dedup concept,
    /// which has no Rust closure analogue — see design notes).
    pub fn bridge_state(&self) -> tokio::sync::broadcast::Receiver<TreadmillState> {
        let (tx, rx) = tokio::sync::broadcast::channel(32);
        self.subscribe_state(move |state| {
            let _ = tx.send(state.clone());
        });
        rx
    }
}
