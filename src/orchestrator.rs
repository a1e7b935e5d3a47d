//! The connection lifecycle orchestrator (spec §4.10).
//!
//! The central coordinator generalised from the teacher's `BluetoothManager`
//! (`bluetooth/mod.rs`): connect/reconnect/disconnect, GATT discovery,
//! codec detection, notification subscription and polling are all driven
//! from here, behind the two-mutex discipline spec §5 requires instead of
//! the teacher's single `Mutex<ConnectionStatus>`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::abort::{self, AbortSignal};
use crate::ble::{BleStack, ConnectFilter};
use crate::codec::{Codec, CodecName};
use crate::error::{Error, Result};
use crate::events::{ConnectionStateChange, ErrorValue, EventBus};
use crate::gatt;
use crate::logger::{Logger, TracingLogger};
use crate::poll::{PollError, PollManager, DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_POLL_INTERVAL};
use crate::registry;
use crate::state_machine::{ConnectionState, StateMachine};
use crate::storage::{DeviceIdStore, InMemoryDeviceIdStore};
use crate::transport;

/// Caller-tunable knobs for `connect`/`reconnect` (spec §6's recognised
/// configuration options).
pub struct ConnectOptions {
    pub remember_device: bool,
    /// Legacy-protocol poll cadence in milliseconds; ignored for FTMS. Must
    /// be finite and `> 0`.
    pub poll_interval_ms: f64,
    pub filters: Option<ConnectFilter>,
    pub optional_services: Option<Vec<String>>,
    pub connection_timeout: Duration,
    pub write_timeout: Duration,
    pub notification_timeout: Duration,
    pub name_prefixes: Option<Vec<String>>,
    pub signal: Option<AbortSignal>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            remember_device: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as f64,
            filters: None,
            optional_services: None,
            connection_timeout: transport::DEFAULT_CONNECTION_TIMEOUT,
            write_timeout: transport::DEFAULT_WRITE_TIMEOUT,
            notification_timeout: transport::DEFAULT_NOTIFICATION_TIMEOUT,
            name_prefixes: None,
            signal: None,
        }
    }
}

/// Snapshot returned by [`ConnectionOrchestrator::get_session_info`]; only
/// available while `connected` (spec §4.10).
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub codec_name: CodecName,
    pub service_uuids: Vec<String>,
    pub write_uuid: String,
    pub notify_uuid: String,
    pub control_point_uuid: Option<String>,
}

struct ActiveSession {
    write: Arc<dyn crate::ble::BleCharacteristic>,
    control_point: Option<Arc<dyn crate::ble::BleCharacteristic>>,
    codec: &'static dyn Codec,
}

struct SessionHandle {
    session: Arc<dyn crate::ble::BleSession>,
    write: Arc<dyn crate::ble::BleCharacteristic>,
    control_point: Option<Arc<dyn crate::ble::BleCharacteristic>>,
    codec_name: CodecName,
    codec: &'static dyn Codec,
    service_uuids: Vec<String>,
    notify_uuid: String,
    poll_manager: Arc<PollManager>,
    teardown_thunks: Vec<Box<dyn FnOnce() + Send>>,
}

impl SessionHandle {
    fn into_partial(self) -> PartialSession {
        PartialSession {
            session: self.session,
            teardown_thunks: self.teardown_thunks,
            poll_manager: Some(self.poll_manager),
        }
    }
}

/// Whatever was acquired before a mid-setup failure; torn down the same way
/// a fully-formed [`SessionHandle`] is.
struct PartialSession {
    session: Arc<dyn crate::ble::BleSession>,
    teardown_thunks: Vec<Box<dyn FnOnce() + Send>>,
    poll_manager: Option<Arc<PollManager>>,
}

/// Implements `connect`/`reconnect`/`disconnect`/`start`/`stop`/`set_speed`
/// plus state/session-info accessors and the event fan-out (spec §4.10).
pub struct ConnectionOrchestrator {
    stack: Arc<dyn BleStack>,
    logger: Arc<dyn Logger>,
    device_store: Arc<dyn DeviceIdStore>,
    pub events: Arc<EventBus>,
    state_machine: Arc<StateMachine>,
    connection_mutex: tokio::sync::Mutex<()>,
    command_mutex: tokio::sync::Mutex<()>,
    session: std::sync::Mutex<Option<SessionHandle>>,
    self_weak: Weak<ConnectionOrchestrator>,
}

impl std::fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("state", &self.state_machine.snapshot())
            .finish()
    }
}

impl ConnectionOrchestrator {
    pub fn new(stack: Arc<dyn BleStack>) -> Arc<Self> {
        Self::with_collaborators(
            stack,
            Arc::new(TracingLogger),
            Arc::new(InMemoryDeviceIdStore::default()),
        )
    }

    pub fn with_collaborators(
        stack: Arc<dyn BleStack>,
        logger: Arc<dyn Logger>,
        device_store: Arc<dyn DeviceIdStore>,
    ) -> Arc<Self> {
        let events = Arc::new(EventBus::new(Arc::clone(&logger)));
        let state_machine = StateMachine::with_logger(Arc::clone(&logger));
        let events_for_observer = Arc::clone(&events);
        state_machine.subscribe(Box::new(move |from, to| {
            events_for_observer.emit_connection_state(ConnectionStateChange { from, to });
        }));
        let state_machine = Arc::new(state_machine);

        Arc::new_cyclic(|weak| ConnectionOrchestrator {
            stack,
            logger,
            device_store,
            events,
            state_machine,
            connection_mutex: tokio::sync::Mutex::new(()),
            command_mutex: tokio::sync::Mutex::new(()),
            session: std::sync::Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_machine.snapshot()
    }

    pub fn get_session_info(&self) -> Option<SessionInfo> {
        if self.state_machine.snapshot() != ConnectionState::Connected {
            return None;
        }
        let guard = self.session.lock().unwrap();
        guard.as_ref().map(|h| SessionInfo {
            codec_name: h.codec_name,
            service_uuids: h.service_uuids.clone(),
            write_uuid: h.write.uuid(),
            notify_uuid: h.notify_uuid.clone(),
            control_point_uuid: h.control_point.as_ref().map(|c| c.uuid()),
        })
    }

    fn transition(&self, to: ConnectionState) -> Result<()> {
        self.state_machine.transition(to)?;
        Ok(())
    }

    async fn teardown_partial(&self, partial: PartialSession) {
        if let Some(pm) = partial.poll_manager {
            pm.stop();
        }
        for thunk in partial.teardown_thunks {
            thunk();
        }
        if let Err(e) = partial.session.disconnect().await {
            self.events.emit_error(ErrorValue::new(format!("disconnect failed: {e}")));
        }
    }

    /// Steps 8-11 of the connect algorithm: GATT discovery, codec
    /// detection, notification subscription, optional control-point setup,
    /// polling and the peer-disconnect listener. Shared verbatim by both
    /// `connect` and `reconnect` (spec §4.10).
    async fn finish_connect_setup(
        &self,
        session: Arc<dyn crate::ble::BleSession>,
        opts: &ConnectOptions,
    ) -> std::result::Result<SessionHandle, (Error, PartialSession)> {
        let roles = match gatt::discover(&*session).await {
            Ok(roles) => roles,
            Err(e) => {
                return Err((
                    e,
                    PartialSession { session, teardown_thunks: Vec::new(), poll_manager: None },
                ))
            }
        };

        let codec_name = registry::detect(&roles.service_uuids);
        let codec = registry::codec_for(codec_name);

        let mut teardown_thunks: Vec<Box<dyn FnOnce() + Send>> = Vec::new();

        let events_for_state = Arc::clone(&self.events);
        let notify_subscription = transport::subscribe(
            Arc::clone(&roles.notify),
            move |data| {
                events_for_state.emit_state(codec.parse_status(&data));
            },
            opts.notification_timeout,
        )
        .await;
        let notify_teardown = match notify_subscription {
            Ok(teardown) => teardown,
            Err(e) => {
                return Err((
                    e,
                    PartialSession { session, teardown_thunks, poll_manager: None },
                ))
            }
        };
        teardown_thunks.push(notify_teardown);

        if let Some(cp) = &roles.control_point {
            if let Some(cp_notify) = &roles.control_point_notify {
                let cp_teardown =
                    transport::subscribe(Arc::clone(cp_notify), |_data| {}, opts.notification_timeout)
                        .await;
                match cp_teardown {
                    Ok(teardown) => teardown_thunks.push(teardown),
                    Err(e) => {
                        return Err((
                            e,
                            PartialSession { session, teardown_thunks, poll_manager: None },
                        ))
                    }
                }
            }

            let request_control = codec.request_control();
            if !request_control.is_empty() {
                if let Err(e) =
                    transport::write(&**cp, &request_control, opts.write_timeout).await
                {
                    return Err((e, PartialSession { session, teardown_thunks, poll_manager: None }));
                }
            }
        }

        let poll_manager = Arc::new(PollManager::new());
        if codec_name == CodecName::Standard {
            let interval = Duration::from_millis(opts.poll_interval_ms.max(1.0) as u64);
            let weak_write = Arc::downgrade(&roles.write);
            let events_for_poll = Arc::clone(&self.events);
            poll_manager.start(
                weak_write,
                codec,
                interval,
                DEFAULT_MAX_CONSECUTIVE_ERRORS,
                move |err: PollError| {
                    events_for_poll.emit_error(ErrorValue::new(err.message));
                },
            );
        }

        let self_weak = self.self_weak.clone();
        let unregister = session.on_disconnect(Box::new(move || {
            let self_weak = self_weak.clone();
            tokio::spawn(async move {
                if let Some(orchestrator) = self_weak.upgrade() {
                    orchestrator.handle_peer_disconnect().await;
                }
            });
        }));
        teardown_thunks.push(unregister);

        Ok(SessionHandle {
            session,
            write: roles.write,
            control_point: roles.control_point,
            codec_name,
            codec,
            service_uuids: roles.service_uuids,
            notify_uuid: roles.notify.uuid(),
            poll_manager,
            teardown_thunks,
        })
    }

    async fn handle_peer_disconnect(&self) {
        let _guard = self.connection_mutex.lock().await;
        if self.state_machine.snapshot() != ConnectionState::Connected {
            return;
        }
        let handle = self.session.lock().unwrap().take();
        if let Some(handle) = handle {
            self.teardown_partial(handle.into_partial()).await;
        }
        if let Err(e) = self.transition(ConnectionState::Disconnected) {
            warn!("peer-disconnect cleanup transition failed: {e}");
        }
    }

    /// Full cleanup-and-transition-to-disconnected sequence, used both by
    /// `disconnect()` and as the first step of `connect()` when already
    /// connected/connecting (spec §4.10 step 4). Assumes the connection
    /// mutex is already held.
    async fn cleanup_to_disconnected_locked(&self) -> Result<()> {
        let handle = self.session.lock().unwrap().take();
        if let Some(handle) = handle {
            self.teardown_partial(handle.into_partial()).await;
        }
        self.transition(ConnectionState::Disconnected)
    }

    pub async fn connect(&self, opts: ConnectOptions) -> Result<()> {
        if !opts.poll_interval_ms.is_finite() || opts.poll_interval_ms <= 0.0 {
            return Err(Error::Range("poll_interval_ms must be finite and > 0".to_string()));
        }
        if let Some(signal) = &opts.signal {
            if signal.is_aborted() {
                return Err(Error::ConnectionAborted);
            }
        }

        let _conn_guard = self.connection_mutex.lock().await;
        if let Some(signal) = &opts.signal {
            if signal.is_aborted() {
                return Err(Error::ConnectionAborted);
            }
        }

        let current = self.state_machine.snapshot();
        if current == ConnectionState::Connected || current == ConnectionState::Connecting {
            self.cleanup_to_disconnected_locked().await?;
        }

        self.transition(ConnectionState::Connecting)?;

        let filter = opts.filters.clone().unwrap_or_default();
        let mut connect_fut = self.stack.connect(&filter, opts.remember_device);

        let session = tokio::select! {
            biased;
            _ = abort::wait(&opts.signal) => {
                self.transition(ConnectionState::Disconnected)?;
                return Err(Error::ConnectionAborted);
            }
            result = &mut connect_fut => {
                match result {
                    Ok(session) => session,
                    Err(e) => {
                        self.transition(ConnectionState::Error)?;
                        self.events.emit_error(ErrorValue::new(e.to_string()));
                        return Err(e);
                    }
                }
            }
        };

        if let Some(signal) = &opts.signal {
            if signal.is_aborted() {
                if let Err(e) = session.disconnect().await {
                    debug!("post-abort disconnect of newly connected session failed: {e}");
                }
                self.transition(ConnectionState::Disconnected)?;
                return Err(Error::ConnectionAborted);
            }
        }

        let remember_device = opts.remember_device;
        match self.finish_connect_setup(session, &opts).await {
            Ok(handle) => {
                if remember_device {
                    self.device_store.set(handle.session.device_id());
                }
                *self.session.lock().unwrap() = Some(handle);
                self.transition(ConnectionState::Connected)?;
                Ok(())
            }
            Err((e, partial)) => {
                self.teardown_partial(partial).await;
                self.transition(ConnectionState::Error)?;
                self.events.emit_error(ErrorValue::new(e.to_string()));
                Err(e)
            }
        }
    }

    /// Clears any cached device id (spec §3's "cleared on explicit forget").
    /// Does not affect an in-progress or active connection; callers that
    /// want a clean slate typically pair this with `disconnect()`.
    pub fn forget_device(&self) {
        self.device_store.remove();
    }

    pub async fn reconnect(&self, opts: ConnectOptions) -> Result<()> {
        if let Some(signal) = &opts.signal {
            if signal.is_aborted() {
                return Err(Error::ConnectionAborted);
            }
        }

        let _conn_guard = self.connection_mutex.lock().await;
        if let Some(signal) = &opts.signal {
            if signal.is_aborted() {
                return Err(Error::ConnectionAborted);
            }
        }

        let current = self.state_machine.snapshot();
        if current == ConnectionState::Connected || current == ConnectionState::Connecting {
            return Ok(());
        }

        if !self.stack.supports_reconnect() {
            return Err(Error::Discovery("BLE stack does not support reconnect".to_string()));
        }

        self.transition(ConnectionState::Connecting)?;

        let name_prefixes = opts
            .name_prefixes
            .clone()
            .unwrap_or_else(|| ConnectFilter::default().name_prefixes);
        let cached_device_id = self.device_store.get();
        let mut reconnect_fut = self.stack.reconnect(cached_device_id.as_deref(), &name_prefixes);

        let maybe_session = tokio::select! {
            biased;
            _ = abort::wait(&opts.signal) => {
                self.transition(ConnectionState::Disconnected)?;
                return Err(Error::ConnectionAborted);
            }
            result = &mut reconnect_fut => {
                match result {
                    Ok(maybe_session) => maybe_session,
                    Err(e) => {
                        self.transition(ConnectionState::Error)?;
                        self.events.emit_error(ErrorValue::new(e.to_string()));
                        return Err(e);
                    }
                }
            }
        };

        if let Some(signal) = &opts.signal {
            if signal.is_aborted() {
                self.transition(ConnectionState::Disconnected)?;
                return Err(Error::ConnectionAborted);
            }
        }

        let Some(session) = maybe_session else {
            self.transition(ConnectionState::Disconnected)?;
            return Err(Error::Discovery("no cached device to reconnect to".to_string()));
        };

        match self.finish_connect_setup(session, &opts).await {
            Ok(handle) => {
                *self.session.lock().unwrap() = Some(handle);
                self.transition(ConnectionState::Connected)?;
                Ok(())
            }
            Err((e, partial)) => {
                self.teardown_partial(partial).await;
                self.transition(ConnectionState::Error)?;
                self.events.emit_error(ErrorValue::new(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        let _conn_guard = self.connection_mutex.lock().await;
        if self.state_machine.snapshot() == ConnectionState::Disconnected {
            return Ok(());
        }
        self.cleanup_to_disconnected_locked().await
    }

    fn snapshot_active(&self) -> Result<ActiveSession> {
        if self.state_machine.snapshot() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let guard = self.session.lock().unwrap();
        let handle = guard.as_ref().ok_or(Error::NotConnected)?;
        Ok(ActiveSession {
            write: Arc::clone(&handle.write),
            control_point: handle.control_point.clone(),
            codec: handle.codec,
        })
    }

    fn recheck_connected(&self) -> Result<()> {
        if self.state_machine.snapshot() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn run_command(
        &self,
        write_timeout: Duration,
        build: impl FnOnce(&dyn Codec) -> Vec<u8>,
    ) -> Result<()> {
        let _cmd_guard = self.command_mutex.lock().await;
        let active = self.snapshot_active()?;
        let payload = build(active.codec);
        if payload.is_empty() {
            return Ok(());
        }
        transport::route_write(
            &*active.write,
            active.control_point.as_deref(),
            &payload,
            write_timeout,
        )
        .await?;
        self.recheck_connected()
    }

    pub async fn start(&self) -> Result<()> {
        self.run_command(transport::DEFAULT_WRITE_TIMEOUT, |codec| codec.start()).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.run_command(transport::DEFAULT_WRITE_TIMEOUT, |codec| codec.stop()).await
    }

    pub async fn set_speed(&self, kmh: f64) -> Result<()> {
        let _cmd_guard = self.command_mutex.lock().await;
        let active = self.snapshot_active()?;
        let payload = active.codec.set_speed(kmh)?;
        if payload.is_empty() {
            return Ok(());
        }
        transport::route_write(
            &*active.write,
            active.control_point.as_deref(),
            &payload,
            transport::DEFAULT_WRITE_TIMEOUT,
        )
        .await?;
        self.recheck_connected()
    }
}
