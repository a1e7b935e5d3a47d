//! Hand-rolled mock BLE stack for unit/integration tests.
//!
//! Same shape as the corpus's own `other_examples` accuchek
//! `transport_trait_example.rs` `MockTransport`: a plain struct implementing
//! the same trait production code depends on, with scripted behaviour
//! exposed through plain fields instead of a mocking framework/macro — no
//! mocking crate appears anywhere in the corpus, so none is introduced here.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::ble::{
    BleCharacteristic, BleService, BleSession, BleStack, CharacteristicProperties, ConnectFilter,
};
use crate::error::{Error, Result};

pub struct MockCharacteristic {
    uuid: String,
    props: CharacteristicProperties,
    writes: Mutex<Vec<Vec<u8>>>,
    write_delay: Mutex<Option<Duration>>,
    write_error: Mutex<Option<String>>,
    listeners: Mutex<HashMap<u64, Box<dyn Fn(Vec<u8>) + Send + Sync>>>,
    next_id: AtomicU64,
    notifications_started: AtomicBool,
    notifications_stopped: AtomicBool,
}

impl std::fmt::Debug for MockCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCharacteristic").field("uuid", &self.uuid).finish()
    }
}

impl MockCharacteristic {
    pub fn new(uuid: &str) -> Self {
        MockCharacteristic {
            uuid: uuid.to_string(),
            props: CharacteristicProperties {
                notify: true,
                indicate: false,
                write: true,
                write_without_response: false,
            },
            writes: Mutex::new(Vec::new()),
            write_delay: Mutex::new(None),
            write_error: Mutex::new(None),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            notifications_started: AtomicBool::new(false),
            notifications_stopped: AtomicBool::new(false),
        }
    }

    pub fn with_props(mut self, props: CharacteristicProperties) -> Self {
        self.props = props;
        self
    }

    pub fn with_write_delay(self, delay: Duration) -> Self {
        *self.write_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with_write_error(self, message: &str) -> Self {
        *self.write_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn written_payloads(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn notifications_stopped(&self) -> bool {
        self.notifications_stopped.load(Ordering::SeqCst)
    }

    pub fn notifications_started(&self) -> bool {
        self.notifications_started.load(Ordering::SeqCst)
    }

    /// Fan a notification out to every currently-registered listener.
    pub fn emit(&self, data: Vec<u8>) {
        let listeners = self.listeners.lock().unwrap();
        for handler in listeners.values() {
            handler(data.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

#[async_trait]
impl BleCharacteristic for MockCharacteristic {
    fn uuid(&self) -> String {
        self.uuid.clone()
    }

    fn properties(&self) -> CharacteristicProperties {
        self.props
    }

    async fn write_with_response(&self, data: &[u8]) -> Result<()> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.write_error.lock().unwrap().clone() {
            return Err(Error::from_peer(message));
        }
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn start_notifications(&self) -> Result<()> {
        self.notifications_started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_notifications(&self) -> Result<()> {
        self.notifications_stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn add_value_listener(&self, handler: Box<dyn Fn(Vec<u8>) + Send + Sync>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().insert(id, handler);
        id
    }

    fn remove_listener(&self, id: u64) {
        self.listeners.lock().unwrap().remove(&id);
    }
}

#[derive(Debug)]
pub struct MockService {
    uuid: String,
    chars: Vec<Arc<dyn BleCharacteristic>>,
}

impl MockService {
    pub fn new(uuid: &str, chars: Vec<Arc<dyn BleCharacteristic>>) -> Self {
        MockService {
            uuid: uuid.to_string(),
            chars,
        }
    }
}

#[async_trait]
impl BleService for MockService {
    fn uuid(&self) -> String {
        self.uuid.clone()
    }

    async fn characteristics(&self) -> Result<Vec<Arc<dyn BleCharacteristic>>> {
        Ok(self.chars.clone())
    }
}

pub struct MockSession {
    services: Vec<Arc<dyn BleService>>,
    device_id: String,
    disconnected: AtomicBool,
    disconnect_error: Mutex<Option<String>>,
    on_disconnect: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession").finish()
    }
}

impl MockSession {
    pub fn new(services: Vec<Arc<dyn BleService>>) -> Self {
        MockSession {
            services,
            device_id: "mock-device".to_string(),
            disconnected: AtomicBool::new(false),
            disconnect_error: Mutex::new(None),
            on_disconnect: Mutex::new(None),
        }
    }

    pub fn with_device_id(mut self, id: &str) -> Self {
        self.device_id = id.to_string();
        self
    }

    pub fn with_disconnect_error(self, message: &str) -> Self {
        *self.disconnect_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Simulate an unsolicited peer disconnect.
    pub fn fire_peer_disconnect(&self) {
        if let Some(cb) = self.on_disconnect.lock().unwrap().as_ref() {
            cb();
        }
    }
}

#[async_trait]
impl BleSession for MockSession {
    async fn primary_services(&self) -> Result<Vec<Arc<dyn BleService>>> {
        Ok(self.services.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        if let Some(message) = self.disconnect_error.lock().unwrap().clone() {
            return Err(Error::from_peer(message));
        }
        Ok(())
    }

    fn on_disconnect(&self, callback: Box<dyn Fn() + Send + Sync>) -> Box<dyn FnOnce() + Send> {
        *self.on_disconnect.lock().unwrap() = Some(callback);
        Box::new(|| {})
    }

    fn device_id(&self) -> String {
        self.device_id.clone()
    }
}

pub struct MockStack {
    session: Mutex<Option<Arc<dyn BleSession>>>,
    connect_error: Mutex<Option<String>>,
    connect_delay: Mutex<Option<Duration>>,
    supports_reconnect: AtomicBool,
    reconnect_session: Mutex<Option<Arc<dyn BleSession>>>,
    connect_calls: AtomicU64,
    last_reconnect_device_id: Mutex<Option<String>>,
}

impl std::fmt::Debug for MockStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStack").finish()
    }
}

impl MockStack {
    pub fn with_session(session: Arc<dyn BleSession>) -> Self {
        MockStack {
            session: Mutex::new(Some(session)),
            connect_error: Mutex::new(None),
            connect_delay: Mutex::new(None),
            supports_reconnect: AtomicBool::new(false),
            reconnect_session: Mutex::new(None),
            connect_calls: AtomicU64::new(0),
            last_reconnect_device_id: Mutex::new(None),
        }
    }

    pub fn with_connect_error(message: &str) -> Self {
        MockStack {
            session: Mutex::new(None),
            connect_error: Mutex::new(Some(message.to_string())),
            connect_delay: Mutex::new(None),
            supports_reconnect: AtomicBool::new(false),
            reconnect_session: Mutex::new(None),
            connect_calls: AtomicU64::new(0),
            last_reconnect_device_id: Mutex::new(None),
        }
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.connect_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with_reconnect(self, session: Arc<dyn BleSession>) -> Self {
        self.supports_reconnect.store(true, Ordering::SeqCst);
        *self.reconnect_session.lock().unwrap() = Some(session);
        self
    }

    /// Marks the stack as reconnect-capable without giving it a cached
    /// device, so `reconnect()` resolves to `Ok(None)`.
    pub fn with_reconnect_supported(self) -> Self {
        self.supports_reconnect.store(true, Ordering::SeqCst);
        self
    }

    pub fn connect_call_count(&self) -> u64 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn last_reconnect_device_id(&self) -> Option<String> {
        self.last_reconnect_device_id.lock().unwrap().clone()
    }
}

#[async_trait]
impl BleStack for MockStack {
    async fn connect(
        &self,
        _filter: &ConnectFilter,
        _remember_device: bool,
    ) -> Result<Arc<dyn BleSession>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.connect_error.lock().unwrap().clone() {
            return Err(Error::from_peer(message));
        }
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::from_peer("no session configured"))
    }

    async fn reconnect(
        &self,
        cached_device_id: Option<&str>,
        _name_prefixes: &[String],
    ) -> Result<Option<Arc<dyn BleSession>>> {
        *self.last_reconnect_device_id.lock().unwrap() = cached_device_id.map(str::to_string);
        Ok(self.reconnect_session.lock().unwrap().clone())
    }

    fn supports_reconnect(&self) -> bool {
        self.supports_reconnect.load(Ordering::SeqCst)
    }
}

/// Build a standard session exposing the legacy `fe00` service with working
/// write (`fe01`) and notify (`fe02`) characteristics.
pub fn standard_session() -> (Arc<MockSession>, Arc<MockCharacteristic>, Arc<MockCharacteristic>) {
    let write_char = Arc::new(
        MockCharacteristic::new("fe01").with_props(CharacteristicProperties {
            notify: false,
            indicate: false,
            write: true,
            write_without_response: false,
        }),
    );
    let notify_char = Arc::new(
        MockCharacteristic::new("fe02").with_props(CharacteristicProperties {
            notify: true,
            indicate: false,
            write: false,
            write_without_response: false,
        }),
    );
    let service = Arc::new(MockService::new(
        "fe00",
        vec![
            write_char.clone() as Arc<dyn BleCharacteristic>,
            notify_char.clone() as Arc<dyn BleCharacteristic>,
        ],
    ));
    let session = Arc::new(MockSession::new(vec![service as Arc<dyn BleService>]));
    (session, write_char, notify_char)
}

/// Build an FTMS session: notify char `2acd`, control point `2ad9` (write +
/// indicate).
pub fn ftms_session() -> (Arc<MockSession>, Arc<MockCharacteristic>, Arc<MockCharacteristic>) {
    let notify_char = Arc::new(
        MockCharacteristic::new("2acd").with_props(CharacteristicProperties {
            notify: true,
            indicate: false,
            write: false,
            write_without_response: false,
        }),
    );
    let control_point = Arc::new(
        MockCharacteristic::new("2ad9").with_props(CharacteristicProperties {
            notify: false,
            indicate: true,
            write: true,
            write_without_response: false,
        }),
    );
    let service = Arc::new(MockService::new(
        "1826",
        vec![
            notify_char.clone() as Arc<dyn BleCharacteristic>,
            control_point.clone() as Arc<dyn BleCharacteristic>,
        ],
    ));
    let session = Arc::new(MockSession::new(vec![service as Arc<dyn BleService>]));
    (session, notify_char, control_point)
}
