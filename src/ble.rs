//! External BLE stack contract (spec §6).
//!
//! The BLE stack itself is explicitly out of this library's scope — these
//! traits are the boundary a host application (or the optional
//! `btleplug-backend` feature) implements. Shaped directly after the
//! teacher's own usage of `btleplug::api::{Peripheral, Characteristic}` in
//! `bluetooth/mod.rs`, generalised into a crate-owned trait so the
//! orchestrator, transport and discovery layers can be exercised against a
//! hand-rolled mock — the same pattern as the corpus's own
//! `transport_trait_example.rs` (`Transport` trait + `MockTransport`).

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::Result;

/// Property flags advertised by a discovered characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub notify: bool,
    pub indicate: bool,
    pub write: bool,
    pub write_without_response: bool,
}

impl CharacteristicProperties {
    pub fn can_write(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// A single GATT characteristic as handed back by the BLE stack.
#[async_trait]
pub trait BleCharacteristic: Send + Sync + Debug {
    fn uuid(&self) -> String;
    fn properties(&self) -> CharacteristicProperties;

    /// Write-with-response. Implementations should not apply their own
    /// deadline; `transport.rs` wraps every call with the caller's timeout.
    async fn write_with_response(&self, data: &[u8]) -> Result<()>;

    async fn start_notifications(&self) -> Result<()>;
    async fn stop_notifications(&self) -> Result<()>;

    /// Register a value-change handler, returning an id used to remove it
    /// again via [`BleCharacteristic::remove_listener`].
    fn add_value_listener(&self, handler: Box<dyn Fn(Vec<u8>) + Send + Sync>) -> u64;
    fn remove_listener(&self, id: u64);
}

/// A single discovered GATT service: its UUID plus its characteristics.
#[async_trait]
pub trait BleService: Send + Sync + Debug {
    fn uuid(&self) -> String;
    async fn characteristics(&self) -> Result<Vec<std::sync::Arc<dyn BleCharacteristic>>>;
}

/// A connected peripheral session.
#[async_trait]
pub trait BleSession: Send + Sync + Debug {
    async fn primary_services(&self) -> Result<Vec<std::sync::Arc<dyn BleService>>>;
    async fn disconnect(&self) -> Result<()>;

    /// Register a callback invoked when the peer disconnects unexpectedly.
    /// Returns an unsubscribe thunk.
    fn on_disconnect(&self, callback: Box<dyn Fn() + Send + Sync>) -> Box<dyn FnOnce() + Send>;

    /// A stable identifier for this peer (e.g. a hardware address), used by
    /// the orchestrator to populate its `DeviceIdStore` when `connect` is
    /// called with `remember_device: true` (spec §3's "device-id slot").
    fn device_id(&self) -> String;
}

/// Device-selector criteria passed to `connect`/used by `reconnect`'s
/// heuristics (spec §6's filters / name-prefixes options).
#[derive(Debug, Clone)]
pub struct ConnectFilter {
    pub name_prefixes: Vec<String>,
    pub optional_services: Vec<String>,
}

impl Default for ConnectFilter {
    fn default() -> Self {
        ConnectFilter {
            name_prefixes: vec!["Walking".to_string(), "KS".to_string()],
            optional_services: vec![
                "1826".to_string(),
                "fe00".to_string(),
                "fff0".to_string(),
            ],
        }
    }
}

/// The external BLE stack: scan/connect/GATT primitives (spec §6).
#[async_trait]
pub trait BleStack: Send + Sync + Debug {
    /// Opens a device picker (or uses a cached selection) and connects.
    async fn connect(
        &self,
        filter: &ConnectFilter,
        remember_device: bool,
    ) -> Result<std::sync::Arc<dyn BleSession>>;

    /// Reconnects to the last-known device. `cached_device_id` is whatever
    /// [`BleSession::device_id`] reported on the previous successful connect
    /// (via the orchestrator's `DeviceIdStore`), or `None` if nothing was
    /// cached; implementations may use it to target the same peer directly
    /// instead of re-running their own name-prefix scan. `Ok(None)` means no
    /// matching device was found; callers must not treat this as an error by
    /// itself (spec §4.10).
    async fn reconnect(
        &self,
        cached_device_id: Option<&str>,
        name_prefixes: &[String],
    ) -> Result<Option<std::sync::Arc<dyn BleSession>>>;

    /// Whether this stack implementation supports [`BleStack::reconnect`] at
    /// all. A stack without cached-identity support should return `false`
    /// here rather than always answering `Ok(None)`, so the orchestrator can
    /// fail fast without calling out to it.
    fn supports_reconnect(&self) -> bool;
}
