//! Concrete [`BleStack`] backed by real hardware via `btleplug` (feature
//! `btleplug-backend`, off by default).
//!
//! Lifted almost verbatim from the teacher's `bluetooth/mod.rs`
//! `connect_and_monitor`/`scan_for_device` — scan by name-prefix filter,
//! connect, discover services — re-expressed against this crate's own
//! [`BleStack`]/[`BleSession`]/[`BleService`]/[`BleCharacteristic`] trait
//! boundary instead of being inlined into a single monitor loop. The core
//! of the library (codecs, orchestrator, discovery, polling) never depends
//! on this module; it exists only to prove the trait boundary is
//! implementable against a real transport, the same role the teacher's own
//! concrete `btleplug::platform::Peripheral` usage plays in its binary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic as BtCharacteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ble::{
    BleCharacteristic, BleService, BleSession, BleStack, CharacteristicProperties, ConnectFilter,
};
use crate::error::{Error, Result};

const SCAN_WINDOW: Duration = Duration::from_secs(5);
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A `BleStack` over the first adapter `btleplug::platform::Manager` finds.
/// Construction is async (`Manager::new()`/`adapters()` both are), so
/// callers build one with [`BtleplugStack::new`] rather than through a
/// plain constructor.
pub struct BtleplugStack {
    adapter: Adapter,
    last_connected: Mutex<Option<Peripheral>>,
}

impl std::fmt::Debug for BtleplugStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugStack").finish()
    }
}

impl BtleplugStack {
    pub async fn new() -> anyhow::Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no BLE adapter found"))?;
        Ok(BtleplugStack { adapter, last_connected: Mutex::new(None) })
    }

    /// Scans until a peripheral matches, or `SCAN_WINDOW` elapses. When
    /// `cached_device_id` is set, it takes priority over `name_prefixes`: an
    /// exact hardware-address match is the whole point of a cached identity,
    /// whereas name-prefix matching is a fresh-discovery heuristic.
    async fn scan_for(
        &self,
        cached_device_id: Option<&str>,
        name_prefixes: &[String],
    ) -> anyhow::Result<Option<Peripheral>> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        let deadline = tokio::time::Instant::now() + SCAN_WINDOW;
        loop {
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
            for peripheral in self.adapter.peripherals().await? {
                if let Some(target) = cached_device_id {
                    if peripheral.address().to_string() == target {
                        debug!(device_id = target, "matched cached device id");
                        let _ = self.adapter.stop_scan().await;
                        return Ok(Some(peripheral));
                    }
                    continue;
                }
                if let Ok(Some(props)) = peripheral.properties().await {
                    if let Some(name) = props.local_name {
                        if name_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                            debug!(name, "matched device filter");
                            let _ = self.adapter.stop_scan().await;
                            return Ok(Some(peripheral));
                        }
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = self.adapter.stop_scan().await;
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl BleStack for BtleplugStack {
    async fn connect(
        &self,
        filter: &ConnectFilter,
        _remember_device: bool,
    ) -> Result<Arc<dyn BleSession>> {
        let peripheral = self
            .scan_for(None, &filter.name_prefixes)
            .await
            .map_err(|e| Error::from_peer(e.to_string()))?
            .ok_or_else(|| Error::Discovery("no matching device found while scanning".to_string()))?;

        peripheral.connect().await.map_err(|e| Error::from_peer(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| Error::from_peer(e.to_string()))?;

        *self.last_connected.lock().unwrap() = Some(peripheral.clone());
        Ok(Arc::new(BtleplugSession::new(peripheral)))
    }

    async fn reconnect(
        &self,
        cached_device_id: Option<&str>,
        name_prefixes: &[String],
    ) -> Result<Option<Arc<dyn BleSession>>> {
        let peripheral = if cached_device_id.is_some() {
            match self
                .scan_for(cached_device_id, name_prefixes)
                .await
                .map_err(|e| Error::from_peer(e.to_string()))?
            {
                Some(p) => p,
                None => return Ok(None),
            }
        } else {
            let cached = self.last_connected.lock().unwrap().clone();
            match cached {
                Some(p) => p,
                None => match self
                    .scan_for(None, name_prefixes)
                    .await
                    .map_err(|e| Error::from_peer(e.to_string()))?
                {
                    Some(p) => p,
                    None => return Ok(None),
                },
            }
        };
        peripheral.connect().await.map_err(|e| Error::from_peer(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| Error::from_peer(e.to_string()))?;
        *self.last_connected.lock().unwrap() = Some(peripheral.clone());
        Ok(Some(Arc::new(BtleplugSession::new(peripheral))))
    }

    fn supports_reconnect(&self) -> bool {
        true
    }
}

fn to_properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
    }
}

type ListenerMap = HashMap<u64, Box<dyn Fn(Vec<u8>) + Send + Sync>>;

/// Demultiplexes the peripheral's single notification stream (`btleplug`
/// delivers all characteristics' value-change events on one stream) out to
/// per-characteristic listener sets, keyed by characteristic UUID. Started
/// lazily on the first `start_notifications` call for this session.
struct NotificationRouter {
    listeners: Mutex<HashMap<Uuid, (ListenerMap, u64)>>,
}

impl NotificationRouter {
    fn new() -> Self {
        NotificationRouter { listeners: Mutex::new(HashMap::new()) }
    }

    fn add_listener(&self, uuid: Uuid, handler: Box<dyn Fn(Vec<u8>) + Send + Sync>) -> u64 {
        let mut map = self.listeners.lock().unwrap();
        let entry = map.entry(uuid).or_insert_with(|| (HashMap::new(), 1));
        let id = entry.1;
        entry.1 += 1;
        entry.0.insert(id, handler);
        id
    }

    fn remove_listener(&self, uuid: Uuid, id: u64) {
        if let Some(entry) = self.listeners.lock().unwrap().get_mut(&uuid) {
            entry.0.remove(&id);
        }
    }

    fn dispatch(&self, uuid: Uuid, data: Vec<u8>) {
        let map = self.listeners.lock().unwrap();
        if let Some((handlers, _)) = map.get(&uuid) {
            for handler in handlers.values() {
                handler(data.clone());
            }
        }
    }
}

pub struct BtleplugCharacteristic {
    peripheral: Peripheral,
    inner: BtCharacteristic,
    router: Arc<NotificationRouter>,
}

impl std::fmt::Debug for BtleplugCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugCharacteristic").field("uuid", &self.inner.uuid).finish()
    }
}

#[async_trait]
impl BleCharacteristic for BtleplugCharacteristic {
    fn uuid(&self) -> String {
        self.inner.uuid.to_string()
    }

    fn properties(&self) -> CharacteristicProperties {
        to_properties(self.inner.properties)
    }

    async fn write_with_response(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.inner, data, WriteType::WithResponse)
            .await
            .map_err(|e| Error::from_peer(e.to_string()))
    }

    async fn start_notifications(&self) -> Result<()> {
        self.peripheral
            .subscribe(&self.inner)
            .await
            .map_err(|e| Error::from_peer(e.to_string()))
    }

    async fn stop_notifications(&self) -> Result<()> {
        self.peripheral
            .unsubscribe(&self.inner)
            .await
            .map_err(|e| Error::from_peer(e.to_string()))
    }

    fn add_value_listener(&self, handler: Box<dyn Fn(Vec<u8>) + Send + Sync>) -> u64 {
        self.router.add_listener(self.inner.uuid, handler)
    }

    fn remove_listener(&self, id: u64) {
        self.router.remove_listener(self.inner.uuid, id);
    }
}

#[derive(Debug)]
pub struct BtleplugServiceGroup {
    uuid: Uuid,
    characteristics: Vec<Arc<dyn BleCharacteristic>>,
}

#[async_trait]
impl BleService for BtleplugServiceGroup {
    fn uuid(&self) -> String {
        self.uuid.to_string()
    }

    async fn characteristics(&self) -> Result<Vec<Arc<dyn BleCharacteristic>>> {
        Ok(self.characteristics.clone())
    }
}

pub struct BtleplugSession {
    peripheral: Peripheral,
    router: Arc<NotificationRouter>,
    dispatch_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for BtleplugSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugSession").finish()
    }
}

impl BtleplugSession {
    fn new(peripheral: Peripheral) -> Self {
        let router = Arc::new(NotificationRouter::new());
        let session = BtleplugSession { peripheral: peripheral.clone(), router: Arc::clone(&router), dispatch_task: Mutex::new(None) };
        session.spawn_dispatch_task();
        session
    }

    /// One task per session reads the peripheral's single notification
    /// stream and routes each value by characteristic UUID (spec §4.12:
    /// handlers copy the bytes into an owned buffer before dispatch —
    /// `ValueNotification::value` is already an owned `Vec<u8>` in
    /// `btleplug`, so no further defensive copy is needed here).
    fn spawn_dispatch_task(&self) {
        let peripheral = self.peripheral.clone();
        let router = Arc::clone(&self.router);
        let handle = tokio::spawn(async move {
            let stream = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("failed to open notification stream: {e}");
                    return;
                }
            };
            tokio::pin!(stream);
            while let Some(event) = stream.next().await {
                router.dispatch(event.uuid, event.value);
            }
        });
        *self.dispatch_task.lock().unwrap() = Some(handle);
    }
}

impl Drop for BtleplugSession {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatch_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl BleSession for BtleplugSession {
    async fn primary_services(&self) -> Result<Vec<Arc<dyn BleService>>> {
        let mut by_service: HashMap<Uuid, Vec<Arc<dyn BleCharacteristic>>> = HashMap::new();
        for bt_char in self.peripheral.characteristics() {
            let characteristic: Arc<dyn BleCharacteristic> = Arc::new(BtleplugCharacteristic {
                peripheral: self.peripheral.clone(),
                inner: bt_char.clone(),
                router: Arc::clone(&self.router),
            });
            by_service.entry(bt_char.service_uuid).or_default().push(characteristic);
        }
        Ok(by_service
            .into_iter()
            .map(|(uuid, characteristics)| {
                Arc::new(BtleplugServiceGroup { uuid, characteristics }) as Arc<dyn BleService>
            })
            .collect())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await.map_err(|e| Error::from_peer(e.to_string()))
    }

    fn device_id(&self) -> String {
        self.peripheral.address().to_string()
    }

    fn on_disconnect(&self, _callback: Box<dyn Fn() + Send + Sync>) -> Box<dyn FnOnce() + Send> {
        // `btleplug`'s per-peripheral disconnect notification is only
        // available through the adapter's shared event stream (filtered by
        // peripheral id), which this crate's trait boundary does not thread
        // through to an individual session. Unsolicited-disconnect detection
        // (spec §4.10 step 11) degrades to "detected on the next failed
        // write/read" with this backend rather than immediately, until a
        // future revision plumbs adapter events through here.
        Box::new(|| {})
    }
}
