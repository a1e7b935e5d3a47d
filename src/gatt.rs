//! GATT service discovery and role assignment (spec §4.6).
//!
//! Walks the session's primary services the same way the teacher's
//! `connect_and_monitor` walks `peripheral.discover_services().await`, but
//! assigns named roles (write / notify / control-point) across both the
//! FTMS dialect and the two legacy fallback service UUIDs instead of
//! hard-coding a single known layout.

use std::sync::Arc;

use tracing::debug;

use crate::ble::{BleCharacteristic, BleSession};
use crate::error::{Error, Result};
use crate::uuid_util::uuids_match;

const FTMS_SERVICE: &str = "1826";
const FTMS_TREADMILL_DATA_CHAR: &str = "2acd";
const FTMS_CONTROL_POINT_CHAR: &str = "2ad9";

const LEGACY_SERVICES: [&str; 2] = ["fe00", "fff0"];
const LEGACY_WRITE_CHARS: [&str; 2] = ["fe01", "fff2"];
const LEGACY_NOTIFY_CHARS: [&str; 2] = ["fe02", "fff1"];

/// The outcome of a successful discovery pass: the roles the orchestrator
/// needs plus the full discovered-service UUID list for session info and
/// protocol detection.
pub struct DiscoveredRoles {
    pub service_uuids: Vec<String>,
    pub write: Arc<dyn BleCharacteristic>,
    pub notify: Arc<dyn BleCharacteristic>,
    pub control_point: Option<Arc<dyn BleCharacteristic>>,
    pub control_point_notify: Option<Arc<dyn BleCharacteristic>>,
}

/// Discover and assign GATT roles on `session`. Fails with
/// [`Error::Discovery`] if either a write or a notify characteristic could
/// not be assigned after scanning every primary service.
pub async fn discover(session: &dyn BleSession) -> Result<DiscoveredRoles> {
    let services = session.primary_services().await?;

    let mut service_uuids = Vec::with_capacity(services.len());
    let mut write: Option<Arc<dyn BleCharacteristic>> = None;
    let mut notify: Option<Arc<dyn BleCharacteristic>> = None;
    let mut control_point: Option<Arc<dyn BleCharacteristic>> = None;
    let mut control_point_notify: Option<Arc<dyn BleCharacteristic>> = None;

    for service in &services {
        let service_uuid = service.uuid();
        service_uuids.push(service_uuid.clone());

        if uuids_match(&service_uuid, FTMS_SERVICE) {
            let chars = service.characteristics().await?;
            for ch in &chars {
                let ch_uuid = ch.uuid();
                if notify.is_none()
                    && uuids_match(&ch_uuid, FTMS_TREADMILL_DATA_CHAR)
                    && ch.properties().notify
                {
                    debug!(uuid = %ch_uuid, "assigned FTMS notify role");
                    notify = Some(Arc::clone(ch));
                }
                if uuids_match(&ch_uuid, FTMS_CONTROL_POINT_CHAR) && ch.properties().can_write() {
                    debug!(uuid = %ch_uuid, "assigned FTMS write/control-point role");
                    write = Some(Arc::clone(ch));
                    control_point = Some(Arc::clone(ch));
                    if ch.properties().indicate {
                        control_point_notify = Some(Arc::clone(ch));
                    }
                }
            }
            continue;
        }

        let legacy_index = LEGACY_SERVICES
            .iter()
            .position(|candidate| uuids_match(&service_uuid, candidate));
        if let Some(idx) = legacy_index {
            if write.is_some() && notify.is_some() {
                continue;
            }
            let chars = service.characteristics().await?;
            for ch in &chars {
                let ch_uuid = ch.uuid();
                if write.is_none()
                    && uuids_match(&ch_uuid, LEGACY_WRITE_CHARS[idx])
                    && ch.properties().can_write()
                {
                    debug!(uuid = %ch_uuid, "assigned legacy write role");
                    write = Some(Arc::clone(ch));
                }
                if notify.is_none()
                    && uuids_match(&ch_uuid, LEGACY_NOTIFY_CHARS[idx])
                    && ch.properties().notify
                {
                    debug!(uuid = %ch_uuid, "assigned legacy notify role");
                    notify = Some(Arc::clone(ch));
                }
            }
        }
    }

    let (write, notify) = match (write, notify) {
        (Some(w), Some(n)) => (w, n),
        _ => {
            let _ = session.disconnect().await;
            return Err(Error::Discovery(
                "no write and/or notify characteristic found across discovered services"
                    .to_string(),
            ));
        }
    };

    Ok(DiscoveredRoles {
        service_uuids,
        write,
        notify,
        control_point,
        control_point_notify,
    })
}
