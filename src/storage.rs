//! Device-id persistence slot (spec §6).
//!
//! A single optional string, written on successful connect when
//! `remember_device` is set, read on reconnect, cleared on explicit forget.
//! Storage is a best-effort cache, never load-bearing — every provider here
//! swallows its own failures and warns rather than propagating them, unlike
//! the hard-compatibility-boundary wire codecs. Modelled on the teacher's
//! `Config::from_file_or_default`/`save` read-whole-file/write-whole-file
//! idiom in `config.rs`, minus a `Result`-returning public surface.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::logger::Logger;

/// A pluggable key-value slot holding at most one device id.
pub trait DeviceIdStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, id: String);
    fn remove(&self);
}

/// Process-memory only; lost on restart. The default when no persistence is
/// configured.
#[derive(Debug, Default)]
pub struct InMemoryDeviceIdStore {
    slot: Mutex<Option<String>>,
}

impl DeviceIdStore for InMemoryDeviceIdStore {
    fn get(&self) -> Option<String> {
        self.slot.lock().unwrap().clone()
    }

    fn set(&self, id: String) {
        *self.slot.lock().unwrap() = Some(id);
    }

    fn remove(&self) {
        *self.slot.lock().unwrap() = None;
    }
}

/// Disables persistence outright: every read is empty, every write/remove
/// is a no-op. Used when a caller explicitly opts out of remembering a
/// device.
#[derive(Debug, Default)]
pub struct NoopDeviceIdStore;

impl DeviceIdStore for NoopDeviceIdStore {
    fn get(&self) -> Option<String> {
        None
    }

    fn set(&self, _id: String) {}
    fn remove(&self) {}
}

/// Persists the device id as the sole contents of a plain text file.
/// Read/write failures (missing file, permissions, disk full) are swallowed
/// with a warning — storage is best-effort (spec §6).
pub struct FileDeviceIdStore {
    path: PathBuf,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for FileDeviceIdStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDeviceIdStore").field("path", &self.path).finish()
    }
}

impl FileDeviceIdStore {
    pub fn new(path: impl Into<PathBuf>, logger: Arc<dyn Logger>) -> Self {
        FileDeviceIdStore { path: path.into(), logger }
    }
}

impl DeviceIdStore for FileDeviceIdStore {
    fn get(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                self.logger.warn(&format!("device id read failed: {e}"));
                None
            }
        }
    }

    fn set(&self, id: String) {
        if let Err(e) = std::fs::write(&self.path, id) {
            self.logger.warn(&format!("device id write failed: {e}"));
        }
    }

    fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.logger.warn(&format!("device id remove failed: {e}"));
            }
        }
    }
}
