//! Bounded writes and notification subscription (spec §4.7).
//!
//! Wraps the `BleCharacteristic` trait's raw operations with the deadlines
//! spec §5 requires of every BLE call, in the same spirit as the teacher's
//! direct `peripheral.write(...)`/`peripheral.subscribe(...)` calls in
//! `bluetooth/mod.rs` — just with an explicit timeout around each one
//! instead of relying on the underlying stack to bound them.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::ble::BleCharacteristic;
use crate::error::{Error, Result};

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Write-with-response against a single characteristic, bounded by `deadline`.
///
/// Rejects empty payloads outright with [`Error::EmptyPayload`] rather than
/// treating them as a no-op; callers that want "nothing to send" to succeed
/// silently (e.g. a codec command that legitimately encodes to nothing) must
/// check `payload.is_empty()` themselves before calling in. If the deadline
/// elapses first, returns [`Error::Timeout`] — the underlying write may
/// still complete in the background; callers must re-check connection
/// state before trusting follow-up effects (spec §5).
pub async fn write(
    characteristic: &dyn BleCharacteristic,
    payload: &[u8],
    deadline: Duration,
) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::EmptyPayload);
    }
    match tokio::time::timeout(deadline, characteristic.write_with_response(payload)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "write",
            limit: deadline,
        }),
    }
}

/// Route-aware write: prefer the control-point characteristic when present,
/// otherwise fall back to the plain write characteristic. Every FTMS
/// command routes this way; standard-protocol commands always use the
/// unconditional write characteristic (callers pass `control_point: None`
/// for those).
pub async fn route_write(
    write_char: &dyn BleCharacteristic,
    control_point: Option<&dyn BleCharacteristic>,
    payload: &[u8],
    deadline: Duration,
) -> Result<()> {
    let target = control_point.unwrap_or(write_char);
    write(target, payload, deadline).await
}

/// Enable notifications on `characteristic` and dispatch each inbound value
/// to `handler`, bounded by `deadline` for the enable step only (not for
/// the lifetime of the subscription). Returns a teardown thunk: removing
/// the listener and issuing stop-notifications. Errors from the
/// stop-notifications call are logged, never propagated — cleanup must
/// never fail the caller.
pub async fn subscribe(
    characteristic: Arc<dyn BleCharacteristic>,
    handler: impl Fn(Vec<u8>) + Send + Sync + 'static,
    deadline: Duration,
) -> Result<Box<dyn FnOnce() + Send>> {
    match tokio::time::timeout(deadline, characteristic.start_notifications()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::Timeout {
                operation: "subscribe",
                limit: deadline,
            })
        }
    }

    let listener_id = characteristic.add_value_listener(Box::new(handler));

    let teardown_char = Arc::clone(&characteristic);
    Ok(Box::new(move || {
        teardown_char.remove_listener(listener_id);
        let stop_char = teardown_char;
        tokio::spawn(async move {
            if let Err(e) = stop_char.stop_notifications().await {
                warn!("stop_notifications failed during teardown: {e}");
            }
        });
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockCharacteristic;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let ch = MockCharacteristic::new("fe01");
        let err = write(&ch, &[], DEFAULT_WRITE_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::EmptyPayload));
        assert!(ch.written_payloads().is_empty());
    }

    #[tokio::test]
    async fn write_records_payload() {
        let ch = MockCharacteristic::new("fe01");
        write(&ch, &[1, 2, 3], DEFAULT_WRITE_TIMEOUT).await.unwrap();
        assert_eq!(ch.written_payloads(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn write_timeout_surfaces_as_timeout_error() {
        let ch = MockCharacteristic::new("fe01").with_write_delay(Duration::from_millis(50));
        let err = write(&ch, &[1], Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "write", .. }));
    }

    #[tokio::test]
    async fn route_write_prefers_control_point() {
        let write_char = MockCharacteristic::new("fe01");
        let cp = MockCharacteristic::new("2ad9");
        route_write(&write_char, Some(&cp), &[9], DEFAULT_WRITE_TIMEOUT)
            .await
            .unwrap();
        assert!(write_char.written_payloads().is_empty());
        assert_eq!(cp.written_payloads(), vec![vec![9]]);
    }

    #[tokio::test]
    async fn route_write_falls_back_without_control_point() {
        let write_char = MockCharacteristic::new("fe01");
        route_write(&write_char, None, &[9], DEFAULT_WRITE_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(write_char.written_payloads(), vec![vec![9]]);
    }

    #[tokio::test]
    async fn subscribe_dispatches_and_tears_down() {
        let ch = Arc::new(MockCharacteristic::new("fe02"));
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let teardown = subscribe(
            ch.clone() as Arc<dyn BleCharacteristic>,
            move |_data| {
                count2.fetch_add(1, Ordering::SeqCst);
            },
            DEFAULT_NOTIFICATION_TIMEOUT,
        )
        .await
        .unwrap();

        ch.emit(vec![1, 2, 3]);
        ch.emit(vec![4, 5, 6]);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        teardown();
        tokio::task::yield_now().await;
        ch.emit(vec![7, 8, 9]);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(ch.notifications_stopped());
    }
}
