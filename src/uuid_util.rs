//! Bluetooth short/long UUID comparison utilities (spec §4.12).
//!
//! Characteristics and services come back from the BLE stack as plain
//! strings (spec §6), so these utilities operate on `&str` rather than the
//! `uuid` crate's `Uuid` type — `uuid` is used only internally by
//! `registry.rs`/`gatt.rs` to hold the small set of well-known constant
//! UUIDs, the same way the teacher declares `TREADMILL_DATA_UUID` etc. in
//! `bluetooth/ftms.rs`.

const SHORT_LEN: usize = 4;
const LONG_LEN: usize = 36;
/// Position of the 4 short-form hex digits within a long-form UUID string.
const SHORT_RANGE_IN_LONG: std::ops::Range<usize> = 4..8;

fn is_short_form(s: &str) -> bool {
    s.len() == SHORT_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_well_formed_long(s: &str) -> bool {
    if s.len() != LONG_LEN {
        return false;
    }
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if b != b'-' {
                    return false;
                }
            }
            _ => {
                if !(b as char).is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

fn short_form_of(s: &str) -> Option<&str> {
    if is_short_form(s) {
        Some(s)
    } else if is_well_formed_long(s) {
        Some(&s[SHORT_RANGE_IN_LONG])
    } else {
        None
    }
}

/// Two UUIDs match iff either is exactly the short form and equals the
/// other's short form, or both are well-formed long forms whose embedded
/// short-id digits agree. Comparison is case-insensitive. This deliberately
/// rejects a short id appearing anywhere in a long form other than its
/// canonical position (spec §8 end-to-end scenario 6).
pub fn uuids_match(a: &str, b: &str) -> bool {
    let (Some(a_short), Some(b_short)) = (short_form_of(a), short_form_of(b)) else {
        return false;
    };
    a_short.eq_ignore_ascii_case(b_short)
}

/// Expand a 4-hex-digit short UUID into its full Bluetooth Base UUID form:
/// `0000XXXX-0000-1000-8000-00805f9b34fb`, lowercase.
pub fn to_full_uuid(short: &str) -> String {
    format!("0000{}-0000-1000-8000-00805f9b34fb", short.to_ascii_lowercase())
}
