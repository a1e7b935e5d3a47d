//! Protocol detection and codec registry (spec §4.5).
//!
//! Mirrors the teacher's `protocol::detect_protocol`, which chose between
//! `Box<dyn TreadmillProtocol>` implementations by characteristic presence;
//! here detection runs over discovered *service* UUIDs instead, and the
//! winning codec is handed out from a process-lifetime singleton registry
//! rather than constructed fresh each time, since both codecs are stateless.

use std::sync::OnceLock;

use crate::codec::ftms::FtmsCodec;
use crate::codec::standard::StandardCodec;
use crate::codec::{Codec, CodecName};
use crate::uuid_util::uuids_match;

/// Bluetooth SIG-assigned short UUID for the Fitness Machine Service.
pub const FTMS_SERVICE_UUID: &str = "1826";

/// Select a codec given the services discovered on a peripheral. FTMS is
/// chosen whenever any discovered service's short form matches `1826`;
/// every other service list falls back to the standard protocol.
pub fn detect(service_uuids: &[String]) -> CodecName {
    if service_uuids
        .iter()
        .any(|uuid| uuids_match(uuid, FTMS_SERVICE_UUID))
    {
        CodecName::Ftms
    } else {
        CodecName::Standard
    }
}

static STANDARD: OnceLock<StandardCodec> = OnceLock::new();
static FTMS: OnceLock<FtmsCodec> = OnceLock::new();

/// Hand out the process-wide singleton codec instance for `name`. Repeated
/// calls for the same variant return a reference to the same instance.
pub fn codec_for(name: CodecName) -> &'static dyn Codec {
    match name {
        CodecName::Standard => STANDARD.get_or_init(StandardCodec::default),
        CodecName::Ftms => FTMS.get_or_init(FtmsCodec::default),
    }
}
