//! Device listing for the software endpoints.
//!
//! There is exactly one capture and one playback endpoint, and each is the
//! default of its direction.

use oal_runtime_core::{DeviceInfo, DeviceKind};

pub const NULL_CAPTURE_ID: &str = "null-capture";
pub const NULL_PLAYBACK_ID: &str = "null-playback";

/// List capture endpoints.
pub fn list_capture_devices() -> Vec<DeviceInfo> {
    vec![capture_device("Null Capture")]
}

/// List playback endpoints.
pub fn list_render_devices() -> Vec<DeviceInfo> {
    vec![playback_device("Null Output")]
}

pub(crate) fn capture_device(name: &str) -> DeviceInfo {
    DeviceInfo {
        id: NULL_CAPTURE_ID.into(),
        name: name.into(),
        kind: DeviceKind::Capture,
        is_default: true,
    }
}

pub(crate) fn playback_device(name: &str) -> DeviceInfo {
    DeviceInfo {
        id: NULL_PLAYBACK_ID.into(),
        name: name.into(),
        kind: DeviceKind::Playback,
        is_default: true,
    }
}
