// ── Device identity, battery and event value objects ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::button::ButtonId;

/// Vendor id of the supported headset family.
pub const DEFAULT_VENDOR_ID: u16 = 0x0b0e;

/// Battery level below which a unit reports itself as low.
pub const LOW_BATTERY_THRESHOLD: u8 = 20;

/// A connected headset or dongle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u16,
    pub name: String,
    pub serial_number: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub is_dongle: bool,
    pub connected_at: DateTime<Utc>,
}

impl DeviceInfo {
    /// Build a record for a unit that just attached.
    pub fn attached(
        id: u16,
        name: impl Into<String>,
        serial_number: impl Into<String>,
        vendor_id: u16,
        product_id: u16,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            is_dongle: is_dongle_name(&name),
            name,
            serial_number: serial_number.into(),
            vendor_id,
            product_id,
            connected_at: Utc::now(),
        }
    }
}

/// Dongles in this family report product names starting with `L`.
pub fn is_dongle_name(name: &str) -> bool {
    name.starts_with(['L', 'l'])
}

/// Battery reading for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// 0-100, or `None` when the transport cannot read it.
    pub level: Option<u8>,
    pub is_charging: bool,
    pub is_low: bool,
}

impl BatteryStatus {
    pub const UNKNOWN: Self = Self {
        level: None,
        is_charging: false,
        is_low: false,
    };

    /// Reading for a known level; `is_low` is derived from the threshold.
    pub fn at(level: u8, is_charging: bool) -> Self {
        let level = level.min(100);
        Self {
            level: Some(level),
            is_charging,
            is_low: level < LOW_BATTERY_THRESHOLD,
        }
    }
}

/// A button press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonEvent {
    pub device_id: u16,
    pub button: ButtonId,
    pub pressed: bool,
}

/// Attach or detach of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device_id: u16,
    pub connected: bool,
    pub device: DeviceInfo,
}
