// ── Canonical telemetry snapshot ──
//
// `TelemetryPayload` is the single state object the monitor owns. Readers
// always receive a clone, so the serialized form is what the local UI sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Connection state of the monitored headset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Offline,
    Online,
    Simulated,
}

impl ConnectionStatus {
    /// Online or simulated: a session is running.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub level: i32,
    /// `unknown`, `discharging` or `charging`.
    pub status: String,
    pub estimated_remaining_minutes: u32,
}

impl Default for BatteryInfo {
    fn default() -> Self {
        Self {
            level: 0,
            status: "unknown".into(),
            estimated_remaining_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub is_in_call: bool,
    pub is_muted: bool,
    pub volume: i32,
    pub battery: BatteryInfo,
    pub connection: ConnectionStatus,
    /// `HHh MMm` since the session started.
    pub session_uptime: String,
    /// Operator label shown by the UI.
    pub custom_id: String,
    pub custom_color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvents {
    pub last_power_on: DateTime<Utc>,
    pub last_button_pressed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub module: String,
    pub device: String,
    pub serial: String,
    pub state: DeviceState,
    pub events: DeviceEvents,
}

pub const TELEMETRY_MODULE: &str = "headset_telemetry";
pub const UPTIME_ZERO: &str = "00h 00m";
pub const WAITING_LABEL: &str = "Waiting...";
pub const DISCONNECTED_LABEL: &str = "Disconnected";
pub const INACTIVE_COLOR: &str = "#9e9e9e";

impl TelemetryPayload {
    /// State before any device has been seen.
    pub fn initial(device: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            module: TELEMETRY_MODULE.into(),
            device: device.into(),
            serial: serial.into(),
            state: DeviceState {
                is_in_call: false,
                is_muted: false,
                volume: 0,
                battery: BatteryInfo::default(),
                connection: ConnectionStatus::Offline,
                session_uptime: UPTIME_ZERO.into(),
                custom_id: WAITING_LABEL.into(),
                custom_color: INACTIVE_COLOR.into(),
            },
            events: DeviceEvents {
                last_power_on: Utc::now(),
                last_button_pressed: String::new(),
            },
        }
    }
}
