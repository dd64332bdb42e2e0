// ── Domain model ──
//
// Value objects shared by transports, the monitor and the agent.

pub mod button;
pub mod device;
pub mod telemetry;

pub use button::ButtonId;
pub use device::{
    BatteryStatus, ButtonEvent, DEFAULT_VENDOR_ID, DeviceEvent, DeviceInfo, is_dongle_name,
};
pub use telemetry::{BatteryInfo, ConnectionStatus, DeviceEvents, DeviceState, TelemetryPayload};
