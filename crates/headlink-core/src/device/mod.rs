// ── Device abstraction ──
//
// One capability contract for every headset transport: raw USB-HID
// polling, the vendor SDK's callback API, and an in-memory simulation.
// Raw report decoding is shared by all of them (see `protocol`).

pub mod hid;
pub mod protocol;
pub mod sdk;
pub mod simulated;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing;

use std::sync::{Arc, RwLock};

use crate::error::DeviceError;
use crate::model::{BatteryStatus, ButtonEvent, DeviceEvent, DeviceInfo};

pub use hid::{HidBackend, HidDeviceInfo, HidReader, HidTransport};
pub use sdk::{SdkEvent, SdkEventSink, VendorSdk, VendorSdkTransport};
pub use simulated::SimulatedTransport;

pub type DeviceEventHandler = Arc<dyn Fn(DeviceEvent) + Send + Sync>;
pub type ButtonEventHandler = Arc<dyn Fn(ButtonEvent) + Send + Sync>;
pub type BatteryHandler = Arc<dyn Fn(u16, BatteryStatus) + Send + Sync>;

/// Transport settings shared by all variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Application id handed to the vendor SDK on initialization.
    pub app_id: String,
    /// Only HID units with this vendor id are considered.
    pub vendor_id: u16,
    pub poll_interval: std::time::Duration,
}

pub const DEFAULT_APP_ID: &str = "88b7-5cbde35c-e588-49b3-a6d5-f54278270e28";

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.into(),
            vendor_id: crate::model::DEFAULT_VENDOR_ID,
            poll_interval: std::time::Duration::from_secs(2),
        }
    }
}

/// Capability contract for a headset transport.
///
/// Handlers may be registered before or after `start()`; each slot holds
/// one handler and a later registration replaces the earlier one. Control
/// operations never panic: unknown ids yield `DeviceNotFound`, actions the
/// transport cannot perform yield `Unsupported`.
pub trait HeadsetTransport: Send + Sync {
    // ── Lifecycle ────────────────────────────────────────────────────
    fn start(&self) -> Result<(), DeviceError>;
    /// Stop and release device handles. Stopping a stopped transport is a no-op.
    fn stop(&self) -> Result<(), DeviceError>;
    fn is_running(&self) -> bool;

    // ── Queries ──────────────────────────────────────────────────────
    fn list_devices(&self) -> Vec<DeviceInfo>;
    fn device(&self, id: u16) -> Result<DeviceInfo, DeviceError>;
    fn battery(&self, id: u16) -> Result<BatteryStatus, DeviceError>;

    // ── Controls ─────────────────────────────────────────────────────
    fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError>;
    fn mute(&self, id: u16) -> Result<bool, DeviceError>;
    fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError>;
    fn set_hook_state(&self, id: u16, off_hook: bool) -> Result<(), DeviceError>;
    fn set_busylight(&self, id: u16, on: bool) -> Result<(), DeviceError>;
    fn set_hold(&self, id: u16, hold: bool) -> Result<(), DeviceError>;
    fn set_volume(&self, id: u16, volume: u8) -> Result<(), DeviceError>;
    fn volume(&self, id: u16) -> Result<u8, DeviceError>;

    // ── Subscriptions (last registration wins) ───────────────────────
    fn on_device_connected(&self, handler: DeviceEventHandler);
    fn on_device_disconnected(&self, handler: DeviceEventHandler);
    fn on_button_event(&self, handler: ButtonEventHandler);
    fn on_battery_update(&self, handler: BatteryHandler);
}

// ── Handler table ────────────────────────────────────────────────────

#[derive(Default)]
struct Slots {
    connected: Option<DeviceEventHandler>,
    disconnected: Option<DeviceEventHandler>,
    button: Option<ButtonEventHandler>,
    battery: Option<BatteryHandler>,
}

/// Handler registration table owned by a transport instance.
///
/// Handlers are looked up at emit time, so a registration made after
/// `start()` sees every later event. The lock is released before the
/// handler runs.
#[derive(Default)]
pub struct EventHandlers {
    slots: RwLock<Slots>,
}

impl EventHandlers {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Slots> {
        self.slots.read().expect("handler table lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Slots> {
        self.slots.write().expect("handler table lock poisoned")
    }

    pub fn set_connected(&self, handler: DeviceEventHandler) {
        self.write().connected = Some(handler);
    }

    pub fn set_disconnected(&self, handler: DeviceEventHandler) {
        self.write().disconnected = Some(handler);
    }

    pub fn set_button(&self, handler: ButtonEventHandler) {
        self.write().button = Some(handler);
    }

    pub fn set_battery(&self, handler: BatteryHandler) {
        self.write().battery = Some(handler);
    }

    pub fn emit_connected(&self, device: DeviceInfo) {
        let handler = self.read().connected.clone();
        if let Some(handler) = handler {
            handler(DeviceEvent {
                device_id: device.id,
                connected: true,
                device,
            });
        }
    }

    pub fn emit_disconnected(&self, device: DeviceInfo) {
        let handler = self.read().disconnected.clone();
        if let Some(handler) = handler {
            handler(DeviceEvent {
                device_id: device.id,
                connected: false,
                device,
            });
        }
    }

    pub fn emit_button(&self, event: ButtonEvent) {
        let handler = self.read().button.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub fn emit_battery(&self, device_id: u16, status: BatteryStatus) {
        let handler = self.read().battery.clone();
        if let Some(handler) = handler {
            handler(device_id, status);
        }
    }
}
