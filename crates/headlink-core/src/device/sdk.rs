// ── Vendor SDK transport ──
//
// Callback-driven transport over the vendor's native SDK. The binding is
// injected as a `VendorSdk`; its callbacks are delivered through an
// `SdkEventSink` bound to this transport instance, so no process-wide
// state is involved and several transports can coexist.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::{
    BatteryHandler, ButtonEventHandler, DeviceConfig, DeviceEventHandler, EventHandlers,
    HeadsetTransport,
};
use crate::error::DeviceError;
use crate::model::{BatteryStatus, ButtonEvent, ButtonId, DeviceInfo};

/// Callback payloads raised by the native SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkEvent {
    Attached(DeviceInfo),
    Detached { device_id: u16 },
    Button {
        device_id: u16,
        button: ButtonId,
        pressed: bool,
    },
    Battery {
        device_id: u16,
        status: BatteryStatus,
    },
}

/// Context-bound entry point the binding invokes from its callbacks.
pub type SdkEventSink = Arc<dyn Fn(SdkEvent) + Send + Sync>;

/// Native SDK call surface. Implementations translate non-success return
/// codes into `DeviceError::Sdk { code }`.
pub trait VendorSdk: Send + Sync + 'static {
    fn initialize(&self, app_id: &str, sink: SdkEventSink) -> Result<(), DeviceError>;
    fn uninitialize(&self);
    fn attached_devices(&self) -> Vec<DeviceInfo>;

    fn battery(&self, id: u16) -> Result<BatteryStatus, DeviceError>;
    fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError>;
    fn mute(&self, id: u16) -> Result<bool, DeviceError>;
    fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError>;
    fn set_hook_state(&self, id: u16, off_hook: bool) -> Result<(), DeviceError>;
    fn set_busylight(&self, id: u16, on: bool) -> Result<(), DeviceError>;
    fn set_hold(&self, id: u16, hold: bool) -> Result<(), DeviceError>;
    fn set_volume(&self, id: u16, volume: u8) -> Result<(), DeviceError>;
    fn volume(&self, id: u16) -> Result<u8, DeviceError>;
}

struct Shared {
    running: AtomicBool,
    devices: RwLock<BTreeMap<u16, DeviceInfo>>,
    handlers: EventHandlers,
}

impl Shared {
    fn devices(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<u16, DeviceInfo>> {
        self.devices.read().expect("sdk device table lock poisoned")
    }

    fn devices_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<u16, DeviceInfo>> {
        self.devices.write().expect("sdk device table lock poisoned")
    }

    fn handle(&self, event: SdkEvent) {
        if !self.running.load(Ordering::SeqCst) {
            tracing::debug!(?event, "Dropping SDK callback after stop");
            return;
        }

        match event {
            SdkEvent::Attached(info) => {
                tracing::info!(device_id = info.id, name = %info.name, "SDK device attached");
                self.devices_mut().insert(info.id, info.clone());
                self.handlers.emit_connected(info);
            }
            SdkEvent::Detached { device_id } => {
                let removed = self.devices_mut().remove(&device_id);
                match removed {
                    Some(info) => {
                        tracing::info!(device_id, "SDK device detached");
                        self.handlers.emit_disconnected(info);
                    }
                    None => tracing::debug!(device_id, "Detach for unknown SDK device"),
                }
            }
            SdkEvent::Button {
                device_id,
                button,
                pressed,
            } => self.handlers.emit_button(ButtonEvent {
                device_id,
                button,
                pressed,
            }),
            SdkEvent::Battery { device_id, status } => {
                self.handlers.emit_battery(device_id, status);
            }
        }
    }
}

pub struct VendorSdkTransport {
    sdk: Arc<dyn VendorSdk>,
    config: DeviceConfig,
    shared: Arc<Shared>,
}

impl VendorSdkTransport {
    pub fn new(sdk: Arc<dyn VendorSdk>, config: DeviceConfig) -> Self {
        Self {
            sdk,
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                devices: RwLock::new(BTreeMap::new()),
                handlers: EventHandlers::default(),
            }),
        }
    }

    /// Sink handed to the binding. Holds only a weak reference, so a
    /// dropped transport silently ignores late callbacks.
    fn sink(&self) -> SdkEventSink {
        let owner: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |event| {
            if let Some(shared) = owner.upgrade() {
                shared.handle(event);
            }
        })
    }

    fn ensure(&self, id: u16) -> Result<(), DeviceError> {
        if !self.is_running() {
            return Err(DeviceError::NotRunning);
        }
        if !self.shared.devices().contains_key(&id) {
            return Err(DeviceError::DeviceNotFound { id });
        }
        Ok(())
    }
}

impl HeadsetTransport for VendorSdkTransport {
    fn start(&self) -> Result<(), DeviceError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::AlreadyRunning);
        }

        if let Err(e) = self.sdk.initialize(&self.config.app_id, self.sink()) {
            self.shared.running.store(false, Ordering::SeqCst);
            tracing::error!(error = %e, "Vendor SDK initialization failed");
            return Err(e);
        }

        // Units present before initialization never raise an attach callback.
        for info in self.sdk.attached_devices() {
            self.shared.handle(SdkEvent::Attached(info));
        }

        tracing::info!("Vendor SDK transport started");
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.sdk.uninitialize();
        self.shared.devices_mut().clear();
        tracing::info!("Vendor SDK transport stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.shared.devices().values().cloned().collect()
    }

    fn device(&self, id: u16) -> Result<DeviceInfo, DeviceError> {
        self.shared
            .devices()
            .get(&id)
            .cloned()
            .ok_or(DeviceError::DeviceNotFound { id })
    }

    fn battery(&self, id: u16) -> Result<BatteryStatus, DeviceError> {
        self.ensure(id)?;
        self.sdk.battery(id)
    }

    fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError> {
        self.ensure(id)?;
        self.sdk.set_mute(id, mute)
    }

    fn mute(&self, id: u16) -> Result<bool, DeviceError> {
        self.ensure(id)?;
        self.sdk.mute(id)
    }

    fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError> {
        self.ensure(id)?;
        self.sdk.set_ringer(id, ring)
    }

    fn set_hook_state(&self, id: u16, off_hook: bool) -> Result<(), DeviceError> {
        self.ensure(id)?;
        self.sdk.set_hook_state(id, off_hook)
    }

    fn set_busylight(&self, id: u16, on: bool) -> Result<(), DeviceError> {
        self.ensure(id)?;
        self.sdk.set_busylight(id, on)
    }

    fn set_hold(&self, id: u16, hold: bool) -> Result<(), DeviceError> {
        self.ensure(id)?;
        self.sdk.set_hold(id, hold)
    }

    fn set_volume(&self, id: u16, volume: u8) -> Result<(), DeviceError> {
        self.ensure(id)?;
        self.sdk.set_volume(id, volume.min(100))
    }

    fn volume(&self, id: u16) -> Result<u8, DeviceError> {
        self.ensure(id)?;
        self.sdk.volume(id)
    }

    fn on_device_connected(&self, handler: DeviceEventHandler) {
        self.shared.handlers.set_connected(handler);
    }

    fn on_device_disconnected(&self, handler: DeviceEventHandler) {
        self.shared.handlers.set_disconnected(handler);
    }

    fn on_button_event(&self, handler: ButtonEventHandler) {
        self.shared.handlers.set_button(handler);
    }

    fn on_battery_update(&self, handler: BatteryHandler) {
        self.shared.handlers.set_battery(handler);
    }
}

// ── Tests ────────────────────────────────────────────────────────────
