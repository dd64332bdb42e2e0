// ── Simulated transport ──
//
// A single synthetic headset (id 0) for demos and tests. Controls are
// stored in memory and the battery drains one point per tick, wrapping
// from 0 back to 100.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{
    BatteryHandler, ButtonEventHandler, DeviceEventHandler, EventHandlers, HeadsetTransport,
};
use crate::error::DeviceError;
use crate::model::{BatteryStatus, ButtonEvent, ButtonId, DEFAULT_VENDOR_ID, DeviceInfo};

pub const SIMULATED_DEVICE_ID: u16 = 0;
const SIMULATED_PRODUCT_ID: u16 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Controls {
    muted: bool,
    ringer: bool,
    off_hook: bool,
    busylight: bool,
    hold: bool,
    volume: u8,
    battery: u8,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            muted: false,
            ringer: true,
            off_hook: false,
            busylight: false,
            hold: false,
            volume: 50,
            battery: 100,
        }
    }
}

struct State {
    device: Option<DeviceInfo>,
    controls: Controls,
    cancel: Option<CancellationToken>,
}

struct Shared {
    state: Mutex<State>,
    handlers: EventHandlers,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("simulated transport lock poisoned")
    }

    /// Advance the drain by one point and report the new level.
    fn drain_tick(&self) {
        let level = {
            let mut state = self.state();
            state.controls.battery = match state.controls.battery {
                0 => 100,
                n => n - 1,
            };
            state.controls.battery
        };
        self.handlers
            .emit_battery(SIMULATED_DEVICE_ID, BatteryStatus::at(level, false));
    }
}

pub struct SimulatedTransport {
    name: String,
    tick: Duration,
    shared: Arc<Shared>,
}

impl SimulatedTransport {
    pub fn new(tick: Duration) -> Self {
        Self {
            name: "Simulated Headset".into(),
            tick,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    device: None,
                    controls: Controls::default(),
                    cancel: None,
                }),
                handlers: EventHandlers::default(),
            }),
        }
    }

    /// Report a full press/release cycle of `button`.
    pub fn press(&self, button: ButtonId) -> Result<(), DeviceError> {
        self.device(SIMULATED_DEVICE_ID)?;
        for pressed in [true, false] {
            self.shared.handlers.emit_button(ButtonEvent {
                device_id: SIMULATED_DEVICE_ID,
                button,
                pressed,
            });
        }
        Ok(())
    }

    /// Current control values, for assertions.
    pub fn is_muted(&self) -> bool {
        self.shared.state().controls.muted
    }

    pub fn is_ringer_on(&self) -> bool {
        self.shared.state().controls.ringer
    }

    fn with_controls<T>(
        &self,
        id: u16,
        apply: impl FnOnce(&mut Controls) -> T,
    ) -> Result<T, DeviceError> {
        let mut guard = self.shared.state();
        let state = &mut *guard;
        match &state.device {
            Some(device) if device.id == id => Ok(apply(&mut state.controls)),
            Some(_) => Err(DeviceError::DeviceNotFound { id }),
            None => Err(DeviceError::NotRunning),
        }
    }
}

impl HeadsetTransport for SimulatedTransport {
    fn start(&self) -> Result<(), DeviceError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DeviceError::Io(format!("simulation needs an async runtime: {e}")))?;

        let (device, level) = {
            let mut state = self.shared.state();
            if state.cancel.is_some() {
                return Err(DeviceError::AlreadyRunning);
            }

            let serial = format!("SIM-{}", uuid::Uuid::new_v4().simple());
            let device = DeviceInfo::attached(
                SIMULATED_DEVICE_ID,
                self.name.clone(),
                serial,
                DEFAULT_VENDOR_ID,
                SIMULATED_PRODUCT_ID,
            );
            let cancel = CancellationToken::new();
            state.device = Some(device.clone());
            state.cancel = Some(cancel.clone());

            let shared = Arc::clone(&self.shared);
            let tick = self.tick;
            runtime.spawn(async move {
                let mut interval = tokio::time::interval(tick);
                interval.tick().await;
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = interval.tick() => shared.drain_tick(),
                    }
                }
            });

            (device, state.controls.battery)
        };

        tracing::info!(serial = %device.serial_number, "Simulated transport started");
        self.shared.handlers.emit_connected(device);
        self.shared
            .handlers
            .emit_battery(SIMULATED_DEVICE_ID, BatteryStatus::at(level, false));
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        let device = {
            let mut state = self.shared.state();
            let Some(cancel) = state.cancel.take() else {
                return Ok(());
            };
            cancel.cancel();
            state.device.take()
        };

        if let Some(device) = device {
            self.shared.handlers.emit_disconnected(device);
        }
        tracing::info!("Simulated transport stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.state().cancel.is_some()
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.shared.state().device.iter().cloned().collect()
    }

    fn device(&self, id: u16) -> Result<DeviceInfo, DeviceError> {
        match &self.shared.state().device {
            Some(device) if device.id == id => Ok(device.clone()),
            _ => Err(DeviceError::DeviceNotFound { id }),
        }
    }

    fn battery(&self, id: u16) -> Result<BatteryStatus, DeviceError> {
        self.with_controls(id, |c| BatteryStatus::at(c.battery, false))
    }

    fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError> {
        self.with_controls(id, |c| c.muted = mute)
    }

    fn mute(&self, id: u16) -> Result<bool, DeviceError> {
        self.with_controls(id, |c| c.muted)
    }

    fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError> {
        self.with_controls(id, |c| c.ringer = ring)
    }

    fn set_hook_state(&self, id: u16, off_hook: bool) -> Result<(), DeviceError> {
        self.with_controls(id, |c| c.off_hook = off_hook)
    }

    fn set_busylight(&self, id: u16, on: bool) -> Result<(), DeviceError> {
        self.with_controls(id, |c| c.busylight = on)
    }

    fn set_hold(&self, id: u16, hold: bool) -> Result<(), DeviceError> {
        self.with_controls(id, |c| c.hold = hold)
    }

    fn set_volume(&self, id: u16, volume: u8) -> Result<(), DeviceError> {
        self.with_controls(id, |c| c.volume = volume.min(100))
    }

    fn volume(&self, id: u16) -> Result<u8, DeviceError> {
        self.with_controls(id, |c| c.volume)
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

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
        }
    }
}
