// Scripted transport for unit tests: devices and events are driven by the
// test, control calls are recorded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use super::{
    BatteryHandler, ButtonEventHandler, DeviceEventHandler, EventHandlers, HeadsetTransport,
};
use crate::error::DeviceError;
use crate::model::{BatteryStatus, ButtonEvent, ButtonId, DeviceInfo};

#[derive(Default)]
pub struct ScriptedTransport {
    running: AtomicBool,
    devices: RwLock<BTreeMap<u16, DeviceInfo>>,
    handlers: EventHandlers,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn unit(id: u16, serial: &str) -> DeviceInfo {
        DeviceInfo::attached(id, format!("Engage {id}"), serial, 0x0b0e, id)
    }

    pub fn attach(&self, info: DeviceInfo) {
        self.devices.write().unwrap().insert(info.id, info.clone());
        self.handlers.emit_connected(info);
    }

    pub fn detach(&self, id: u16) {
        let removed = self.devices.write().unwrap().remove(&id);
        if let Some(info) = removed {
            self.handlers.emit_disconnected(info);
        }
    }

    pub fn button(&self, device_id: u16, button: ButtonId, pressed: bool) {
        self.handlers.emit_button(ButtonEvent {
            device_id,
            button,
            pressed,
        });
    }

    pub fn battery_update(&self, device_id: u16, status: BatteryStatus) {
        self.handlers.emit_battery(device_id, status);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, id: u16, call: String) -> Result<(), DeviceError> {
        if !self.devices.read().unwrap().contains_key(&id) {
            return Err(DeviceError::DeviceNotFound { id });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl HeadsetTransport for ScriptedTransport {
    fn start(&self) -> Result<(), DeviceError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::AlreadyRunning);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices.read().unwrap().values().cloned().collect()
    }

    fn device(&self, id: u16) -> Result<DeviceInfo, DeviceError> {
        self.devices
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(DeviceError::DeviceNotFound { id })
    }

    fn battery(&self, id: u16) -> Result<BatteryStatus, DeviceError> {
        self.device(id).map(|_| BatteryStatus::UNKNOWN)
    }

    fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError> {
        self.record(id, format!("set_mute({id},{mute})"))
    }

    fn mute(&self, id: u16) -> Result<bool, DeviceError> {
        self.device(id).map(|_| false)
    }

    fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError> {
        self.record(id, format!("set_ringer({id},{ring})"))
    }

    fn set_hook_state(&self, id: u16, off_hook: bool) -> Result<(), DeviceError> {
        self.record(id, format!("set_hook_state({id},{off_hook})"))
    }

    fn set_busylight(&self, id: u16, on: bool) -> Result<(), DeviceError> {
        self.record(id, format!("set_busylight({id},{on})"))
    }

    fn set_hold(&self, id: u16, hold: bool) -> Result<(), DeviceError> {
        self.record(id, format!("set_hold({id},{hold})"))
    }

    fn set_volume(&self, id: u16, volume: u8) -> Result<(), DeviceError> {
        self.record(id, format!("set_volume({id},{volume})"))
    }

    fn volume(&self, id: u16) -> Result<u8, DeviceError> {
        self.device(id).map(|_| 0)
    }

    fn on_device_connected(&self, handler: DeviceEventHandler) {
        self.handlers.set_connected(handler);
    }

    fn on_device_disconnected(&self, handler: DeviceEventHandler) {
        self.handlers.set_disconnected(handler);
    }

    fn on_button_event(&self, handler: ButtonEventHandler) {
        self.handlers.set_button(handler);
    }

    fn on_battery_update(&self, handler: BatteryHandler) {
        self.handlers.set_battery(handler);
    }
}
