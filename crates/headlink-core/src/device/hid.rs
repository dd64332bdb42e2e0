// ── Raw USB-HID transport ──
//
// Polls the HID bus for units with the configured vendor id, reports
// attach/detach diffs, opens the first unit and decodes its input reports.
// A failed read counts as a detach; the next scan that still sees the unit
// reports it attached again and reopens it.
// Raw HID has no control channel here, so every control operation returns
// `Unsupported` and battery reads come back unknown.
//
// The platform binding sits behind `HidBackend`/`HidReader`. Reads block,
// so the poll loop runs on a dedicated thread that `stop()` joins.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::{
    BatteryHandler, ButtonEventHandler, DeviceConfig, DeviceEventHandler, EventHandlers,
    HeadsetTransport, protocol,
};
use crate::error::DeviceError;
use crate::model::{BatteryStatus, DeviceInfo};

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const REPORT_SIZE: usize = 64;
const FALLBACK_SERIAL: &str = "USB-HID-DEVICE";

/// One entry from a HID bus enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceInfo {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: String,
    pub serial: String,
}

/// Platform HID access.
pub trait HidBackend: Send + Sync + 'static {
    fn enumerate(&self, vendor_id: u16) -> Vec<HidDeviceInfo>;
    fn open(&self, device: &HidDeviceInfo) -> Result<Box<dyn HidReader>, DeviceError>;
}

/// An open HID handle. Dropping it closes the device.
pub trait HidReader: Send {
    /// Read one input report. Returns `Ok(0)` when nothing arrived in time.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError>;
}

struct Shared {
    backend: Arc<dyn HidBackend>,
    config: DeviceConfig,
    devices: RwLock<BTreeMap<u16, DeviceInfo>>,
    handlers: EventHandlers,
}

struct Worker {
    cancel: CancellationToken,
    thread: JoinHandle<()>,
}

pub struct HidTransport {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl HidTransport {
    pub fn new(backend: Arc<dyn HidBackend>, config: DeviceConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                devices: RwLock::new(BTreeMap::new()),
                handlers: EventHandlers::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    fn worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().expect("hid worker lock poisoned")
    }

    fn known(&self, id: u16) -> Result<DeviceInfo, DeviceError> {
        self.shared
            .devices
            .read()
            .expect("hid device table lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(DeviceError::DeviceNotFound { id })
    }

    fn unsupported(&self, id: u16, operation: &'static str) -> Result<(), DeviceError> {
        self.known(id)?;
        Err(DeviceError::Unsupported { operation })
    }
}

impl Shared {
    /// Diff the bus against the device table and report changes.
    fn scan(&self) -> Vec<HidDeviceInfo> {
        let present = self.backend.enumerate(self.config.vendor_id);

        let (attached, detached) = {
            let mut devices = self.devices.write().expect("hid device table lock poisoned");
            let mut attached = Vec::new();
            for entry in &present {
                devices.entry(entry.product_id).or_insert_with(|| {
                    let serial = if entry.serial.is_empty() {
                        FALLBACK_SERIAL
                    } else {
                        entry.serial.as_str()
                    };
                    let info = DeviceInfo::attached(
                        entry.product_id,
                        entry.product.clone(),
                        serial,
                        entry.vendor_id,
                        entry.product_id,
                    );
                    attached.push(info.clone());
                    info
                });
            }

            let gone: Vec<u16> = devices
                .keys()
                .copied()
                .filter(|id| !present.iter().any(|p| p.product_id == *id))
                .collect();
            let detached: Vec<DeviceInfo> =
                gone.iter().filter_map(|id| devices.remove(id)).collect();
            (attached, detached)
        };

        for info in attached {
            tracing::info!(device_id = info.id, name = %info.name, "HID device attached");
            self.handlers.emit_connected(info);
        }
        for info in detached {
            tracing::info!(device_id = info.id, name = %info.name, "HID device detached");
            self.handlers.emit_disconnected(info);
        }

        present
    }

    fn poll_loop(&self, cancel: &CancellationToken) {
        let mut reader: Option<(u16, Box<dyn HidReader>)> = None;
        let mut buf = [0_u8; REPORT_SIZE];
        let mut next_scan = Instant::now();

        while !cancel.is_cancelled() {
            if Instant::now() >= next_scan {
                let present = self.scan();
                next_scan = Instant::now() + self.config.poll_interval;

                if let Some((id, _)) = &reader {
                    if !present.iter().any(|p| p.product_id == *id) {
                        reader = None;
                    }
                }
                if reader.is_none() {
                    reader = self.open_first(&present);
                }
            }

            let Some((device_id, handle)) = reader.as_mut() else {
                std::thread::sleep(READ_TIMEOUT.min(next_scan.saturating_duration_since(Instant::now())));
                continue;
            };

            match handle.read_timeout(&mut buf, READ_TIMEOUT) {
                Ok(0) => {}
                Ok(n) => {
                    let frame = buf.get(..n).unwrap_or(&buf);
                    match protocol::decode(*device_id, frame) {
                        Some(event) => self.handlers.emit_button(event),
                        None => tracing::trace!(device_id = *device_id, ?frame, "Unmapped HID report"),
                    }
                }
                Err(e) => {
                    let id = *device_id;
                    tracing::warn!(device_id = id, error = %e, "HID read failed, closing device");
                    reader = None;
                    self.forget(id);
                }
            }
        }
    }

    /// Drop `id` from the device table and report it detached.
    fn forget(&self, id: u16) {
        let removed = self
            .devices
            .write()
            .expect("hid device table lock poisoned")
            .remove(&id);
        if let Some(info) = removed {
            self.handlers.emit_disconnected(info);
        }
    }

    fn open_first(&self, present: &[HidDeviceInfo]) -> Option<(u16, Box<dyn HidReader>)> {
        let entry = present.first()?;
        match self.backend.open(entry) {
            Ok(handle) => {
                tracing::debug!(device_id = entry.product_id, path = %entry.path, "Opened HID device");
                Some((entry.product_id, handle))
            }
            Err(e) => {
                tracing::warn!(device_id = entry.product_id, error = %e, "Could not open HID device");
                None
            }
        }
    }
}

impl HeadsetTransport for HidTransport {
    fn start(&self) -> Result<(), DeviceError> {
        let mut worker = self.worker();
        if worker.is_some() {
            return Err(DeviceError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("hid-poll".into())
            .spawn(move || shared.poll_loop(&token))
            .map_err(|e| DeviceError::Io(format!("failed to spawn HID poll thread: {e}")))?;

        *worker = Some(Worker { cancel, thread });
        tracing::info!(vendor_id = self.shared.config.vendor_id, "HID transport started");
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        let Some(worker) = self.worker().take() else {
            return Ok(());
        };

        worker.cancel.cancel();
        worker
            .thread
            .join()
            .map_err(|_| DeviceError::Io("HID poll thread panicked".into()))?;
        self.shared
            .devices
            .write()
            .expect("hid device table lock poisoned")
            .clear();

        tracing::info!("HID transport stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker().is_some()
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.shared
            .devices
            .read()
            .expect("hid device table lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn device(&self, id: u16) -> Result<DeviceInfo, DeviceError> {
        self.known(id)
    }

    fn battery(&self, id: u16) -> Result<BatteryStatus, DeviceError> {
        self.known(id)?;
        Ok(BatteryStatus::UNKNOWN)
    }

    fn set_mute(&self, id: u16, _mute: bool) -> Result<(), DeviceError> {
        self.unsupported(id, "set_mute")
    }

    fn mute(&self, id: u16) -> Result<bool, DeviceError> {
        self.unsupported(id, "mute").map(|()| false)
    }

    fn set_ringer(&self, id: u16, _ring: bool) -> Result<(), DeviceError> {
        self.unsupported(id, "set_ringer")
    }

    fn set_hook_state(&self, id: u16, _off_hook: bool) -> Result<(), DeviceError> {
        self.unsupported(id, "set_hook_state")
    }

    fn set_busylight(&self, id: u16, _on: bool) -> Result<(), DeviceError> {
        self.unsupported(id, "set_busylight")
    }

    fn set_hold(&self, id: u16, _hold: bool) -> Result<(), DeviceError> {
        self.unsupported(id, "set_hold")
    }

    fn set_volume(&self, id: u16, _volume: u8) -> Result<(), DeviceError> {
        self.unsupported(id, "set_volume")
    }

    fn volume(&self, id: u16) -> Result<u8, DeviceError> {
        self.unsupported(id, "volume").map(|()| 0)
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

impl Drop for HidTransport {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(worker) = worker.take() {
                worker.cancel.cancel();
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
