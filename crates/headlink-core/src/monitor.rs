// ── Telemetry monitor ──
//
// Owns the canonical `TelemetryPayload`. Transport callbacks are funneled
// through one channel into a single consumer task, so state changes are
// applied in arrival order; periodic workers (uptime, battery log,
// simulated drain) touch the same state under the same lock. Consumers
// read snapshots or subscribe to the `MonitorEvent` broadcast.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::HeadsetTransport;
use crate::error::{CoreError, DeviceError};
use crate::model::telemetry::{DISCONNECTED_LABEL, INACTIVE_COLOR, UPTIME_ZERO};
use crate::model::{
    BatteryInfo, BatteryStatus, ButtonEvent, ButtonId, ConnectionStatus, DeviceInfo,
    TelemetryPayload,
};
use crate::notify::{APP_TITLE, Notifier};
use crate::store::{SETTING_CUSTOM_COLOR, SETTING_OPERATOR_NAME, TelemetryStore};

/// Assumed full-charge runtime when no discharge rate is known.
pub const FALLBACK_RUNTIME_MINUTES: u32 = 540;

const EVENT_CAPACITY: usize = 256;

/// Minutes left at `level` percent when draining `rate` percent per minute.
pub fn remaining_minutes(level: i32, rate: f64) -> u32 {
    if level <= 0 {
        return 0;
    }
    if rate.is_nan() || rate <= 0.0 {
        return FALLBACK_RUNTIME_MINUTES;
    }

    let minutes = (f64::from(level) / rate).floor();
    if minutes >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
        let minutes = minutes as u32;
        minutes
    }
}

/// `HHh MMm`.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}h {:02}m", secs / 3600, (secs / 60) % 60)
}

// ── Configuration ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Fall back to a synthetic device when no hardware is present.
    pub simulation: bool,
    /// Battery drain in percent per minute, used for the remaining-time estimate.
    pub discharge_rate: f64,
    pub simulation_tick: Duration,
    pub uptime_refresh: Duration,
    pub battery_log_interval: Duration,
    pub default_operator: String,
    pub default_color: String,
    /// Device label shown before the first unit attaches.
    pub initial_device: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            simulation: false,
            discharge_rate: 0.1,
            simulation_tick: Duration::from_secs(10),
            uptime_refresh: Duration::from_secs(30),
            battery_log_interval: Duration::from_secs(5 * 60),
            default_operator: "Operator 01".into(),
            default_color: "#2196F3".into(),
            initial_device: "Headset".into(),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Published after the monitor has applied a transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    DeviceAttached(DeviceInfo),
    DeviceDetached(DeviceInfo),
    Button(ButtonEvent),
    Battery {
        device_id: u16,
        status: BatteryStatus,
    },
    StatusChanged(ConnectionStatus),
}

enum Signal {
    Attached(DeviceInfo),
    Detached(DeviceInfo),
    Button(ButtonEvent),
    Battery(u16, BatteryStatus),
}

// ── State ────────────────────────────────────────────────────────────

struct State {
    payload: TelemetryPayload,
    active_device: Option<u16>,
    session_start: Instant,
    sim_level: i32,
}

/// Side effects collected under the state lock, performed after release.
#[derive(Default)]
struct Effects {
    notes: Vec<Note>,
    log: Vec<(&'static str, String)>,
    status: Option<ConnectionStatus>,
}

enum Note {
    Notify(String),
    Alert(String),
}

struct Running {
    transport: Arc<dyn HeadsetTransport>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Handle to the telemetry monitor. Cheap to clone.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    config: MonitorConfig,
    state: RwLock<State>,
    store: Arc<dyn TelemetryStore>,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<MonitorEvent>,
    running: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn TelemetryStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let payload = TelemetryPayload::initial(config.initial_device.clone(), "");
        Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(State {
                    payload,
                    active_device: None,
                    session_start: Instant::now(),
                    sim_level: 100,
                }),
                store,
                notifier,
                events,
                running: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Take ownership of `transport`, subscribe to it, start it and spawn
    /// the background workers.
    pub fn start(&self, transport: Arc<dyn HeadsetTransport>) -> Result<(), CoreError> {
        let mut running = self.inner.running();
        if running.is_some() {
            return Err(DeviceError::AlreadyRunning.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        subscribe(transport.as_ref(), &tx);
        transport.start()?;

        let cancel = CancellationToken::new();
        let config = &self.inner.config;
        let tasks = vec![
            tokio::spawn(event_loop(
                Arc::clone(&self.inner),
                Arc::clone(&transport),
                rx,
                cancel.clone(),
            )),
            spawn_periodic(&self.inner, &cancel, config.uptime_refresh, Inner::refresh_uptime),
            spawn_periodic(&self.inner, &cancel, config.battery_log_interval, Inner::log_battery),
            spawn_periodic(&self.inner, &cancel, config.simulation_tick, Inner::simulation_tick),
        ];

        if config.simulation && transport.list_devices().is_empty() {
            self.inner.update(|inner, state, fx| inner.enter_simulation(state, fx));
        }

        *running = Some(Running {
            transport,
            cancel,
            tasks,
        });
        tracing::info!("Telemetry monitor started");
        Ok(())
    }

    /// Stop the workers and the transport. Safe to call when not running.
    pub async fn stop(&self) -> Result<(), CoreError> {
        let Some(running) = self.inner.running().take() else {
            return Ok(());
        };

        running.cancel.cancel();
        for task in running.tasks {
            let _ = task.await;
        }

        let transport = running.transport;
        tokio::task::spawn_blocking(move || transport.stop())
            .await
            .map_err(|e| DeviceError::Io(format!("transport stop task failed: {e}")))??;

        self.inner.update(|_, state, fx| {
            if state.payload.state.connection != ConnectionStatus::Offline {
                state.payload.state.connection = ConnectionStatus::Offline;
                state.payload.state.session_uptime = UPTIME_ZERO.into();
                state.active_device = None;
                fx.status = Some(ConnectionStatus::Offline);
            }
        });
        tracing::info!("Telemetry monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running().is_some()
    }

    // ── Read API ─────────────────────────────────────────────────────

    /// Consistent copy of the current telemetry.
    pub fn telemetry(&self) -> TelemetryPayload {
        self.inner.read().payload.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.read().payload.state.connection
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    /// Transport currently owned by the monitor, for read access and for
    /// corrective commands issued by access control.
    pub fn transport(&self) -> Option<Arc<dyn HeadsetTransport>> {
        self.inner
            .running()
            .as_ref()
            .map(|r| Arc::clone(&r.transport))
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.transport()
            .map(|t| t.list_devices())
            .unwrap_or_default()
    }

    pub fn battery(&self, device_id: u16) -> Result<BatteryStatus, CoreError> {
        let transport = self.transport().ok_or(DeviceError::NotRunning)?;
        Ok(transport.battery(device_id)?)
    }

    /// Overwrite the toggled call/mute flags with known values.
    ///
    /// Button reports toggle these flags, so a lost or duplicated report
    /// leaves them inverted until corrected here.
    pub fn resync(&self, in_call: bool, muted: bool) {
        self.inner.update(|_, state, fx| {
            state.payload.state.is_in_call = in_call;
            state.payload.state.is_muted = muted;
            fx.log
                .push(("resync", format!("in_call={in_call} muted={muted}")));
        });
    }
}

// ── Transport subscription ───────────────────────────────────────────

fn subscribe(transport: &dyn HeadsetTransport, tx: &mpsc::UnboundedSender<Signal>) {
    let sender = tx.clone();
    transport.on_device_connected(Arc::new(move |e| {
        let _ = sender.send(Signal::Attached(e.device));
    }));
    let sender = tx.clone();
    transport.on_device_disconnected(Arc::new(move |e| {
        let _ = sender.send(Signal::Detached(e.device));
    }));
    let sender = tx.clone();
    transport.on_button_event(Arc::new(move |e| {
        let _ = sender.send(Signal::Button(e));
    }));
    let sender = tx.clone();
    transport.on_battery_update(Arc::new(move |id, status| {
        let _ = sender.send(Signal::Battery(id, status));
    }));
}

async fn event_loop(
    inner: Arc<Inner>,
    transport: Arc<dyn HeadsetTransport>,
    mut rx: mpsc::UnboundedReceiver<Signal>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            signal = rx.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };
        inner.apply(signal, transport.as_ref());
    }
}

fn spawn_periodic(
    inner: &Arc<Inner>,
    cancel: &CancellationToken,
    period: Duration,
    work: fn(&Inner),
) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => work(&inner),
            }
        }
    })
}

// ── State transitions ────────────────────────────────────────────────

impl Inner {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().expect("monitor state lock poisoned")
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().expect("monitor lifecycle lock poisoned")
    }

    /// Mutate state under the lock, then perform the collected effects.
    fn update<T>(&self, f: impl FnOnce(&Self, &mut State, &mut Effects) -> T) -> T {
        let mut fx = Effects::default();
        let out = {
            let mut state = self.state.write().expect("monitor state lock poisoned");
            f(self, &mut state, &mut fx)
        };
        self.perform(fx);
        out
    }

    fn perform(&self, fx: Effects) {
        for note in fx.notes {
            let result = match &note {
                Note::Notify(message) => self.notifier.notify(APP_TITLE, message),
                Note::Alert(message) => self.notifier.alert(APP_TITLE, message),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to raise notification");
            }
        }
        for (kind, detail) in fx.log {
            if let Err(e) = self.store.log_event(kind, &detail) {
                tracing::warn!(error = %e, kind, "Failed to record event");
            }
        }
        if let Some(status) = fx.status {
            tracing::info!(%status, "Connection status changed");
            let _ = self.events.send(MonitorEvent::StatusChanged(status));
        }
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn apply(&self, signal: Signal, transport: &dyn HeadsetTransport) {
        match signal {
            Signal::Attached(device) => {
                self.update(|inner, state, fx| {
                    if state.payload.state.connection != ConnectionStatus::Online {
                        inner.go_online(state, fx, &device);
                    }
                });
                self.publish(MonitorEvent::DeviceAttached(device));
            }
            Signal::Detached(device) => {
                let remaining = transport.list_devices();
                self.update(|inner, state, fx| {
                    if state.active_device != Some(device.id) {
                        return;
                    }
                    inner.go_offline(state, fx);
                    if let Some(next) = remaining.iter().find(|d| d.id != device.id) {
                        inner.go_online(state, fx, next);
                    } else if inner.config.simulation {
                        inner.enter_simulation(state, fx);
                    }
                });
                self.publish(MonitorEvent::DeviceDetached(device));
            }
            Signal::Button(event) => {
                if event.pressed {
                    self.update(|_, state, fx| toggle_on_press(state, fx, event.button));
                }
                self.publish(MonitorEvent::Button(event));
            }
            Signal::Battery(device_id, status) => {
                self.update(|inner, state, _| {
                    if state.active_device == Some(device_id)
                        && state.payload.state.connection == ConnectionStatus::Online
                    {
                        inner.set_battery(state, status);
                    }
                });
                self.publish(MonitorEvent::Battery { device_id, status });
            }
        }
    }

    fn go_online(&self, state: &mut State, fx: &mut Effects, device: &DeviceInfo) {
        let payload = &mut state.payload;
        payload.state.connection = ConnectionStatus::Online;
        payload.device.clone_from(&device.name);
        payload.serial.clone_from(&device.serial_number);
        payload.events.last_power_on = Utc::now();
        payload.state.session_uptime = UPTIME_ZERO.into();
        payload.state.custom_id = self
            .store
            .setting_or(SETTING_OPERATOR_NAME, &self.config.default_operator);
        payload.state.custom_color = self
            .store
            .setting_or(SETTING_CUSTOM_COLOR, &self.config.default_color);
        state.active_device = Some(device.id);
        state.session_start = Instant::now();

        tracing::info!(device_id = device.id, name = %device.name, "Headset online");
        fx.notes
            .push(Note::Notify(format!("Headset connected: {}", device.name)));
        fx.log.push(("connection_change", "Status: online".into()));
        fx.status = Some(ConnectionStatus::Online);
    }

    fn go_offline(&self, state: &mut State, fx: &mut Effects) {
        let was_online = state.payload.state.connection == ConnectionStatus::Online;
        let s = &mut state.payload.state;
        s.connection = ConnectionStatus::Offline;
        s.session_uptime = UPTIME_ZERO.into();
        s.custom_id = DISCONNECTED_LABEL.into();
        s.custom_color = INACTIVE_COLOR.into();
        state.active_device = None;

        tracing::warn!("Headset offline");
        if was_online {
            fx.notes.push(Note::Alert("Dongle removed!".into()));
        }
        fx.log.push(("connection_change", "Status: offline".into()));
        fx.status = Some(ConnectionStatus::Offline);
    }

    fn enter_simulation(&self, state: &mut State, fx: &mut Effects) {
        if state.payload.state.connection != ConnectionStatus::Offline {
            return;
        }

        let serial: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect();
        let payload = &mut state.payload;
        payload.state.connection = ConnectionStatus::Simulated;
        payload.device = "Simulation Mode".into();
        payload.serial = format!("SIM-{}", serial.to_uppercase());
        payload.events.last_power_on = Utc::now();
        payload.state.session_uptime = UPTIME_ZERO.into();
        payload.state.custom_id = self
            .store
            .setting_or(SETTING_OPERATOR_NAME, &self.config.default_operator);
        payload.state.custom_color = self
            .store
            .setting_or(SETTING_CUSTOM_COLOR, &self.config.default_color);
        state.session_start = Instant::now();
        state.sim_level = 100;
        self.drain_simulated(state);

        tracing::info!(serial = %state.payload.serial, "No headset found, simulating");
        fx.log.push(("connection_change", "Status: simulated".into()));
        fx.status = Some(ConnectionStatus::Simulated);
    }

    fn set_battery(&self, state: &mut State, status: BatteryStatus) {
        let battery = &mut state.payload.state.battery;
        match status.level {
            Some(level) => {
                battery.level = i32::from(level);
                battery.status = if status.is_charging {
                    "charging"
                } else {
                    "discharging"
                }
                .into();
                battery.estimated_remaining_minutes =
                    remaining_minutes(battery.level, self.config.discharge_rate);
            }
            None => *battery = BatteryInfo::default(),
        }
    }

    /// Publish the current simulated level, then step it down (wrapping).
    fn drain_simulated(&self, state: &mut State) {
        let level = state.sim_level;
        let battery = &mut state.payload.state.battery;
        battery.level = level;
        battery.status = "discharging".into();
        battery.estimated_remaining_minutes = remaining_minutes(level, self.config.discharge_rate);
        state.sim_level = if level <= 0 { 100 } else { level - 1 };
    }

    // ── Periodic work ────────────────────────────────────────────────

    fn refresh_uptime(&self) {
        let mut state = self.state.write().expect("monitor state lock poisoned");
        if state.payload.state.connection.is_active() {
            state.payload.state.session_uptime = format_uptime(state.session_start.elapsed());
        }
    }

    fn log_battery(&self) {
        let level = {
            let state = self.read();
            if !state.payload.state.connection.is_active() {
                return;
            }
            state.payload.state.battery.level
        };
        if let Err(e) = self.store.log_battery(level, "periodic_check") {
            tracing::warn!(error = %e, "Failed to record battery level");
        }
    }

    fn simulation_tick(&self) {
        let mut state = self.state.write().expect("monitor state lock poisoned");
        if state.payload.state.connection == ConnectionStatus::Simulated {
            self.drain_simulated(&mut state);
        }
    }
}

/// Call and mute flags flip on every matching press.
fn toggle_on_press(state: &mut State, fx: &mut Effects, button: ButtonId) {
    let s = &mut state.payload;
    match button {
        ButtonId::Mute => {
            s.state.is_muted = !s.state.is_muted;
            s.events.last_button_pressed = "mute_toggle".into();
            fx.log.push(("button", "Mute toggled".into()));
        }
        ButtonId::HookSwitch | ButtonId::Flash => {
            s.state.is_in_call = !s.state.is_in_call;
            s.events.last_button_pressed = "hook_switch".into();
            fx.log.push(("button", "Hook switch toggled".into()));
        }
        other => {
            s.events.last_button_pressed = other.to_string();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
