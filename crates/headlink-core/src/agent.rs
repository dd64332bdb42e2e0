// ── Agent wiring ──
//
// Connects the pieces: monitor events drive access control and button
// actions, the realtime channel is the emitter for `socket_emit`, and
// `shutdown()` tears everything down in dependency order.

use std::sync::Arc;

use headlink_api::RealtimeClient;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::{ClickEmitter, Executor};
use crate::config::AgentConfig;
use crate::device::HeadsetTransport;
use crate::error::{CoreError, DeviceError};
use crate::model::DeviceInfo;
use crate::monitor::{Monitor, MonitorEvent};
use crate::notify::{APP_TITLE, Notifier};
use crate::store::TelemetryStore;
use crate::whitelist::{BlockMode, Whitelist};

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// The assembled agent.
pub struct Agent {
    monitor: Monitor,
    whitelist: Arc<Whitelist>,
    executor: Arc<Executor>,
    realtime: Option<RealtimeClient>,
    transport: Arc<dyn HeadsetTransport>,
    notifier: Arc<dyn Notifier>,
    running: Mutex<Option<Running>>,
}

impl Agent {
    /// Build every component from `config`, reading the allow-list and key
    /// map files. Missing files fall back to defaults.
    pub fn new(
        config: &AgentConfig,
        transport: Arc<dyn HeadsetTransport>,
        store: Arc<dyn TelemetryStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, CoreError> {
        let whitelist =
            Whitelist::open(&config.whitelist_path)?.with_enforce_interval(config.enforce_interval);
        let executor = Executor::open(&config.keymap_path, Arc::clone(&notifier), &config.http)?;
        let monitor = Monitor::new(config.monitor.clone(), store, Arc::clone(&notifier));
        let realtime = config.realtime.clone().map(RealtimeClient::new);

        Ok(Self {
            monitor,
            whitelist: Arc::new(whitelist),
            executor: Arc::new(executor),
            realtime,
            transport,
            notifier,
            running: Mutex::new(None),
        })
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn whitelist(&self) -> &Arc<Whitelist> {
        &self.whitelist
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn realtime(&self) -> Option<&RealtimeClient> {
        self.realtime.as_ref()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start the monitor, the enforcement loop and the realtime channel.
    ///
    /// The realtime connection is made in the background; a failed first
    /// attempt enters the reconnect sequence.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(DeviceError::AlreadyRunning.into());
        }

        if let Some(client) = &self.realtime {
            register_realtime_handlers(client, &self.notifier);
            self.executor
                .set_emitter(Arc::new(client.clone()) as Arc<dyn ClickEmitter>);
        }

        let cancel = CancellationToken::new();
        let mut tasks = vec![tokio::spawn(dispatch(
            Dispatch {
                whitelist: Arc::clone(&self.whitelist),
                executor: Arc::clone(&self.executor),
                transport: Arc::clone(&self.transport),
                notifier: Arc::clone(&self.notifier),
            },
            self.monitor.subscribe(),
            cancel.clone(),
        ))];

        if let Err(e) = self.monitor.start(Arc::clone(&self.transport)) {
            cancel.cancel();
            for task in tasks {
                let _ = task.await;
            }
            return Err(e);
        }
        self.whitelist.start_enforcement(Arc::clone(&self.transport));

        if let Some(client) = &self.realtime {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = client.connect_or_retry().await {
                    tracing::warn!(error = %e, "Realtime connect skipped");
                }
            }));
        }

        *running = Some(Running { cancel, tasks });
        tracing::info!("Agent started");
        Ok(())
    }

    /// Disconnect, stop enforcement, then stop the monitor and its
    /// transport. No-op when not running.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        let Some(Running { cancel, tasks }) = self.running.lock().await.take() else {
            return Ok(());
        };

        cancel.cancel();
        for task in tasks {
            // The connect task may be stuck in a TCP handshake.
            task.abort();
            let _ = task.await;
        }
        if let Some(client) = &self.realtime {
            client.disconnect().await;
        }
        self.whitelist.stop_enforcement().await;
        self.monitor.stop().await?;

        tracing::info!("Agent stopped");
        Ok(())
    }
}

fn register_realtime_handlers(client: &RealtimeClient, notifier: &Arc<dyn Notifier>) {
    let n = Arc::clone(notifier);
    client.on_connection_change(move |connected| {
        let result = if connected {
            tracing::info!("Realtime server connected");
            n.notify(APP_TITLE, "Server connected")
        } else {
            tracing::warn!("Realtime server disconnected");
            n.alert(APP_TITLE, "Server connection lost")
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to raise notification");
        }
    });

    let n = Arc::clone(notifier);
    client.on_car_notification(move |has_car| {
        tracing::info!(has_car, "Car notification");
        if has_car {
            if let Err(e) = n.notify(APP_TITLE, "Car waiting") {
                tracing::warn!(error = %e, "Failed to raise notification");
            }
        }
    });

    client.on_call_answered(|extension| {
        tracing::info!(%extension, "Call answered");
    });

    let n = Arc::clone(notifier);
    client.on_internal_call(move |extension, has_car| {
        tracing::info!(%extension, has_car, "Internal call");
        if let Err(e) = n.notify(APP_TITLE, &format!("Internal call from {extension}")) {
            tracing::warn!(error = %e, "Failed to raise notification");
        }
    });
}

// ── Event dispatch ───────────────────────────────────────────────────

struct Dispatch {
    whitelist: Arc<Whitelist>,
    executor: Arc<Executor>,
    transport: Arc<dyn HeadsetTransport>,
    notifier: Arc<dyn Notifier>,
}

async fn dispatch(
    ctx: Dispatch,
    mut events: broadcast::Receiver<MonitorEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event) => ctx.handle(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Agent fell behind monitor events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl Dispatch {
    fn handle(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::DeviceAttached(device) => self.authorize(&device),
            MonitorEvent::DeviceDetached(device) => {
                if self.whitelist.remove_block(device.id) {
                    tracing::info!(device_id = device.id, "Blocked device detached");
                }
            }
            MonitorEvent::Button(event) => {
                if self.whitelist.is_blocked(event.device_id) {
                    tracing::debug!(device_id = event.device_id, "Ignoring button on blocked device");
                    return;
                }
                let executor = Arc::clone(&self.executor);
                let button = event.button.to_string();
                tokio::spawn(async move {
                    if let Err(e) = executor.execute(&button, event.pressed).await {
                        tracing::warn!(button = %button, error = %e, "Action failed");
                    }
                });
            }
            MonitorEvent::Battery { device_id, status } => {
                tracing::debug!(device_id, level = ?status.level, "Battery update");
            }
            MonitorEvent::StatusChanged(status) => {
                tracing::debug!(%status, "Monitor status changed");
            }
        }
    }

    fn authorize(&self, device: &DeviceInfo) {
        let decision = self.whitelist.check_device(&device.serial_number);
        if decision.allowed {
            return;
        }

        let serial = &device.serial_number;
        let message = match self.whitelist.block_mode() {
            BlockMode::Soft if decision.should_block => {
                self.whitelist.soft_block(self.transport.as_ref(), device.id);
                format!("Unauthorized headset blocked: {serial}")
            }
            BlockMode::Notify | BlockMode::Soft => {
                format!("Unauthorized headset connected: {serial}")
            }
            BlockMode::None => {
                tracing::warn!(device_id = device.id, %serial, "Unauthorized headset connected");
                return;
            }
        };
        tracing::warn!(device_id = device.id, %serial, "{message}");
        if let Err(e) = self.notifier.alert(APP_TITLE, &message) {
            tracing::warn!(error = %e, "Failed to raise notification");
        }
    }
}
