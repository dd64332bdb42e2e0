// headlink-core: Device contract, telemetry monitor, access control and
// button actions for the headset agent.

pub mod actions;
pub mod agent;
pub mod config;
pub mod device;
pub mod error;
pub mod model;
pub mod monitor;
pub mod notify;
mod persist;
pub mod store;
pub mod whitelist;

// ── Primary re-exports ──────────────────────────────────────────────
pub use actions::{Action, ActionKind, ClickEmitter, Executor, KeyMap, default_key_map};
pub use agent::Agent;
pub use config::AgentConfig;
pub use device::{DeviceConfig, HeadsetTransport, SimulatedTransport};
pub use error::{CoreError, DeviceError};
pub use monitor::{Monitor, MonitorConfig, MonitorEvent, remaining_minutes};
pub use notify::{DesktopNotifier, LogNotifier, Notifier};
pub use store::{MemoryStore, TelemetryStore};
pub use whitelist::{AccessDecision, BlockMode, Whitelist, WhitelistConfig};

pub use model::{
    BatteryInfo, BatteryStatus, ButtonEvent, ButtonId, ConnectionStatus, DeviceEvent, DeviceInfo,
    TelemetryPayload,
};
