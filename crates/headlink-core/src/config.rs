// ── Runtime agent configuration ──
//
// What the agent needs to run, already resolved. Core never reads the
// configuration file; `headlink-config` builds these structs and hands
// them in.

use std::path::PathBuf;
use std::time::Duration;

use headlink_api::RealtimeConfig;
use headlink_api::transport::TransportConfig;

use crate::device::DeviceConfig;
use crate::monitor::MonitorConfig;
use crate::whitelist::DEFAULT_ENFORCE_INTERVAL;

pub const WHITELIST_FILE: &str = "allowed_devices.json";
pub const KEYMAP_FILE: &str = "keymap.json";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub device: DeviceConfig,
    pub monitor: MonitorConfig,
    /// `None` runs without a realtime channel; `socket_emit` actions then fail.
    pub realtime: Option<RealtimeConfig>,
    /// Used by `api_call` actions.
    pub http: TransportConfig,
    pub whitelist_path: PathBuf,
    pub keymap_path: PathBuf,
    pub enforce_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            monitor: MonitorConfig::default(),
            realtime: None,
            http: TransportConfig::default(),
            whitelist_path: PathBuf::from(WHITELIST_FILE),
            keymap_path: PathBuf::from(KEYMAP_FILE),
            enforce_interval: DEFAULT_ENFORCE_INTERVAL,
        }
    }
}
