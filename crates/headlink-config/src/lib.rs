//! Configuration for the headlink agent.
//!
//! One TOML file (plus `HEADLINK_*` environment overrides), token
//! resolution (env + keyring + plaintext), and translation into the
//! runtime `headlink_core::AgentConfig`. Core never reads disk; this
//! crate is the only place that does for agent settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use headlink_api::transport::{TlsMode, TransportConfig};
use headlink_api::realtime::DEFAULT_HANDSHAKE_TIMEOUT;
use headlink_api::{RealtimeConfig, ReconnectConfig};
use headlink_core::config::{KEYMAP_FILE, WHITELIST_FILE};
use headlink_core::{AgentConfig, DeviceConfig, MonitorConfig};

const KEYRING_SERVICE: &str = "headlink";
const KEYRING_TOKEN: &str = "realtime-token";
const ENV_PREFIX: &str = "HEADLINK_";
const TOKEN_ENV: &str = "HEADLINK_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no realtime token configured")]
    NoToken,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceSection,

    #[serde(default)]
    pub realtime: RealtimeSection,

    #[serde(default)]
    pub operator: OperatorSection,

    #[serde(default)]
    pub files: FilesSection,

    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceSection {
    pub vendor_id: u16,
    pub poll_interval_secs: u64,
    /// Fall back to a synthetic headset when none is attached.
    pub simulation: bool,
    pub app_id: String,
    /// Battery drain in percent per minute, for the remaining-time estimate.
    pub discharge_rate_per_min: f64,
    pub simulation_tick_secs: u64,
    /// Seconds between soft-block re-applications.
    pub enforce_interval_secs: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        let device = DeviceConfig::default();
        let monitor = MonitorConfig::default();
        Self {
            vendor_id: device.vendor_id,
            poll_interval_secs: device.poll_interval.as_secs(),
            simulation: monitor.simulation,
            app_id: device.app_id,
            discharge_rate_per_min: monitor.discharge_rate,
            simulation_tick_secs: monitor.simulation_tick.as_secs(),
            enforce_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeSection {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Extension (ramal) reported in click events.
    pub extension: String,

    /// Plaintext token. The keyring or an env var is preferred.
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Upper bound on one websocket dial plus upgrade.
    pub handshake_timeout_secs: u64,

    pub reconnect_interval_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub max_reconnect_tries: u32,
}

impl Default for RealtimeSection {
    fn default() -> Self {
        let reconnect = ReconnectConfig::default();
        Self {
            enabled: false,
            host: String::new(),
            port: 11967,
            extension: String::new(),
            token: None,
            token_env: None,
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            reconnect_interval_secs: reconnect.interval.as_secs(),
            max_reconnect_delay_secs: reconnect.max_delay.as_secs(),
            max_reconnect_tries: reconnect.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperatorSection {
    pub name: String,
    pub color: String,
}

impl Default for OperatorSection {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        Self {
            name: monitor.default_operator,
            color: monitor.default_color,
        }
    }
}

/// Relative paths resolve against the config directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesSection {
    pub whitelist: PathBuf,
    pub keymap: PathBuf,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            whitelist: PathBuf::from(WHITELIST_FILE),
            keymap: PathBuf::from(KEYMAP_FILE),
        }
    }
}

impl FilesSection {
    pub fn whitelist_path(&self, base_dir: &Path) -> PathBuf {
        resolve_path(base_dir, &self.whitelist)
    }

    pub fn keymap_path(&self, base_dir: &Path) -> PathBuf {
        resolve_path(base_dir, &self.keymap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSection {
    pub timeout_secs: u64,
    /// Accept self-signed certificates on `api_call` endpoints.
    pub insecure: bool,
    pub ca_cert: Option<PathBuf>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            insecure: false,
            ca_cert: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Platform config directory (`~/.config/headlink` on Linux).
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("com", "headlink", "headlink").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("headlink");
            p
        },
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the canonical config file merged with the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if present), then `HEADLINK_*` variables.
/// Nested keys use a double underscore: `HEADLINK_REALTIME__HOST`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let rt = &config.realtime;
    if rt.enabled {
        if rt.host.trim().is_empty() {
            return Err(invalid("realtime.host", "required when realtime is enabled"));
        }
        if rt.port == 0 {
            return Err(invalid("realtime.port", "must be non-zero"));
        }
    }
    if rt.reconnect_interval_secs == 0 {
        return Err(invalid("realtime.reconnect_interval_secs", "must be at least 1"));
    }
    if rt.handshake_timeout_secs == 0 {
        return Err(invalid("realtime.handshake_timeout_secs", "must be at least 1"));
    }
    let rate = config.device.discharge_rate_per_min;
    if !rate.is_finite() || rate < 0.0 {
        return Err(invalid(
            "device.discharge_rate_per_min",
            format!("must be a non-negative number, got {rate}"),
        ));
    }
    for (field, secs) in [
        ("device.poll_interval_secs", config.device.poll_interval_secs),
        ("device.simulation_tick_secs", config.device.simulation_tick_secs),
        ("device.enforce_interval_secs", config.device.enforce_interval_secs),
    ] {
        if secs == 0 {
            return Err(invalid(field, "must be at least 1"));
        }
    }
    Ok(())
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the realtime token: the configured env var, `HEADLINK_TOKEN`,
/// the system keyring, then plaintext config.
pub fn resolve_token(section: &RealtimeSection) -> Result<SecretString, ConfigError> {
    let env_names = section.token_env.iter().map(String::as_str).chain([TOKEN_ENV]);
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    if let Some(ref token) = section.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken)
}

/// Store the realtime token in the system keyring.
pub fn store_token(token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN)?.set_password(token)?;
    Ok(())
}

// ── Translation to runtime config ───────────────────────────────────

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Realtime settings, or `None` when the channel is disabled.
pub fn realtime_config(section: &RealtimeSection) -> Result<Option<RealtimeConfig>, ConfigError> {
    if !section.enabled {
        return Ok(None);
    }

    let mut config = RealtimeConfig::for_server(section.host.trim(), section.port)
        .map_err(|e| invalid("realtime.host", e.to_string()))?;
    config.token = resolve_token(section)?;
    config.extension.clone_from(&section.extension);
    config.handshake_timeout = Duration::from_secs(section.handshake_timeout_secs);
    config.reconnect = ReconnectConfig {
        interval: Duration::from_secs(section.reconnect_interval_secs),
        max_delay: Duration::from_secs(
            section
                .max_reconnect_delay_secs
                .max(section.reconnect_interval_secs),
        ),
        max_attempts: section.max_reconnect_tries,
    };
    Ok(Some(config))
}

/// Build the runtime `AgentConfig`. Relative file paths resolve against
/// `base_dir`, normally [`config_dir`].
pub fn to_agent_config(config: &Config, base_dir: &Path) -> Result<AgentConfig, ConfigError> {
    let dev = &config.device;

    let tls = if config.http.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca) = config.http.ca_cert {
        TlsMode::CustomCa(resolve_path(base_dir, ca))
    } else {
        TlsMode::System
    };

    Ok(AgentConfig {
        device: DeviceConfig {
            app_id: dev.app_id.clone(),
            vendor_id: dev.vendor_id,
            poll_interval: Duration::from_secs(dev.poll_interval_secs),
        },
        monitor: MonitorConfig {
            simulation: dev.simulation,
            discharge_rate: dev.discharge_rate_per_min,
            simulation_tick: Duration::from_secs(dev.simulation_tick_secs),
            default_operator: config.operator.name.clone(),
            default_color: config.operator.color.clone(),
            ..MonitorConfig::default()
        },
        realtime: realtime_config(&config.realtime)?,
        http: TransportConfig {
            tls,
            timeout: Duration::from_secs(config.http.timeout_secs),
        },
        whitelist_path: config.files.whitelist_path(base_dir),
        keymap_path: config.files.keymap_path(base_dir),
        enforce_interval: Duration::from_secs(dev.enforce_interval_secs),
    })
}
