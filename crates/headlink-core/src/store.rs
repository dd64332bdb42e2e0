// ── Settings and history store ──
//
// Persistence is an external collaborator: the agent only needs keyed
// settings plus two append-only logs. `MemoryStore` is the in-process
// implementation used by the binary and the tests.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const SETTING_OPERATOR_NAME: &str = "operator_name";
pub const SETTING_CUSTOM_COLOR: &str = "custom_color";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryRecord {
    pub at: DateTime<Utc>,
    pub level: i32,
    pub reason: String,
}

pub trait TelemetryStore: Send + Sync {
    fn setting(&self, key: &str) -> Option<String>;
    fn set_setting(&self, key: &str, value: &str) -> Result<(), CoreError>;
    fn log_event(&self, kind: &str, detail: &str) -> Result<(), CoreError>;
    fn log_battery(&self, level: i32, reason: &str) -> Result<(), CoreError>;

    fn setting_or(&self, key: &str, default: &str) -> String {
        self.setting(key).unwrap_or_else(|| default.to_owned())
    }
}

#[derive(Debug, Default)]
struct Tables {
    settings: HashMap<String, String>,
    events: Vec<EventRecord>,
    battery: Vec<BatteryRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed settings, e.g. from the configuration file.
    pub fn with_settings<I, K, V>(settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::default();
        store
            .write()
            .settings
            .extend(settings.into_iter().map(|(k, v)| (k.into(), v.into())));
        store
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().expect("store lock poisoned")
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.read().events.clone()
    }

    pub fn battery_log(&self) -> Vec<BatteryRecord> {
        self.read().battery.clone()
    }
}

impl TelemetryStore for MemoryStore {
    fn setting(&self, key: &str) -> Option<String> {
        self.read().settings.get(key).cloned()
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.write().settings.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn log_event(&self, kind: &str, detail: &str) -> Result<(), CoreError> {
        self.write().events.push(EventRecord {
            at: Utc::now(),
            kind: kind.to_owned(),
            detail: detail.to_owned(),
        });
        Ok(())
    }

    fn log_battery(&self, level: i32, reason: &str) -> Result<(), CoreError> {
        self.write().battery.push(BatteryRecord {
            at: Utc::now(),
            level,
            reason: reason.to_owned(),
        });
        Ok(())
    }
}
