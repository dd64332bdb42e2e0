// ── Device access control ──
//
// Serial-number allow-list with an optional soft block: unauthorized units
// stay attached but are muted with the ringer off, and a background task
// keeps re-applying the mute until the block is lifted.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::HeadsetTransport;
use crate::error::{CoreError, DeviceError};
use crate::persist;

pub const DEFAULT_ENFORCE_INTERVAL: Duration = Duration::from_secs(5);

/// How unauthorized devices are treated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlockMode {
    #[default]
    None,
    /// Force mute and ringer off.
    Soft,
    /// Only tell the user.
    Notify,
}

/// On-disk allow-list document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    pub enabled: bool,
    pub block_mode: BlockMode,
    pub allowed_serials: Vec<String>,
}

/// Outcome of `Whitelist::check_device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub should_block: bool,
}

/// The two corrective commands access control needs from a transport.
pub trait DeviceController: Send + Sync {
    fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError>;
    fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError>;
}

impl<T: HeadsetTransport + ?Sized> DeviceController for T {
    fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError> {
        HeadsetTransport::set_mute(self, id, mute)
    }

    fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError> {
        HeadsetTransport::set_ringer(self, id, ring)
    }
}

#[derive(Default)]
struct State {
    config: WhitelistConfig,
    blocked: BTreeSet<u16>,
}

impl State {
    fn permits(&self, serial: &str) -> bool {
        self.config.allowed_serials.is_empty()
            || self.config.allowed_serials.iter().any(|s| s == serial)
    }
}

struct Enforcement {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Whitelist {
    state: Arc<RwLock<State>>,
    enforcement: Mutex<Option<Enforcement>>,
    enforce_interval: Duration,
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::new(WhitelistConfig::default())
    }
}

impl Whitelist {
    pub fn new(config: WhitelistConfig) -> Self {
        let mut config = config;
        dedup_in_order(&mut config.allowed_serials);
        Self {
            state: Arc::new(RwLock::new(State {
                config,
                blocked: BTreeSet::new(),
            })),
            enforcement: Mutex::new(None),
            enforce_interval: DEFAULT_ENFORCE_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_enforce_interval(mut self, interval: Duration) -> Self {
        self.enforce_interval = interval;
        self
    }

    /// Load from `path`, falling back to a disabled, empty list when the
    /// file does not exist.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let whitelist = Self::default();
        match whitelist.load_config(path) {
            Ok(()) => Ok(whitelist),
            Err(e) if e.is_not_found() => {
                tracing::info!(path = %path.display(), "No allow-list file, access control disabled");
                Ok(whitelist)
            }
            Err(e) => Err(e),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().expect("whitelist lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().expect("whitelist lock poisoned")
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Replace the configuration with the contents of `path`.
    ///
    /// Blocked device ids are kept; they belong to the running session.
    pub fn load_config(&self, path: &Path) -> Result<(), CoreError> {
        let mut config: WhitelistConfig = persist::read_json(path)?;
        dedup_in_order(&mut config.allowed_serials);
        tracing::info!(
            serials = config.allowed_serials.len(),
            mode = %config.block_mode,
            "Allow-list loaded"
        );
        self.write().config = config;
        Ok(())
    }

    pub fn save_config(&self, path: &Path) -> Result<(), CoreError> {
        let config = self.config();
        persist::write_json(path, &config)
    }

    // ── Policy ───────────────────────────────────────────────────────

    /// An empty list means no restriction is configured.
    pub fn is_allowed(&self, serial: &str) -> bool {
        let state = self.read();
        !state.config.enabled || state.permits(serial)
    }

    pub fn check_device(&self, serial: &str) -> AccessDecision {
        let state = self.read();
        if !state.config.enabled {
            return AccessDecision {
                allowed: true,
                should_block: false,
            };
        }
        let allowed = state.permits(serial);
        AccessDecision {
            allowed,
            should_block: !allowed && state.config.block_mode == BlockMode::Soft,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.read().config.enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.write().config.enabled = enabled;
    }

    pub fn block_mode(&self) -> BlockMode {
        self.read().config.block_mode
    }

    pub fn set_block_mode(&self, mode: BlockMode) {
        self.write().config.block_mode = mode;
    }

    /// Returns `false` if the serial was already listed.
    pub fn add_serial(&self, serial: &str) -> bool {
        let mut state = self.write();
        if state.config.allowed_serials.iter().any(|s| s == serial) {
            return false;
        }
        state.config.allowed_serials.push(serial.to_owned());
        true
    }

    /// Returns `false` if the serial was not listed.
    pub fn remove_serial(&self, serial: &str) -> bool {
        let mut state = self.write();
        let before = state.config.allowed_serials.len();
        state.config.allowed_serials.retain(|s| s != serial);
        state.config.allowed_serials.len() != before
    }

    pub fn allowed_serials(&self) -> Vec<String> {
        self.read().config.allowed_serials.clone()
    }

    pub fn config(&self) -> WhitelistConfig {
        self.read().config.clone()
    }

    // ── Blocking ─────────────────────────────────────────────────────

    /// Mark `device_id` blocked and force mute on, ringer off.
    ///
    /// Command failures are logged, not returned: the id stays blocked and
    /// enforcement keeps retrying the mute.
    pub fn soft_block<C: DeviceController + ?Sized>(&self, controller: &C, device_id: u16) {
        self.write().blocked.insert(device_id);

        if let Err(e) = controller.set_mute(device_id, true) {
            tracing::warn!(device_id, error = %e, "Failed to mute blocked device");
        }
        if let Err(e) = controller.set_ringer(device_id, false) {
            tracing::warn!(device_id, error = %e, "Failed to silence blocked device ringer");
        }
        tracing::info!(device_id, "Soft block applied");
    }

    pub fn remove_block(&self, device_id: u16) -> bool {
        self.write().blocked.remove(&device_id)
    }

    pub fn is_blocked(&self, device_id: u16) -> bool {
        self.read().blocked.contains(&device_id)
    }

    pub fn blocked_devices(&self) -> Vec<u16> {
        self.read().blocked.iter().copied().collect()
    }

    // ── Enforcement loop ─────────────────────────────────────────────

    /// Re-apply mute to every blocked device once per interval.
    ///
    /// Starting again replaces a running loop. Must be called within a
    /// tokio runtime.
    pub fn start_enforcement<C>(&self, controller: Arc<C>)
    where
        C: DeviceController + ?Sized + 'static,
    {
        let cancel = CancellationToken::new();
        let state = Arc::clone(&self.state);
        let period = self.enforce_interval;
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => enforce(&state, controller.as_ref()),
                }
            }
            tracing::debug!("Soft-block enforcement stopped");
        });

        let previous = self
            .enforcement
            .lock()
            .expect("enforcement lock poisoned")
            .replace(Enforcement { cancel, task });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    /// Stop the loop and wait for it to exit. No-op when not running.
    pub async fn stop_enforcement(&self) {
        let running = self
            .enforcement
            .lock()
            .expect("enforcement lock poisoned")
            .take();
        if let Some(Enforcement { cancel, task }) = running {
            cancel.cancel();
            let _ = task.await;
        }
    }

    pub fn is_enforcing(&self) -> bool {
        self.enforcement
            .lock()
            .expect("enforcement lock poisoned")
            .is_some()
    }
}

fn enforce<C: DeviceController + ?Sized>(state: &RwLock<State>, controller: &C) {
    let blocked: Vec<u16> = state
        .read()
        .expect("whitelist lock poisoned")
        .blocked
        .iter()
        .copied()
        .collect();

    for device_id in blocked {
        if let Err(e) = controller.set_mute(device_id, true) {
            tracing::debug!(device_id, error = %e, "Soft-block mute not re-applied");
        }
    }
}

fn dedup_in_order(serials: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    serials.retain(|s| seen.insert(s.clone()));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::testing::ScriptedTransport;

    #[derive(Default)]
    struct RecordingController {
        calls: Mutex<Vec<(u16, &'static str, bool)>>,
    }

    impl RecordingController {
        fn calls(&self) -> Vec<(u16, &'static str, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DeviceController for RecordingController {
        fn set_mute(&self, id: u16, mute: bool) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push((id, "mute", mute));
            Ok(())
        }

        fn set_ringer(&self, id: u16, ring: bool) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push((id, "ringer", ring));
            Err(DeviceError::Unsupported {
                operation: "set_ringer",
            })
        }
    }

    fn enabled(mode: BlockMode, serials: &[&str]) -> Whitelist {
        Whitelist::new(WhitelistConfig {
            enabled: true,
            block_mode: mode,
            allowed_serials: serials.iter().map(|s| (*s).to_owned()).collect(),
        })
    }

    // ── Policy ───────────────────────────────────────────────────────

    #[test]
    fn fails_open_when_disabled_or_empty() {
        let disabled = Whitelist::new(WhitelistConfig {
            enabled: false,
            block_mode: BlockMode::Soft,
            allowed_serials: vec!["A".into()],
        });
        let empty = enabled(BlockMode::Soft, &[]);

        for serial in ["A", "B", ""] {
            assert!(disabled.is_allowed(serial));
            assert!(empty.is_allowed(serial));
            assert!(!disabled.check_device(serial).should_block);
            assert!(!empty.check_device(serial).should_block);
        }
    }

    #[test]
    fn should_block_only_in_soft_mode() {
        for mode in [BlockMode::None, BlockMode::Soft, BlockMode::Notify] {
            let list = enabled(mode, &["A"]);
            assert_eq!(
                list.check_device("A"),
                AccessDecision {
                    allowed: true,
                    should_block: false
                }
            );
            assert_eq!(
                list.check_device("B"),
                AccessDecision {
                    allowed: false,
                    should_block: mode == BlockMode::Soft,
                }
            );
            assert!(!list.is_allowed("B"));
        }
    }

    #[test]
    fn serials_have_no_duplicates() {
        let list = Whitelist::new(WhitelistConfig {
            enabled: true,
            block_mode: BlockMode::None,
            allowed_serials: vec!["A".into(), "B".into(), "A".into()],
        });
        assert_eq!(list.allowed_serials(), ["A", "B"]);

        assert!(!list.add_serial("B"));
        assert!(list.add_serial("C"));
        assert!(list.remove_serial("A"));
        assert!(!list.remove_serial("A"));
        assert_eq!(list.allowed_serials(), ["B", "C"]);
    }

    #[test]
    fn mode_strings() {
        assert_eq!(BlockMode::Notify.to_string(), "notify");
        assert_eq!("soft".parse::<BlockMode>().unwrap(), BlockMode::Soft);
        assert!("hard".parse::<BlockMode>().is_err());
    }

    // ── Persistence ──────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let list = Whitelist::open(&dir.path().join("allowed_devices.json")).unwrap();
        assert_eq!(list.config(), WhitelistConfig::default());
    }

    #[test]
    fn save_then_open_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("allowed_devices.json");

        let list = enabled(BlockMode::Notify, &["X1", "X2"]);
        list.save_config(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["block_mode"], "notify");
        assert_eq!(json["allowed_serials"][1], "X2");

        assert_eq!(Whitelist::open(&path).unwrap().config(), list.config());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowed_devices.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Whitelist::open(&path),
            Err(CoreError::Json { .. })
        ));
    }

    // ── Blocking ─────────────────────────────────────────────────────

    #[test]
    fn soft_block_is_idempotent_and_tolerates_failures() {
        let list = enabled(BlockMode::Soft, &["A"]);
        let controller = RecordingController::default();

        list.soft_block(&controller, 4);
        list.soft_block(&controller, 4);

        assert!(list.is_blocked(4));
        assert_eq!(list.blocked_devices(), [4]);
        assert_eq!(
            controller.calls(),
            [
                (4, "mute", true),
                (4, "ringer", false),
                (4, "mute", true),
                (4, "ringer", false)
            ]
        );

        assert!(list.remove_block(4));
        assert!(!list.is_blocked(4));
    }

    #[test]
    fn soft_block_through_a_transport() {
        let list = enabled(BlockMode::Soft, &["A"]);
        let transport = ScriptedTransport::default();
        transport.attach(ScriptedTransport::unit(2, "B"));

        list.soft_block(&transport, 2);
        assert_eq!(transport.calls(), ["set_mute(2,true)", "set_ringer(2,false)"]);
    }

    #[tokio::test(start_paused = true)]
    async fn enforcement_reapplies_mute_until_stopped() {
        let list = enabled(BlockMode::Soft, &["A"]);
        let controller = Arc::new(RecordingController::default());
        list.soft_block(controller.as_ref(), 7);

        list.start_enforcement(Arc::clone(&controller));
        assert!(list.is_enforcing());
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let mutes = |c: &RecordingController| c.calls().iter().filter(|c| c.1 == "mute").count();
        assert_eq!(mutes(&controller), 3);

        list.stop_enforcement().await;
        assert!(!list.is_enforcing());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(mutes(&controller), 3);
    }

    #[tokio::test]
    async fn stop_enforcement_before_start_and_twice() {
        let list = Whitelist::default();
        list.stop_enforcement().await;
        list.stop_enforcement().await;

        list.start_enforcement(Arc::new(RecordingController::default()));
        list.stop_enforcement().await;
        list.stop_enforcement().await;

        list.start_enforcement(Arc::new(RecordingController::default()));
        assert!(list.is_enforcing());
        list.stop_enforcement().await;
    }
}
