use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use headlink_api::RealtimeClient;
use headlink_api::transport::{ActionHttpClient, CallMethod, TransportConfig};
use tokio::process::Command;
use tokio::time::Instant;

use super::keymap::{Action, ActionKind, KeyMap, default_key_map};
use crate::error::CoreError;
use crate::notify::{APP_TITLE, Notifier};
use crate::persist;

/// Presses of the same button closer together than this run once.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

const BEEP_SOUND: &str = "beep";

/// Sink for `socket_emit` actions.
#[async_trait]
pub trait ClickEmitter: Send + Sync {
    async fn emit_click(&self, button: &str) -> Result<(), CoreError>;
}

#[async_trait]
impl ClickEmitter for RealtimeClient {
    async fn emit_click(&self, button: &str) -> Result<(), CoreError> {
        Ok(RealtimeClient::emit_click(self, button).await?)
    }
}

#[derive(Default)]
struct Mapping {
    key_map: KeyMap,
    emitter: Option<Arc<dyn ClickEmitter>>,
}

/// Runs the action mapped to a pressed button.
pub struct Executor {
    mapping: RwLock<Mapping>,
    last_run: Mutex<HashMap<String, Instant>>,
    debounce: Duration,
    http: ActionHttpClient,
    notifier: Arc<dyn Notifier>,
}

impl Executor {
    pub fn new(
        key_map: KeyMap,
        notifier: Arc<dyn Notifier>,
        transport: &TransportConfig,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            mapping: RwLock::new(Mapping {
                key_map,
                emitter: None,
            }),
            last_run: Mutex::new(HashMap::new()),
            debounce: DEFAULT_DEBOUNCE,
            http: ActionHttpClient::new(transport)?,
            notifier,
        })
    }

    /// Load the key map from `path`, or use the default map when the file
    /// does not exist.
    pub fn open(
        path: &Path,
        notifier: Arc<dyn Notifier>,
        transport: &TransportConfig,
    ) -> Result<Self, CoreError> {
        let key_map = match persist::read_json::<KeyMap>(path) {
            Ok(map) => map,
            Err(e) if e.is_not_found() => {
                tracing::info!(path = %path.display(), "No key map file, using defaults");
                default_key_map()
            }
            Err(e) => return Err(e),
        };
        Self::new(key_map, notifier, transport)
    }

    #[must_use]
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Mapping> {
        self.mapping.read().expect("key map lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Mapping> {
        self.mapping.write().expect("key map lock poisoned")
    }

    // ── Key map ──────────────────────────────────────────────────────

    pub fn load_key_map(&self, path: &Path) -> Result<(), CoreError> {
        let key_map: KeyMap = persist::read_json(path)?;
        tracing::info!(entries = key_map.len(), "Key map loaded");
        self.write().key_map = key_map;
        Ok(())
    }

    pub fn save_key_map(&self, path: &Path) -> Result<(), CoreError> {
        persist::write_json(path, &self.key_map())
    }

    pub fn key_map(&self) -> KeyMap {
        self.read().key_map.clone()
    }

    pub fn set_action(&self, button: &str, action: Action) {
        self.write().key_map.insert(button.to_owned(), action);
    }

    pub fn remove_action(&self, button: &str) -> Option<Action> {
        self.write().key_map.remove(button)
    }

    pub fn set_emitter(&self, emitter: Arc<dyn ClickEmitter>) {
        self.write().emitter = Some(emitter);
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Run the action for `button` if it was pressed.
    ///
    /// Releases, unmapped buttons and presses inside the debounce window
    /// succeed without doing anything.
    pub async fn execute(&self, button: &str, pressed: bool) -> Result<(), CoreError> {
        if !pressed {
            return Ok(());
        }

        let (action, emitter) = {
            let mapping = self.read();
            let Some(action) = mapping.key_map.get(button).cloned() else {
                tracing::debug!(button, "Button not mapped");
                return Ok(());
            };
            (action, mapping.emitter.clone())
        };

        if self.debounced(button) {
            tracing::debug!(button, "Press suppressed by debounce");
            return Ok(());
        }

        tracing::info!(button, action = %action.action, "Executing action");
        match action.action {
            ActionKind::ApiCall => self.api_call(&action).await,
            ActionKind::Exec => exec(&action.cmd),
            ActionKind::SocketEmit => socket_emit(&action, button, emitter.as_deref()).await,
            ActionKind::Notify => {
                let title = if action.title.is_empty() {
                    APP_TITLE
                } else {
                    action.title.as_str()
                };
                self.notifier.notify(title, &action.message)
            }
            ActionKind::PlaySound => self.play_sound(&action.sound),
            ActionKind::None => Ok(()),
        }
    }

    /// Record this press and report whether it falls inside the window.
    fn debounced(&self, button: &str) -> bool {
        let now = Instant::now();
        let mut last_run = self.last_run.lock().expect("debounce lock poisoned");
        if let Some(previous) = last_run.get(button) {
            if now.duration_since(*previous) < self.debounce {
                return true;
            }
        }
        last_run.insert(button.to_owned(), now);
        false
    }

    async fn api_call(&self, action: &Action) -> Result<(), CoreError> {
        if action.url.is_empty() {
            return Err(CoreError::MissingParameter {
                action: "api_call",
                parameter: "url",
            });
        }
        let method = CallMethod::parse(&action.method)
            .ok_or_else(|| CoreError::UnsupportedMethod(action.method.clone()))?;

        let status = self.http.call(method, &action.url, &action.body).await?;
        if status >= 400 {
            return Err(CoreError::HttpStatus {
                status,
                url: action.url.clone(),
            });
        }
        tracing::info!(url = %action.url, status, "API call completed");
        Ok(())
    }

    fn play_sound(&self, sound: &str) -> Result<(), CoreError> {
        match sound {
            "" => Err(CoreError::MissingParameter {
                action: "play_sound",
                parameter: "sound",
            }),
            BEEP_SOUND => self.notifier.beep(),
            path => self.notifier.play_file(path),
        }
    }
}

/// Start `cmd` in the platform shell without waiting for it.
fn exec(cmd: &str) -> Result<(), CoreError> {
    if cmd.is_empty() {
        return Err(CoreError::MissingParameter {
            action: "exec",
            parameter: "cmd",
        });
    }

    let (shell, flag) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };
    Command::new(shell)
        .args([flag, cmd])
        .spawn()
        .map_err(|e| CoreError::Spawn {
            command: cmd.to_owned(),
            reason: e.to_string(),
        })?;

    tracing::info!(cmd, "Command started");
    Ok(())
}

async fn socket_emit(
    action: &Action,
    button: &str,
    emitter: Option<&dyn ClickEmitter>,
) -> Result<(), CoreError> {
    let emitter = emitter.ok_or(CoreError::EmitterNotConfigured)?;
    let name = if action.event.is_empty() {
        button
    } else {
        action.event.as_str()
    };
    emitter.emit_click(name).await?;
    tracing::info!(name, "Click emitted");
    Ok(())
}
