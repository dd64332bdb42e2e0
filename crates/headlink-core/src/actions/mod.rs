// ── Button actions ──
//
// Key map model plus the executor that turns a pressed button into a
// remote emit, an HTTP call, a shell command, a notification or a sound.

pub mod executor;
pub mod keymap;

pub use executor::{ClickEmitter, DEFAULT_DEBOUNCE, Executor};
pub use keymap::{Action, ActionKind, KeyMap, default_key_map};
