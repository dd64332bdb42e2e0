//! Key map handlers.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use headlink_api::transport::TransportConfig;
use headlink_core::{Action, ActionKind, ButtonId, Executor, LogNotifier};

use crate::cli::{GlobalOpts, KeymapArgs, KeymapCommand, KeymapSetArgs};
use crate::error::CliError;
use crate::output;

use super::Location;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "Button")]
    button: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Details")]
    details: String,
}

#[derive(Serialize)]
struct Mapping {
    button: String,
    #[serde(flatten)]
    action: Action,
}

impl From<&Mapping> for MappingRow {
    fn from(m: &Mapping) -> Self {
        Self {
            button: m.button.clone(),
            action: m.action.action.to_string(),
            details: details(&m.action),
        }
    }
}

fn details(action: &Action) -> String {
    match action.action {
        ActionKind::ApiCall => {
            let method = if action.method.is_empty() { "GET" } else { action.method.as_str() };
            format!("{} {}", method.to_uppercase(), action.url)
        }
        ActionKind::Exec => action.cmd.clone(),
        ActionKind::SocketEmit if action.event.is_empty() => "(button name)".into(),
        ActionKind::SocketEmit => action.event.clone(),
        ActionKind::Notify if action.title.is_empty() => action.message.clone(),
        ActionKind::Notify => format!("{}: {}", action.title, action.message),
        ActionKind::PlaySound => action.sound.clone(),
        ActionKind::None => action.message.clone(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: KeymapArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let location = Location::resolve(global);
    let config = location.load()?;
    let path = config.files.keymap_path(&location.base_dir);
    let executor = Executor::open(&path, Arc::new(LogNotifier), &TransportConfig::default())?;

    let message = match args.command {
        KeymapCommand::Show => {
            let mappings: Vec<Mapping> = executor
                .key_map()
                .into_iter()
                .map(|(button, action)| Mapping { button, action })
                .collect();
            let out = output::render_list(
                &global.output,
                &mappings,
                |m| MappingRow::from(m),
                |m| format!("{}\t{}", m.button, m.action.action),
            )?;
            output::print_output(&out, global.quiet);
            return Ok(());
        }

        KeymapCommand::Set(set) => {
            let button = parse_button(&set.button)?;
            let action = build_action(set)?;
            let summary = format!("{button} -> {}", action.action);
            executor.set_action(&button, action);
            summary
        }

        KeymapCommand::Remove { button } => {
            if executor.remove_action(&button).is_none() {
                return Err(CliError::NotFound {
                    resource_type: "mapping".into(),
                    identifier: button,
                    list_command: "keymap show".into(),
                });
            }
            format!("Removed mapping for {button}")
        }
    };

    executor.save_key_map(&path)?;
    tracing::debug!(path = %path.display(), "key map saved");
    if !global.quiet {
        eprintln!("{message}");
    }
    Ok(())
}

/// Canonical button name; unknown names are rejected here even though
/// hand-edited files may carry them.
fn parse_button(name: &str) -> Result<String, CliError> {
    ButtonId::from_str(name)
        .map(|b| b.to_string())
        .map_err(|_| CliError::Validation {
            field: "button".into(),
            reason: format!("unknown button '{name}' (e.g. Mute, HookSwitch, OffHook, Flash)"),
        })
}

fn build_action(set: KeymapSetArgs) -> Result<Action, CliError> {
    let kind = ActionKind::parse(&set.action)?;
    let required = |value: Option<&str>, field: &str| {
        if value.is_none_or(str::is_empty) {
            Err(CliError::Validation {
                field: field.into(),
                reason: format!("--{field} is required for {kind}"),
            })
        } else {
            Ok(())
        }
    };

    match kind {
        ActionKind::ApiCall => {
            required(set.url.as_deref(), "url")?;
            if let Some(method) = &set.method {
                if !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("POST") {
                    return Err(CliError::Validation {
                        field: "method".into(),
                        reason: format!("unsupported HTTP method '{method}' (expected GET or POST)"),
                    });
                }
            }
        }
        ActionKind::Exec => required(set.cmd.as_deref(), "cmd")?,
        ActionKind::PlaySound => required(set.sound.as_deref(), "sound")?,
        ActionKind::Notify => required(set.message.as_deref(), "message")?,
        ActionKind::SocketEmit | ActionKind::None => {}
    }

    Ok(Action {
        url: set.url.unwrap_or_default(),
        method: set.method.map(|m| m.to_uppercase()).unwrap_or_default(),
        body: set.body.unwrap_or_default(),
        cmd: set.cmd.unwrap_or_default(),
        event: set.event.unwrap_or_default(),
        message: set.message.unwrap_or_default(),
        title: set.title.unwrap_or_default(),
        sound: set.sound.unwrap_or_default(),
        ..Action::new(kind)
    })
}
