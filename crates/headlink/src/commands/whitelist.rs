//! Allowed-device list handlers.
//!
//! Edits `allowed_devices.json` in place. A running agent picks the
//! change up on its next start.

use serde::Serialize;
use tabled::Tabled;

use headlink_core::{BlockMode, Whitelist};

use crate::cli::{BlockModeArg, GlobalOpts, OutputFormat, WhitelistArgs, WhitelistCommand};
use crate::error::CliError;
use crate::output;

use super::Location;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SerialRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Serial")]
    serial: String,
}

#[derive(Serialize)]
struct Entry {
    index: usize,
    serial: String,
}

impl From<BlockModeArg> for BlockMode {
    fn from(arg: BlockModeArg) -> Self {
        match arg {
            BlockModeArg::None => BlockMode::None,
            BlockModeArg::Soft => BlockMode::Soft,
            BlockModeArg::Notify => BlockMode::Notify,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: WhitelistArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let location = Location::resolve(global);
    let path = location.load()?.files.whitelist_path(&location.base_dir);
    let whitelist = Whitelist::open(&path)?;

    let message = match args.command {
        WhitelistCommand::List => {
            let config = whitelist.config();
            let out = if matches!(global.output, OutputFormat::Json) {
                output::render_single(&global.output, &config, |_| String::new())?
            } else {
                let entries: Vec<Entry> = config
                    .allowed_serials
                    .iter()
                    .enumerate()
                    .map(|(i, serial)| Entry {
                        index: i + 1,
                        serial: serial.clone(),
                    })
                    .collect();
                let list = output::render_list(
                    &global.output,
                    &entries,
                    |e| SerialRow {
                        index: e.index,
                        serial: e.serial.clone(),
                    },
                    |e| e.serial.clone(),
                )?;
                if matches!(global.output, OutputFormat::Plain) {
                    list
                } else {
                    let state = if config.enabled { "enabled" } else { "disabled" };
                    format!("Whitelist {state}, block mode: {}\n{list}", config.block_mode)
                }
            };
            output::print_output(&out, global.quiet);
            return Ok(());
        }

        WhitelistCommand::Add { serial } => {
            let serial = serial.trim();
            if serial.is_empty() {
                return Err(CliError::Validation {
                    field: "serial".into(),
                    reason: "cannot be empty".into(),
                });
            }
            if whitelist.add_serial(serial) {
                format!("Allowed {serial}")
            } else {
                format!("{serial} is already allowed")
            }
        }

        WhitelistCommand::Remove { serial } => {
            if !whitelist.remove_serial(&serial) {
                return Err(CliError::NotFound {
                    resource_type: "serial".into(),
                    identifier: serial,
                    list_command: "whitelist list".into(),
                });
            }
            format!("Removed {serial}")
        }

        WhitelistCommand::Enable => {
            whitelist.set_enabled(true);
            "Whitelist enabled".to_owned()
        }

        WhitelistCommand::Disable => {
            whitelist.set_enabled(false);
            "Whitelist disabled".to_owned()
        }

        WhitelistCommand::Mode { mode } => {
            let mode = BlockMode::from(mode);
            whitelist.set_block_mode(mode);
            format!("Block mode set to {mode}")
        }
    };

    whitelist.save_config(&path)?;
    tracing::debug!(path = %path.display(), "whitelist saved");
    if !global.quiet {
        eprintln!("{message}");
    }
    Ok(())
}
