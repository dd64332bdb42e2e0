//! Config subcommand handlers.

use headlink_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::Location;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let location = Location::resolve(global);

    match args.command {
        ConfigCommand::Show => {
            let mut config = location.load()?;
            if config.realtime.token.is_some() {
                config.realtime.token = Some(REDACTED.into());
            }
            let out = match global.output {
                OutputFormat::Json => serde_json::to_string_pretty(&config)?,
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&config)?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&location.file.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if location.file.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: location.file.display().to_string(),
                });
            }
            headlink_config::save_config_to(&Config::default(), &location.file)?;
            if !global.quiet {
                eprintln!("Wrote {}", location.file.display());
            }
            Ok(())
        }

        ConfigCommand::SetToken { token } => {
            if token.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "cannot be empty".into(),
                });
            }
            headlink_config::store_token(token.trim())?;
            if !global.quiet {
                eprintln!("Token stored in the system keyring");
            }
            Ok(())
        }
    }
}
