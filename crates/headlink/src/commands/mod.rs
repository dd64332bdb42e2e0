//! Command handlers.

pub mod config_cmd;
pub mod decode;
pub mod keymap;
pub mod run;
pub mod whitelist;

use std::path::{Path, PathBuf};

use headlink_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Where the configuration lives for this invocation.
pub struct Location {
    pub file: PathBuf,
    /// Relative paths inside the file resolve against this directory.
    pub base_dir: PathBuf,
}

impl Location {
    pub fn resolve(global: &GlobalOpts) -> Self {
        match &global.config {
            Some(file) => Self {
                base_dir: file
                    .parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
                file: file.clone(),
            },
            None => Self {
                file: headlink_config::config_path(),
                base_dir: headlink_config::config_dir(),
            },
        }
    }

    pub fn load(&self) -> Result<Config, CliError> {
        Ok(headlink_config::load_config_from(&self.file)?)
    }
}
