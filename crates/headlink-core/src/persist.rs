// JSON documents edited by the operator (allow-list, key map).

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CoreError;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed, parent directories created as needed.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let io_err = |source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let body = serde_json::to_string_pretty(value).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, body).map_err(io_err)
}
