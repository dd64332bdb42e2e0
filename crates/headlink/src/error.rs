//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use headlink_config::ConfigError;
use headlink_core::{CoreError, DeviceError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const DEVICE: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Connection failed: {message}")]
    #[diagnostic(
        code(headlink::connection_failed),
        help("Check the realtime host/port or the api_call URL, then retry with -v for details.")
    )]
    ConnectionFailed { message: String },

    #[error("No realtime token configured")]
    #[diagnostic(
        code(headlink::no_token),
        help(
            "Store one with: headlink config set-token <TOKEN>\n\
             Or set the HEADLINK_TOKEN environment variable."
        )
    )]
    NoToken,

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(headlink::not_found),
        help("Run: headlink {list_command} to see what is configured")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Headset error: {0}")]
    #[diagnostic(
        code(headlink::device),
        help("Check that the headset or dongle is plugged in.")
    )]
    Device(DeviceError),

    #[error("Action failed: {message}")]
    #[diagnostic(code(headlink::action))]
    Action { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(headlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists")]
    #[diagnostic(
        code(headlink::config_exists),
        help("Use --force to overwrite: {path}")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(headlink::config),
        help("Run: headlink config path to locate the file in use")
    )]
    Config(Box<ConfigError>),

    #[error("Could not read or write {path}: {message}")]
    #[diagnostic(code(headlink::file))]
    File { path: String, message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(headlink::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(headlink::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NoToken => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Device(_) => exit_code::DEVICE,
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoToken => CliError::NoToken,
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Device(DeviceError::DeviceNotFound { id }) => CliError::NotFound {
                resource_type: "device".into(),
                identifier: id.to_string(),
                list_command: "run -v".into(),
            },

            CoreError::Device(e) => CliError::Device(e),

            CoreError::NotConnected => CliError::ConnectionFailed {
                message: "realtime channel is not connected".into(),
            },

            CoreError::Realtime { message } | CoreError::Http { message } => {
                CliError::ConnectionFailed { message }
            }

            CoreError::UnknownAction(kind) => CliError::Validation {
                field: "action".into(),
                reason: format!(
                    "unknown action type '{kind}' \
                     (expected api_call, exec, socket_emit, notify, play_sound or none)"
                ),
            },

            CoreError::UnsupportedMethod(method) => CliError::Validation {
                field: "method".into(),
                reason: format!("unsupported HTTP method '{method}' (expected GET or POST)"),
            },

            CoreError::MissingParameter { action, parameter } => CliError::Validation {
                field: parameter.into(),
                reason: format!("required by {action}"),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Io { path, source } => CliError::File {
                path: path.display().to_string(),
                message: source.to_string(),
            },

            CoreError::Json { path, source } => CliError::File {
                path: path.display().to_string(),
                message: format!("invalid JSON: {source}"),
            },

            other @ (CoreError::EmitterNotConfigured
            | CoreError::HttpStatus { .. }
            | CoreError::Spawn { .. }
            | CoreError::Notification(_)
            | CoreError::Store(_)) => CliError::Action {
                message: other.to_string(),
            },
        }
    }
}
