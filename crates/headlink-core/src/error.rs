// ── Core error types ──
//
// Errors surfaced by the agent's domain layer. Device transports report
// `DeviceError`; everything above them (monitor, access control, action
// dispatch) reports `CoreError`. The `From<headlink_api::Error>` impl
// translates realtime/HTTP transport failures into domain variants.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a headset transport.
///
/// Every control operation returns one of these instead of panicking,
/// including on transports that cannot perform the action at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Transport is already running")]
    AlreadyRunning,

    #[error("Transport is not running")]
    NotRunning,

    #[error("Device not found: {id}")]
    DeviceNotFound { id: u16 },

    #[error("Operation not supported by this transport: {operation}")]
    Unsupported { operation: &'static str },

    #[error("Vendor SDK call failed with code {code}")]
    Sdk { code: i32 },

    #[error("Device I/O error: {0}")]
    Io(String),
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device errors ────────────────────────────────────────────────
    #[error(transparent)]
    Device(#[from] DeviceError),

    // ── Action dispatch ──────────────────────────────────────────────
    #[error("Realtime emitter is not configured")]
    EmitterNotConfigured,

    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Action '{action}' requires a '{parameter}' parameter")]
    MissingParameter {
        action: &'static str,
        parameter: &'static str,
    },

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("API call to {url} returned status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to start command '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("Notification failed: {0}")]
    Notification(String),

    // ── Realtime channel ─────────────────────────────────────────────
    #[error("Realtime channel is not connected")]
    NotConnected,

    #[error("Realtime channel error: {message}")]
    Realtime { message: String },

    #[error("HTTP request failed: {message}")]
    Http { message: String },

    // ── Persistence / configuration ──────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error: {0}")]
    Store(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<headlink_api::Error> for CoreError {
    fn from(err: headlink_api::Error) -> Self {
        use headlink_api::Error as Api;

        match err {
            Api::NotConnected => CoreError::NotConnected,
            Api::Transport(e) => CoreError::Http {
                message: e.to_string(),
            },
            Api::InvalidUrl(e) => CoreError::Http {
                message: format!("invalid URL: {e}"),
            },
            Api::Tls(message) => CoreError::Config { message },
            other @ (Api::AlreadyConnected
            | Api::WebSocketConnect(_)
            | Api::WebSocketSend(_)
            | Api::Encode(_)) => CoreError::Realtime {
                message: other.to_string(),
            },
        }
    }
}

impl CoreError {
    /// Returns `true` if the error came from a missing file, which callers
    /// loading optional configuration treat as "use defaults".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_not_connected_maps_to_domain_variant() {
        let err: CoreError = headlink_api::Error::NotConnected.into();
        assert!(matches!(err, CoreError::NotConnected));
    }

    #[test]
    fn websocket_failures_become_realtime_errors() {
        let err: CoreError = headlink_api::Error::WebSocketSend("broken pipe".into()).into();
        assert!(matches!(err, CoreError::Realtime { .. }));
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn not_found_detection() {
        let err = CoreError::Io {
            path: PathBuf::from("/missing.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.is_not_found());
        assert!(!CoreError::EmitterNotConfigured.is_not_found());
    }
}
