use thiserror::Error;

/// Top-level error type for the `headlink-api` crate.
///
/// Covers the realtime channel (websocket session lifecycle and framing)
/// and the HTTP transport used by outbound action calls.
/// `headlink-core` maps these into agent-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session lifecycle ───────────────────────────────────────────
    /// `connect()` was called while a session is already live.
    #[error("Realtime client is already connected")]
    AlreadyConnected,

    /// An emit was attempted without an active transport.
    #[error("Realtime client is not connected")]
    NotConnected,

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket handshake or read failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Writing a frame to the socket failed.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    // ── Framing ─────────────────────────────────────────────────────
    /// Event payload could not be serialized into a frame.
    #[error("Frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be built.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) | Self::WebSocketSend(_) => true,
            _ => false,
        }
    }
}
