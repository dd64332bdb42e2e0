//! Persistent realtime channel to the call-center server.
//!
//! Maintains one websocket session speaking the framing described in
//! [`crate::frame`]: answers heartbeats, emits outbound events, and
//! dispatches recognized inbound events to registered handlers. When the
//! read loop fails the client tears the transport down and runs a bounded
//! reconnect sequence.
//!
//! # Example
//!
//! ```rust,ignore
//! use headlink_api::realtime::{RealtimeClient, RealtimeConfig};
//!
//! let client = RealtimeClient::new(RealtimeConfig::for_server("acc.local", 11967)?);
//! client.on_connection_change(|up| tracing::info!(up, "realtime link"));
//! client.on_car_notification(|has_car| tracing::info!(has_car, "car"));
//! client.connect().await?;
//! client.emit_click("Mute").await?;
//! client.disconnect().await;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::frame::{self, ClickPayload, Frame, Interpreted, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Bounded reconnection policy.
///
/// The delay before attempt `n` (1-based) is `interval * 2^(n-1)`, capped
/// at `max_delay`. With `max_delay == interval` the sequence sleeps a fixed
/// interval between tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 5s.
    pub interval: Duration,

    /// Upper bound on the delay. Default: 5s.
    pub max_delay: Duration,

    /// Attempts before the sequence gives up. Default: 10.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Delay to sleep before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.interval
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay.max(self.interval))
    }
}

// ── RealtimeConfig ───────────────────────────────────────────────────

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Connection settings for the realtime channel.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Full websocket endpoint, including the Engine.IO query string.
    pub url: Url,
    /// Authentication token sent with every click.
    pub token: SecretString,
    /// Extension (ramal) this agent reports as.
    pub extension: String,
    /// Upper bound on one websocket dial plus upgrade. Default: 45s.
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl RealtimeConfig {
    /// Build the standard `ws://host:port/socket.io/?EIO=4&transport=websocket`
    /// endpoint with empty credentials and the default timeouts.
    pub fn for_server(host: &str, port: u16) -> Result<Self, Error> {
        let mut url = Url::parse(&format!("ws://{host}:{port}/socket.io/"))?;
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        Ok(Self {
            url,
            token: SecretString::from(String::new()),
            extension: String::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        })
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

type ConnectionHandler = Arc<dyn Fn(bool) + Send + Sync>;
type CarNotificationHandler = Arc<dyn Fn(bool) + Send + Sync>;
type CallAnsweredHandler = Arc<dyn Fn(String) + Send + Sync>;
type InternalCallHandler = Arc<dyn Fn(String, bool) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    connection: Option<ConnectionHandler>,
    car_notification: Option<CarNotificationHandler>,
    call_answered: Option<CallAnsweredHandler>,
    internal_call: Option<InternalCallHandler>,
}

// ── Session ──────────────────────────────────────────────────────────

struct Session {
    sink: Option<SharedSink>,
    reader: Option<JoinHandle<()>>,
    /// Cancels the reader, any in-flight dial and any reconnect sequence
    /// of the current generation. Replaced, never reused, on `disconnect()`.
    cancel: CancellationToken,
    reconnect_attempts: u32,
}

// ── RealtimeClient ───────────────────────────────────────────────────

/// Handle to the realtime channel.
///
/// Cheaply cloneable via `Arc<Inner>`. Session state (transport handle,
/// reader task, reconnect counter) is guarded by one async mutex that is
/// never held across a dial; the handler table and configuration sit
/// behind their own read-mostly locks.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<RealtimeConfig>,
    handlers: RwLock<Handlers>,
    session: Mutex<Session>,
    /// Written only while `session` is held; readable without it.
    connected: AtomicBool,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                handlers: RwLock::new(Handlers::default()),
                session: Mutex::new(Session {
                    sink: None,
                    reader: None,
                    cancel: CancellationToken::new(),
                    reconnect_attempts: 0,
                }),
                connected: AtomicBool::new(false),
            }),
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the websocket and start the read loop.
    ///
    /// Resets the reconnect counter and fires the connection handler with
    /// `true`. Fails with [`Error::AlreadyConnected`] on a live session.
    ///
    /// The dial runs outside the session lock, bounded by
    /// [`RealtimeConfig::handshake_timeout`], and is abandoned as soon as
    /// [`disconnect`](Self::disconnect) is called.
    pub async fn connect(&self) -> Result<(), Error> {
        let cancel = {
            let session = self.inner.session.lock().await;
            if self.inner.is_connected() {
                return Err(Error::AlreadyConnected);
            }
            session.cancel.clone()
        };
        let ws = dial(&self.inner.config(), &cancel).await?;
        install(&self.inner, ws, &cancel).await
    }

    /// Like [`connect`](Self::connect), but a failed first attempt starts a
    /// fresh bounded reconnect sequence instead of returning the error.
    ///
    /// The sequence always gets the full attempt budget, even if an earlier
    /// one gave up.
    pub async fn connect_or_retry(&self) -> Result<(), Error> {
        match self.connect().await {
            Err(Error::AlreadyConnected) => Err(Error::AlreadyConnected),
            Err(e) => {
                tracing::warn!(error = %e, "Initial realtime connect failed, retrying in background");
                let cancel = {
                    let mut session = self.inner.session.lock().await;
                    session.reconnect_attempts = 0;
                    session.cancel.clone()
                };
                tokio::spawn(reconnect(Arc::clone(&self.inner), cancel));
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Close the session and stop any reconnect sequence.
    ///
    /// Idempotent. Returns once the transport is closed and the read loop
    /// has exited; afterwards [`connect`](Self::connect) may be called again.
    pub async fn disconnect(&self) {
        let (sink, reader) = {
            let mut session = self.inner.session.lock().await;
            session.cancel.cancel();
            session.cancel = CancellationToken::new();

            let was_connected = self.inner.connected.swap(false, Ordering::SeqCst);
            let taken = (session.sink.take(), session.reader.take());
            if was_connected {
                self.inner.fire_connection(false);
                tracing::info!("Realtime client disconnected");
            }
            taken
        };

        if let Some(sink) = sink {
            if let Err(e) = sink.lock().await.close().await {
                tracing::debug!(error = %e, "Error closing realtime transport");
            }
        }
        if let Some(reader) = reader {
            let _ = reader.await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Reconnect attempts made since the last successful connection.
    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.session.lock().await.reconnect_attempts
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Emit `42["event", payload]`.
    pub async fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> Result<(), Error> {
        let sink = {
            let session = self.inner.session.lock().await;
            if !self.inner.is_connected() {
                return Err(Error::NotConnected);
            }
            session.sink.clone().ok_or(Error::NotConnected)?
        };

        let text = frame::encode_event(event, payload)?;
        tracing::debug!(event, "Emitting realtime event");
        send_text(&sink, text).await
    }

    /// Emit a `click` for `button` on behalf of the configured extension.
    pub async fn emit_click(&self, button: &str) -> Result<(), Error> {
        let payload = {
            let config = self.inner.config();
            ClickPayload {
                extension: config.extension.clone(),
                token: config.token.expose_secret().to_owned(),
                button: button.to_owned(),
            }
        };
        self.emit(frame::EVENT_CLICK, &payload).await
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Current configuration snapshot.
    pub fn config(&self) -> RealtimeConfig {
        self.inner.config()
    }

    /// Replace the configuration. Takes effect on the next connection.
    pub fn update_config(&self, config: RealtimeConfig) {
        *self.inner.config.write().expect("realtime config lock poisoned") = config;
    }

    // ── Handler registration (last registration wins) ────────────────

    pub fn on_connection_change(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.handlers_mut().connection = Some(Arc::new(handler));
    }

    pub fn on_car_notification(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.handlers_mut().car_notification = Some(Arc::new(handler));
    }

    pub fn on_call_answered(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        self.inner.handlers_mut().call_answered = Some(Arc::new(handler));
    }

    pub fn on_internal_call(&self, handler: impl Fn(String, bool) + Send + Sync + 'static) {
        self.inner.handlers_mut().internal_call = Some(Arc::new(handler));
    }
}

impl Inner {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn config(&self) -> RealtimeConfig {
        self.config.read().expect("realtime config lock poisoned").clone()
    }

    fn handlers(&self) -> std::sync::RwLockReadGuard<'_, Handlers> {
        self.handlers.read().expect("realtime handler lock poisoned")
    }

    fn handlers_mut(&self) -> std::sync::RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().expect("realtime handler lock poisoned")
    }

    fn fire_connection(&self, connected: bool) {
        let handler = self.handlers().connection.clone();
        if let Some(handler) = handler {
            handler(connected);
        }
    }

    fn dispatch(&self, name: &str, payload: Option<serde_json::Value>) {
        match ServerEvent::interpret(name, payload) {
            Interpreted::Known(ServerEvent::CarNotification { has_car }) => {
                tracing::debug!(has_car, "Car notification");
                let handler = self.handlers().car_notification.clone();
                if let Some(handler) = handler {
                    handler(has_car);
                }
            }
            Interpreted::Known(ServerEvent::CallAnswered { answered_by }) => {
                tracing::debug!(answered_by = %answered_by, "Call answered");
                let handler = self.handlers().call_answered.clone();
                if let Some(handler) = handler {
                    handler(answered_by);
                }
            }
            Interpreted::Known(ServerEvent::InternalCall {
                requested_by,
                has_car,
            }) => {
                tracing::debug!(requested_by = %requested_by, has_car, "Internal call");
                let handler = self.handlers().internal_call.clone();
                if let Some(handler) = handler {
                    handler(requested_by, has_car);
                }
            }
            Interpreted::BadPayload { name, reason } => {
                tracing::warn!(event = %name, reason = %reason, "Dropping event with malformed payload");
            }
            Interpreted::Unknown(name) => {
                tracing::info!(event = %name, "Unrecognized realtime event");
            }
        }
    }
}

// ── Session establishment ────────────────────────────────────────────

/// Open the websocket, giving up after the handshake timeout or when
/// `cancel` fires. Never touches the session.
async fn dial(config: &RealtimeConfig, cancel: &CancellationToken) -> Result<WsStream, Error> {
    tracing::info!(url = %config.url, "Connecting to realtime server");

    let handshake = tokio::time::timeout(
        config.handshake_timeout,
        tokio_tungstenite::connect_async(config.url.as_str()),
    );
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::WebSocketConnect("connect aborted by disconnect".into())),
        result = handshake => match result {
            Ok(Ok((ws_stream, _response))) => Ok(ws_stream),
            Ok(Err(e)) => Err(Error::WebSocketConnect(e.to_string())),
            Err(_) => Err(Error::WebSocketConnect(format!(
                "handshake timed out after {:?}",
                config.handshake_timeout
            ))),
        },
    }
}

/// Install a freshly dialed transport, spawn the read loop and fire the
/// connection handler.
///
/// The stream is dropped instead if `cancel` fired or another dial won
/// while this one was in flight.
async fn install(inner: &Arc<Inner>, ws_stream: WsStream, cancel: &CancellationToken) -> Result<(), Error> {
    let mut session = inner.session.lock().await;
    if cancel.is_cancelled() {
        return Err(Error::WebSocketConnect("connect aborted by disconnect".into()));
    }
    if inner.is_connected() {
        return Err(Error::AlreadyConnected);
    }

    let (sink, stream) = ws_stream.split();
    let sink: SharedSink = Arc::new(Mutex::new(sink));

    session.sink = Some(Arc::clone(&sink));
    session.reconnect_attempts = 0;
    inner.connected.store(true, Ordering::SeqCst);
    session.reader = Some(tokio::spawn(read_loop(
        Arc::clone(inner),
        stream,
        sink,
        cancel.clone(),
    )));

    // Under the lock, so a read loop that fails at once reports `false` after this.
    inner.fire_connection(true);
    tracing::info!("Realtime client connected");
    Ok(())
}

async fn send_text(sink: &SharedSink, text: String) -> Result<(), Error> {
    sink.lock()
        .await
        .send(Message::text(text))
        .await
        .map_err(|e| Error::WebSocketSend(e.to_string()))
}

// ── Read loop ────────────────────────────────────────────────────────

/// Read frames until the transport fails or `cancel` fires.
///
/// Handlers run inline, so they observe events in arrival order.
async fn read_loop(
    inner: Arc<Inner>,
    mut stream: SplitStream<WsStream>,
    sink: SharedSink,
    cancel: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match frame::decode(text.as_str()) {
                    Frame::Ping => {
                        if let Err(e) = send_text(&sink, frame::HEARTBEAT_REPLY.to_owned()).await {
                            tracing::warn!(error = %e, "Failed to answer heartbeat");
                        }
                    }
                    Frame::Event { name, payload } => inner.dispatch(&name, payload),
                    Frame::Ignored => tracing::trace!(frame = %text.as_str(), "Ignoring frame"),
                },
                Some(Ok(Message::Close(close))) => {
                    break close.map_or_else(
                        || "close frame".to_owned(),
                        |cf| format!("close frame (code {}): {}", cf.code, cf.reason),
                    );
                }
                // Binary, ping, pong: tungstenite answers pings itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_owned(),
            }
        }
    };

    tracing::warn!(reason = %reason, "Realtime read loop ended");
    handle_disconnect(&inner, &cancel).await;
}

/// Drop the failed transport, report `false`, and start reconnecting.
async fn handle_disconnect(inner: &Arc<Inner>, cancel: &CancellationToken) {
    let mut session = inner.session.lock().await;
    if cancel.is_cancelled() {
        // `disconnect()` got here first.
        return;
    }

    inner.connected.store(false, Ordering::SeqCst);
    session.reader = None;
    let sink = session.sink.take();
    inner.fire_connection(false);
    drop(session);

    if let Some(sink) = sink {
        let _ = sink.lock().await.close().await;
    }
    tokio::spawn(reconnect(Arc::clone(inner), cancel.clone()));
}

/// Bounded reconnect sequence.
///
/// Increments the attempt counter before each try and gives up silently
/// once `max_attempts` is reached; the connection handler stays at `false`.
/// Stops without counting as soon as a session is live or `cancel` fires.
///
/// Boxed because the read loop it restarts spawns it again.
fn reconnect(
    inner: Arc<Inner>,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let config = inner.config();
        let policy = &config.reconnect;

        loop {
            let attempt = {
                let mut session = inner.session.lock().await;
                if cancel.is_cancelled() || inner.is_connected() {
                    return;
                }
                if session.reconnect_attempts >= policy.max_attempts {
                    tracing::error!(
                        max_attempts = policy.max_attempts,
                        "Realtime reconnection limit reached, giving up"
                    );
                    return;
                }
                session.reconnect_attempts += 1;
                session.reconnect_attempts
            };

            let delay = policy.delay_for(attempt);
            tracing::info!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Waiting before reconnect"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if inner.is_connected() {
                return;
            }

            let result = match dial(&config, &cancel).await {
                Ok(ws_stream) => install(&inner, ws_stream, &cancel).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    tracing::info!(attempt, "Realtime client reconnected");
                    return;
                }
                Err(Error::AlreadyConnected) => return,
                Err(_) if cancel.is_cancelled() => return,
                Err(e) => tracing::warn!(error = %e, attempt, "Reconnect attempt failed"),
            }
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_is_fixed_interval() {
        let policy = ReconnectConfig::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(7), Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 10);
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = ReconnectConfig {
            interval: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn server_endpoint_carries_engine_query() {
        let config = RealtimeConfig::for_server("acc.local", 11967).unwrap();
        assert_eq!(
            config.url.as_str(),
            "ws://acc.local:11967/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(config.handshake_timeout, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn emit_without_session_is_not_connected() {
        let client = RealtimeClient::new(RealtimeConfig::for_server("127.0.0.1", 1).unwrap());
        assert!(matches!(
            client.emit_click("Mute").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let client = RealtimeClient::new(RealtimeConfig::for_server("127.0.0.1", 1).unwrap());
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        client.on_connection_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.disconnect().await;
        client.disconnect().await;

        assert!(!client.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
