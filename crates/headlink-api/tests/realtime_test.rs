#![allow(clippy::unwrap_used)]
//
// Integration tests for `RealtimeClient` against an in-process websocket
// server speaking the `2`/`3` heartbeat and `42[...]` event framing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use headlink_api::{Error, RealtimeClient, RealtimeConfig, ReconnectConfig};

const WAIT: Duration = Duration::from_secs(5);

// ── Test server ─────────────────────────────────────────────────────

struct TestServer {
    url: Url,
    conns: mpsc::UnboundedReceiver<WebSocketStream<TcpStream>>,
    accepted: Arc<AtomicUsize>,
}

fn endpoint(addr: SocketAddr) -> Url {
    Url::parse(&format!("ws://{addr}/socket.io/?EIO=4&transport=websocket")).unwrap()
}

/// An address nothing listens on, for now.
async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Accept TCP connections forever. The first `handshakes` complete the
/// websocket upgrade; later ones are dropped before the handshake.
async fn spawn_server(handshakes: usize) -> TestServer {
    spawn_server_at("127.0.0.1:0".parse().unwrap(), handshakes).await
}

async fn spawn_server_at(addr: SocketAddr, handshakes: usize) -> TestServer {
    let listener = TcpListener::bind(addr).await.unwrap();
    let url = endpoint(listener.local_addr().unwrap());

    let (tx, conns) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n >= handshakes {
                drop(tcp);
                continue;
            }
            if let Ok(ws) = tokio_tungstenite::accept_async(tcp).await {
                let _ = tx.send(ws);
            }
        }
    });

    TestServer {
        url,
        conns,
        accepted,
    }
}

impl TestServer {
    async fn next_conn(&mut self) -> WebSocketStream<TcpStream> {
        timeout(WAIT, self.conns.recv()).await.unwrap().unwrap()
    }
}

fn config(url: Url) -> RealtimeConfig {
    RealtimeConfig {
        url,
        token: SecretString::from("tok-1".to_owned()),
        extension: "2001".into(),
        handshake_timeout: WAIT,
        reconnect: ReconnectConfig {
            interval: Duration::from_millis(20),
            max_delay: Duration::from_millis(20),
            max_attempts: 3,
        },
    }
}

fn track_connection(client: &RealtimeClient) -> mpsc::UnboundedReceiver<bool> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_connection_change(move |up| {
        let _ = tx.send(up);
    });
    rx
}

/// Accept TCP connections and hold them open without ever answering the
/// websocket upgrade.
async fn spawn_silent_server() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = endpoint(listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });
    url
}

fn fixed_retry(interval: Duration, max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        interval,
        max_delay: interval,
        max_attempts,
    }
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn next_text(conn: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match timeout(WAIT, conn.next()).await.unwrap().unwrap().unwrap() {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn connect_and_disconnect_report_state_once() {
    let mut server = spawn_server(usize::MAX).await;
    let client = RealtimeClient::new(config(server.url.clone()));
    let mut states = track_connection(&client);

    client.connect().await.unwrap();
    let _conn = server.next_conn().await;
    assert!(next(&mut states).await);
    assert!(client.is_connected());
    assert_eq!(client.reconnect_attempts().await, 0);

    assert!(matches!(
        client.connect().await,
        Err(Error::AlreadyConnected)
    ));

    client.disconnect().await;
    assert!(!next(&mut states).await);
    assert!(!client.is_connected());

    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(states.try_recv().is_err(), "second disconnect must not fire");
}

#[tokio::test]
async fn connect_again_after_disconnect() {
    let mut server = spawn_server(usize::MAX).await;
    let client = RealtimeClient::new(config(server.url.clone()));

    client.connect().await.unwrap();
    let _first = server.next_conn().await;
    client.disconnect().await;

    client.connect().await.unwrap();
    let mut second = server.next_conn().await;
    client.emit("probe", &json!({})).await.unwrap();
    assert_eq!(next_text(&mut second).await, r#"42["probe",{}]"#);
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let client = RealtimeClient::new(config(endpoint(free_addr().await)));
    assert!(matches!(
        client.connect().await,
        Err(Error::WebSocketConnect(_))
    ));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn handshake_gives_up_on_a_silent_server() {
    let mut config = config(spawn_silent_server().await);
    config.handshake_timeout = Duration::from_millis(200);
    let client = RealtimeClient::new(config);

    let result = timeout(WAIT, client.connect()).await.unwrap();
    assert!(
        matches!(&result, Err(Error::WebSocketConnect(msg)) if msg.contains("timed out")),
        "got {result:?}"
    );
    assert!(!client.is_connected());
}

#[tokio::test]
async fn disconnect_aborts_a_pending_handshake() {
    let client = RealtimeClient::new(config(spawn_silent_server().await));

    let dialing = client.clone();
    let pending = tokio::spawn(async move { dialing.connect().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Nothing that needs the session waits on the stalled dial.
    let quick = Duration::from_secs(1);
    assert_eq!(timeout(quick, client.reconnect_attempts()).await.unwrap(), 0);
    assert!(matches!(
        timeout(quick, client.emit_click("Mute")).await.unwrap(),
        Err(Error::NotConnected)
    ));
    timeout(quick, client.disconnect()).await.unwrap();

    let result = timeout(quick, pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::WebSocketConnect(_))));
    assert!(!client.is_connected());
}

// ── Framing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn heartbeat_probe_is_answered() {
    let mut server = spawn_server(usize::MAX).await;
    let client = RealtimeClient::new(config(server.url.clone()));
    client.connect().await.unwrap();
    let mut conn = server.next_conn().await;

    conn.send(Message::text("2")).await.unwrap();
    assert_eq!(next_text(&mut conn).await, "3");

    client.disconnect().await;
}

#[tokio::test]
async fn click_carries_extension_token_and_button() {
    let mut server = spawn_server(usize::MAX).await;
    let client = RealtimeClient::new(config(server.url.clone()));
    client.connect().await.unwrap();
    let mut conn = server.next_conn().await;

    client.emit_click("Mute").await.unwrap();

    let text = next_text(&mut conn).await;
    let body: Value = serde_json::from_str(text.strip_prefix("42").unwrap()).unwrap();
    assert_eq!(
        body,
        json!(["click", { "ramal": "2001", "token": "tok-1", "button": "Mute" }])
    );

    client.disconnect().await;
}

#[tokio::test]
async fn inbound_events_dispatch_in_arrival_order() {
    let mut server = spawn_server(usize::MAX).await;
    let client = RealtimeClient::new(config(server.url.clone()));

    let (tx, mut events) = mpsc::unbounded_channel::<String>();
    let car_tx = tx.clone();
    client.on_car_notification(move |has_car| {
        let _ = car_tx.send(format!("car:{has_car}"));
    });
    let answered_tx = tx.clone();
    client.on_call_answered(move |ext| {
        let _ = answered_tx.send(format!("answered:{ext}"));
    });
    client.on_internal_call(move |ext, has_car| {
        let _ = tx.send(format!("internal:{ext}:{has_car}"));
    });

    client.connect().await.unwrap();
    let mut conn = server.next_conn().await;

    for frame in [
        r#"42["notificar_carro",{"TemCarro":true}]"#,
        r#"42["unknown_event",{"x":1}]"#,
        "42{not json",
        r#"42["notificar_carro",{"wrong":"shape"}]"#,
        r#"42["ligacao_atendida",{"RamalQueAtendeu":"2002"}]"#,
        r#"42["ligacao_interna",{"RamalQueSolicitou":"3003","TemCarro":false}]"#,
    ] {
        conn.send(Message::text(frame)).await.unwrap();
    }

    assert_eq!(next(&mut events).await, "car:true");
    assert_eq!(next(&mut events).await, "answered:2002");
    assert_eq!(next(&mut events).await, "internal:3003:false");
    assert!(client.is_connected());

    client.disconnect().await;
}

#[tokio::test]
async fn later_registration_replaces_handler() {
    let mut server = spawn_server(usize::MAX).await;
    let client = RealtimeClient::new(config(server.url.clone()));

    let (first_tx, mut first) = mpsc::unbounded_channel::<bool>();
    client.on_car_notification(move |v| {
        let _ = first_tx.send(v);
    });
    let (second_tx, mut second) = mpsc::unbounded_channel::<bool>();
    client.on_car_notification(move |v| {
        let _ = second_tx.send(v);
    });

    client.connect().await.unwrap();
    let mut conn = server.next_conn().await;
    conn.send(Message::text(r#"42["notificar_carro",{"TemCarro":true}]"#))
        .await
        .unwrap();

    assert!(next(&mut second).await);
    assert!(first.try_recv().is_err());

    client.disconnect().await;
}

// ── Reconnection ────────────────────────────────────────────────────

#[tokio::test]
async fn reconnects_after_server_drop() {
    let mut server = spawn_server(usize::MAX).await;
    let client = RealtimeClient::new(config(server.url.clone()));
    let mut states = track_connection(&client);

    client.connect().await.unwrap();
    let first = server.next_conn().await;
    assert!(next(&mut states).await);

    drop(first);
    assert!(!next(&mut states).await);
    assert!(next(&mut states).await);

    let mut second = server.next_conn().await;
    assert!(client.is_connected());
    assert_eq!(client.reconnect_attempts().await, 0);

    client.emit_click("OffHook").await.unwrap();
    assert!(next_text(&mut second).await.contains("OffHook"));

    client.disconnect().await;
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let mut server = spawn_server(1).await;
    let client = RealtimeClient::new(config(server.url.clone()));
    let mut states = track_connection(&client);

    client.connect().await.unwrap();
    let conn = server.next_conn().await;
    assert!(next(&mut states).await);

    drop(conn);
    assert!(!next(&mut states).await);

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(!client.is_connected());
    assert_eq!(client.reconnect_attempts().await, 3);
    // One real connection plus three failed reconnects, then silence.
    assert_eq!(server.accepted.load(Ordering::SeqCst), 4);
    assert!(states.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_stops_pending_reconnect() {
    let mut server = spawn_server(1).await;
    let mut config = config(server.url.clone());
    config.reconnect.interval = Duration::from_millis(200);
    config.reconnect.max_delay = Duration::from_millis(200);
    let client = RealtimeClient::new(config);
    let mut states = track_connection(&client);

    client.connect().await.unwrap();
    let conn = server.next_conn().await;
    assert!(next(&mut states).await);

    drop(conn);
    assert!(!next(&mut states).await);

    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn connect_or_retry_recovers_once_the_server_appears() {
    let addr = free_addr().await;
    let mut config = config(endpoint(addr));
    config.reconnect = fixed_retry(Duration::from_millis(200), 5);
    let client = RealtimeClient::new(config);
    let mut states = track_connection(&client);

    client.connect_or_retry().await.unwrap();
    assert!(!client.is_connected());

    let mut server = spawn_server_at(addr, usize::MAX).await;
    let _conn = server.next_conn().await;
    assert!(next(&mut states).await);
    assert!(client.is_connected());
    assert_eq!(client.reconnect_attempts().await, 0);

    client.disconnect().await;
}

#[tokio::test]
async fn connect_or_retry_after_give_up_gets_a_fresh_budget() {
    let addr = free_addr().await;
    let mut config = config(endpoint(addr));
    config.reconnect = fixed_retry(Duration::from_millis(100), 2);
    let client = RealtimeClient::new(config);
    let mut states = track_connection(&client);

    client.connect_or_retry().await.unwrap();
    timeout(WAIT, async {
        while client.reconnect_attempts().await < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!client.is_connected());

    client.connect_or_retry().await.unwrap();
    let mut server = spawn_server_at(addr, usize::MAX).await;
    let _conn = server.next_conn().await;
    assert!(next(&mut states).await);
    assert_eq!(client.reconnect_attempts().await, 0);

    client.disconnect().await;
}

#[tokio::test]
async fn explicit_connect_during_pending_retry_ends_the_sequence() {
    let addr = free_addr().await;
    let mut config = config(endpoint(addr));
    config.reconnect = fixed_retry(Duration::from_secs(1), 5);
    let client = RealtimeClient::new(config);

    client.connect_or_retry().await.unwrap();
    let mut server = spawn_server_at(addr, usize::MAX).await;

    client.connect().await.unwrap();
    let _conn = server.next_conn().await;
    assert_eq!(client.reconnect_attempts().await, 0);

    // Past the pending retry: it must notice the live session and stop.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(client.is_connected());
    assert_eq!(client.reconnect_attempts().await, 0);
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);

    client.disconnect().await;
}
