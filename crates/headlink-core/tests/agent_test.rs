#![allow(clippy::unwrap_used)]
//
// End-to-end agent tests: simulated headset, real allow-list and key map
// files, and an in-process realtime server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use headlink_api::{RealtimeConfig, ReconnectConfig};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use headlink_core::{
    Action, Agent, AgentConfig, BlockMode, ButtonId, ConnectionStatus, HeadsetTransport,
    KeyMap, LogNotifier, MemoryStore, SimulatedTransport, WhitelistConfig,
};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn write_json(path: &Path, value: &impl serde::Serialize) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn agent(config: &AgentConfig, sim: &Arc<SimulatedTransport>) -> Agent {
    Agent::new(
        config,
        Arc::clone(sim) as Arc<dyn HeadsetTransport>,
        Arc::new(MemoryStore::new()),
        Arc::new(LogNotifier),
    )
    .unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

/// Accept one websocket session and forward its text frames.
async fn spawn_server() -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = tx.send(text.as_str().to_owned());
            }
        }
    });

    (port, rx)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unlisted_simulated_headset_is_soft_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig {
        whitelist_path: dir.path().join("allowed_devices.json"),
        keymap_path: dir.path().join("keymap.json"),
        ..AgentConfig::default()
    };
    write_json(
        &config.whitelist_path,
        &WhitelistConfig {
            enabled: true,
            block_mode: BlockMode::Soft,
            allowed_serials: vec!["ONLY-THIS-ONE".into()],
        },
    );

    let sim = Arc::new(SimulatedTransport::new(Duration::from_secs(60)));
    let agent = agent(&config, &sim);
    agent.start().await.unwrap();

    eventually(|| agent.whitelist().is_blocked(0)).await;
    eventually(|| sim.is_muted() && !sim.is_ringer_on()).await;
    assert_eq!(agent.monitor().status(), ConnectionStatus::Online);

    agent.shutdown().await.unwrap();
    assert!(!sim.is_running());
    assert_eq!(agent.monitor().status(), ConnectionStatus::Offline);
}

#[tokio::test]
async fn test_hook_press_emits_click_over_realtime() {
    let (port, mut frames) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();

    let mut realtime = RealtimeConfig::for_server("127.0.0.1", port).unwrap();
    realtime.token = SecretString::from("tok-9".to_owned());
    realtime.extension = "2001".into();
    realtime.reconnect = ReconnectConfig {
        interval: Duration::from_millis(50),
        max_delay: Duration::from_millis(50),
        max_attempts: 3,
    };
    let config = AgentConfig {
        whitelist_path: dir.path().join("allowed_devices.json"),
        keymap_path: dir.path().join("keymap.json"),
        realtime: Some(realtime),
        ..AgentConfig::default()
    };
    write_json(
        &config.keymap_path,
        &KeyMap::from([
            ("OffHook".to_owned(), Action::socket_emit("")),
            ("Flash".to_owned(), Action::socket_emit("click")),
        ]),
    );

    let sim = Arc::new(SimulatedTransport::new(Duration::from_secs(60)));
    let agent = agent(&config, &sim);
    agent.start().await.unwrap();

    let client = agent.realtime().unwrap().clone();
    eventually(|| client.is_connected()).await;

    sim.press(ButtonId::OffHook).unwrap();
    let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    let body: Value = serde_json::from_str(frame.strip_prefix("42").unwrap()).unwrap();
    assert_eq!(
        body,
        json!(["click", {"ramal": "2001", "token": "tok-9", "button": "OffHook"}])
    );

    sim.press(ButtonId::Flash).unwrap();
    let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert!(frame.contains(r#""button":"click""#), "{frame}");

    agent.shutdown().await.unwrap();
    assert!(!client.is_connected());
}
