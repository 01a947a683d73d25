//! A real agent connected to a real server over a WebSocket, with tmux
//! replaced by a scripted runner on the agent side.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{start_server, wait_until, window_line, FakeRunner, Outcome};
use tmuxdeck::api::{self, AppState};
use tmuxdeck::bridge::agent::{Agent, AgentConfig};
use tmuxdeck::bridge::BridgeRegistry;
use tmuxdeck::config::DeckConfig;
use tmuxdeck::directory::Directory;
use tmuxdeck::render::{CellFont, Renderer};
use tmuxdeck::session::session_id;
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "bridge-secret";

struct Harness {
    base: String,
    ws_url: String,
    registry: BridgeRegistry,
    http: reqwest::Client,
}

/// A server with only bridge sources enabled.
async fn start_deck() -> Harness {
    let mut config = DeckConfig::default();
    config.local.enabled = false;
    config.docker.enabled = false;
    config.bridge.tokens = vec![TOKEN.to_string()];
    config.bridge.request_timeout_secs = 5;

    let server_runner = FakeRunner::new();
    let directory = Directory::new(Arc::new(config), server_runner, BridgeRegistry::new());
    let renderer = Renderer::with_font(&Default::default(), CellFont::builtin());
    let state = AppState::new(directory, renderer);
    let registry = state.registry.clone();
    let addr = start_server(api::router(state)).await;

    Harness {
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws/bridge"),
        registry,
        http: reqwest::Client::new(),
    }
}

fn agent_runner() -> Arc<FakeRunner> {
    let runner = FakeRunner::new();
    let windows = [
        window_line("main", 0, "editor", "vim", "attention"),
        window_line("main", 1, "shell", "zsh", "idle"),
    ]
    .concat();
    runner
        .stdout(&["list-windows", "-a"], &windows)
        .stdout(&["list-windows", "-t"], &windows)
        .stdout(&["capture-pane"], "\n\x1b[32mok\x1b[0m done\n")
        .stdout(&["display-message"], "24\n")
        .on(&["file"], Outcome::Missing);
    runner
}

fn spawn_agent(h: &Harness, name: &str, token: &str, runner: Arc<FakeRunner>) -> CancellationToken {
    let mut config = AgentConfig::new(&h.ws_url, token, name);
    config.report_interval = Duration::from_millis(100);
    let agent = Agent::new(config, runner);
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        let _ = agent.run(stop).await;
    });
    shutdown
}

#[tokio::test]
async fn agent_sessions_appear_in_listing() {
    let h = start_deck().await;
    let shutdown = spawn_agent(&h, "box", TOKEN, agent_runner());
    assert!(wait_until(|| h.registry.is_connected("box")).await);

    let sessions: serde_json::Value = h
        .http
        .get(format!("{}/api/v1/sessions", h.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["container_id"], "bridge:box");
    assert_eq!(sessions[0]["source"], "bridge");
    assert_eq!(sessions[0]["status"], "attention");
    assert_eq!(sessions[0]["id"], session_id("bridge:box", "main"));

    shutdown.cancel();
}

#[tokio::test]
async fn capture_and_keys_round_trip() {
    let h = start_deck().await;
    let runner = agent_runner();
    let shutdown = spawn_agent(&h, "box", TOKEN, runner.clone());
    assert!(wait_until(|| h.registry.is_connected("box")).await);
    let id = session_id("bridge:box", "main");

    let capture: serde_json::Value = h
        .http
        .get(format!("{}/api/v1/sessions/{id}/windows/0/capture?ansi=true", h.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(capture["content"], "\x1b[32mok\x1b[0m done\n");

    let status = h
        .http
        .post(format!("{}/api/v1/sessions/{id}/windows/1/keys", h.base))
        .json(&serde_json::json!({ "text": "ls", "enter": true }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NO_CONTENT);
    assert!(!runner.calls_with("send-keys").is_empty());

    let png = h
        .http
        .get(format!("{}/api/v1/sessions/{id}/windows/0/screenshot", h.base))
        .send()
        .await
        .unwrap();
    assert_eq!(png.status(), reqwest::StatusCode::OK);
    assert_eq!(png.headers()["content-type"], "image/png");

    shutdown.cancel();
}

#[tokio::test]
async fn file_read_through_bridge() {
    let h = start_deck().await;
    let shutdown = spawn_agent(&h, "box", TOKEN, agent_runner());
    assert!(wait_until(|| h.registry.is_connected("box")).await);

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("data.json");
    std::fs::write(&path, r#"{"a":1}"#).unwrap();

    let response = h
        .http
        .get(format!("{}/api/v1/containers/bridge:box/file", h.base))
        .query(&[("path", path.to_str().unwrap())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["x-file-category"], "text");
    assert_eq!(response.headers()["x-file-mime"], "application/json");
    assert_eq!(response.text().await.unwrap(), "{\n  \"a\": 1\n}");

    let missing = h
        .http
        .get(format!("{}/api/v1/containers/bridge:box/file", h.base))
        .query(&[("path", "/definitely/not/here.txt")])
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown.cancel();
}

#[tokio::test]
async fn session_reports_are_cached() {
    let h = start_deck().await;
    let shutdown = spawn_agent(&h, "box", TOKEN, agent_runner());
    assert!(wait_until(|| h.registry.last_report("box").is_some()).await);
    let report = h.registry.last_report("box").unwrap();
    assert_eq!(report[0].name, "main");
    assert_eq!(report[0].source.as_deref(), Some("local"));

    let bridges: serde_json::Value = h
        .http
        .get(format!("{}/api/v1/bridges", h.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bridges[0]["name"], "box");
    assert_eq!(bridges[0]["reported_sessions"], 1);

    shutdown.cancel();
}

#[tokio::test]
async fn wrong_token_is_never_registered() {
    let h = start_deck().await;
    let shutdown = spawn_agent(&h, "intruder", "wrong", agent_runner());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!h.registry.is_connected("intruder"));
    shutdown.cancel();
}

#[tokio::test]
async fn agent_shutdown_unregisters() {
    let h = start_deck().await;
    let shutdown = spawn_agent(&h, "box", TOKEN, agent_runner());
    assert!(wait_until(|| h.registry.is_connected("box")).await);

    shutdown.cancel();
    assert!(wait_until(|| !h.registry.is_connected("box")).await);

    let id = session_id("bridge:box", "main");
    let response = h
        .http
        .get(format!("{}/api/v1/sessions/{id}/windows", h.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}
