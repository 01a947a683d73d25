mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{window_line, FakeRunner, Outcome};
use tmuxdeck::backend::{Backend, SourceError};
use tmuxdeck::bridge::BridgeRegistry;
use tmuxdeck::config::DeckConfig;
use tmuxdeck::directory::Directory;
use tmuxdeck::tmux::CaptureOptions;

fn config() -> DeckConfig {
    let mut config = DeckConfig::default();
    config.local.host_tmux_socket = Some("/tmp/host.sock".into());
    config.docker.name_prefix = "tmuxdeck".into();
    config.bridge.request_timeout_secs = 1;
    config
}

/// Local has two sessions, the host server is down, one container works and
/// another fails; a third container does not match the name prefix.
fn scripted() -> Arc<FakeRunner> {
    let runner = FakeRunner::new();
    runner
        .stdout(
            &["ps"],
            "aaa111\ttmuxdeck-web\nbbb222\ttmuxdeck-db\nccc333\tother\n",
        )
        .stdout(
            &["aaa111", "list-windows"],
            &window_line("web", 0, "server", "node", "running"),
        )
        .on(
            &["bbb222", "list-windows"],
            Outcome::Fails("OCI runtime exec failed: tmux not found".into()),
        )
        .on(
            &["-S", "list-windows"],
            Outcome::Fails("no server running on /tmp/host.sock".into()),
        )
        .stdout(
            &["list-windows"],
            &[
                window_line("zeta", 0, "shell", "zsh", ""),
                window_line("alpha", 0, "shell", "bash", ""),
            ]
            .concat(),
        );
    runner
}

#[tokio::test]
async fn failing_sources_are_omitted() {
    let runner = scripted();
    let dir = Directory::new(Arc::new(config()), runner.clone(), BridgeRegistry::new());

    let sessions = dir.list_all().await;
    let listed: Vec<(&str, &str)> = sessions
        .iter()
        .map(|s| (s.container_id.as_str(), s.name.as_str()))
        .collect();
    assert_eq!(
        listed,
        vec![("aaa111", "web"), ("local", "alpha"), ("local", "zeta")]
    );
    assert_eq!(sessions[0].source, "container");
    assert!(runner.calls_with("ccc333").is_empty());
}

#[tokio::test]
async fn listing_is_deterministic() {
    let dir = Directory::new(Arc::new(config()), scripted(), BridgeRegistry::new());
    let first: Vec<String> = dir.list_all().await.into_iter().map(|s| s.id).collect();
    let second: Vec<String> = dir.list_all().await.into_iter().map(|s| s.id).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn missing_docker_binary_keeps_other_sources() {
    let runner = FakeRunner::new();
    runner
        .on(&["ps"], Outcome::Missing)
        .stdout(&["list-windows"], &window_line("main", 0, "shell", "zsh", ""));
    let mut config = DeckConfig::default();
    config.docker.name_prefix = String::new();
    let dir = Directory::new(Arc::new(config), runner, BridgeRegistry::new());

    let sessions = dir.list_all().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].container_id, "local");
}

#[tokio::test]
async fn silent_bridge_agent_times_out_without_blocking_others() {
    let registry = BridgeRegistry::new();
    let (conn, _outbound) = registry.new_connection("quiet");
    registry.register(conn);

    let mut config = config();
    config.docker.enabled = false;
    let dir = Directory::new(Arc::new(config), scripted(), registry);

    let started = Instant::now();
    let sessions = dir.list_all().await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(sessions.iter().all(|s| s.container_id == "local"));
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn operations_route_to_resolved_backend() {
    let runner = FakeRunner::new();
    runner.stdout(&["capture-pane"], "hello\n");
    let dir = Directory::new(Arc::new(config()), runner.clone(), BridgeRegistry::new());

    let backend = dir.resolve("aaa111").unwrap();
    assert!(matches!(backend, Backend::Container(_)));
    let text = backend
        .capture_pane("web", 2, CaptureOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "hello\n");

    let calls = runner.calls_with("capture-pane");
    assert_eq!(calls.len(), 1);
    assert_eq!(&calls[0][..4], &["docker", "exec", "aaa111", "tmux"]);
    assert!(calls[0].contains(&"=web:2".to_string()));
}

#[tokio::test]
async fn unknown_tmux_target_is_not_found() {
    let runner = FakeRunner::new();
    runner.on(
        &["list-windows"],
        Outcome::Fails("can't find session: =nope".into()),
    );
    let dir = Directory::new(Arc::new(config()), runner, BridgeRegistry::new());
    let err = dir
        .resolve("local")
        .unwrap()
        .list_windows("nope")
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::NotFound(_)));
}
