//! tmuxdeck - one view over many tmux servers
//!
//! ## Modes
//!
//! **Server** (`tmuxdeck server`): serves the HTTP API over every configured
//! source and accepts bridge agents on `/ws/bridge`.
//!
//! **Bridge** (`tmuxdeck bridge`): runs on a remote machine, dials a server
//! and answers its requests against the local tmux servers and containers.
//!
//! **One-shot** (`list`, `capture`, `screenshot`): query the local sources
//! directly and exit.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser as ClapParser, Subcommand};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tmuxdeck::{
    api,
    backend::SourceError,
    bridge::{
        agent::{Agent, AgentConfig, AgentError},
        BridgeRegistry,
    },
    config::{self, ConfigError, DeckConfig},
    directory::Directory,
    exec::ProcessRunner,
    render::{RenderError, Renderer},
    session::{trim_leading_blank_lines, PaneStatus},
    tmux::CaptureOptions,
};

/// tmuxdeck - one view over many tmux servers
///
/// Lists, captures, screenshots and drives tmux sessions on this machine,
/// in Docker containers, and on remote machines connected through bridges.
#[derive(ClapParser, Debug)]
#[command(name = "tmuxdeck", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file
    #[arg(long, global = true, env = "TMUXDECK_CONFIG")]
    config: Option<PathBuf>,

    /// tmux socket of the host's server, exposed as the `host` source
    #[arg(long, global = true)]
    host_tmux_socket: Option<String>,

    /// Only list containers carrying this label
    #[arg(long, global = true)]
    docker_label: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API and accept bridge agents
    Server {
        /// Address to bind the HTTP/WebSocket server
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },

    /// List sessions across all local sources
    List {
        /// Only show sessions with this status (idle, running, attention)
        #[arg(long)]
        filter: Option<String>,
    },

    /// Print the contents of a window
    Capture {
        /// Session id as printed by `list`
        session_id: String,

        /// Window index
        #[arg(short = 'w', long, default_value_t = 0)]
        window: u32,

        /// Keep color and attribute escape sequences
        #[arg(long)]
        ansi: bool,

        /// Write to a file instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Render a window to a PNG
    Screenshot {
        /// Session id as printed by `list`
        session_id: String,

        /// Window index
        #[arg(short = 'w', long, default_value_t = 0)]
        window: u32,

        /// Output file
        #[arg(short = 'o', long, default_value = "screenshot.png")]
        output: PathBuf,
    },

    /// Connect this machine to a tmuxdeck server as a bridge agent
    Bridge {
        /// WebSocket URL of the server's bridge endpoint
        #[arg(long, env = "BRIDGE_URL")]
        url: String,

        /// Bridge token accepted by the server
        #[arg(long, env = "BRIDGE_TOKEN", hide_env_values = true)]
        token: String,

        /// Agent name (defaults to the hostname)
        #[arg(long, env = "BRIDGE_NAME")]
        name: Option<String>,

        /// Do not expose the default tmux server
        #[arg(long)]
        no_local: bool,

        /// Expose tmux sessions inside Docker containers
        #[arg(long)]
        docker: bool,

        /// Seconds between session reports
        #[arg(long, default_value_t = 5)]
        report_interval: u64,
    },
}

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("bridge error: {0}")]
    Agent(#[from] AgentError),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), DeckError> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Server { bind } => run_server(bind, config).await,
        Commands::List { filter } => run_list(config, filter).await,
        Commands::Capture {
            session_id,
            window,
            ansi,
            output,
        } => run_capture(config, session_id, window, ansi, output).await,
        Commands::Screenshot {
            session_id,
            window,
            output,
        } => run_screenshot(config, session_id, window, output).await,
        Commands::Bridge {
            url,
            token,
            name,
            no_local,
            docker,
            report_interval,
        } => {
            let mut agent = AgentConfig::new(url, token, config::resolve_agent_name(name.as_deref()));
            agent.local = config.local.enabled && !no_local;
            agent.host_tmux_socket = config.local.host_tmux_socket.clone();
            agent.docker = docker;
            agent.docker_bin = config.docker.docker_bin.clone();
            agent.docker_label = config.docker.label.clone();
            agent.report_interval = Duration::from_secs(report_interval.max(1));
            agent.max_file_size = config.limits.max_file_size;
            run_bridge(agent).await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tmuxdeck=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Config file (explicit path, else the default location), then CLI overrides.
fn load_config(cli: &Cli) -> Result<DeckConfig, DeckError> {
    let path = cli.config.clone().or_else(config::default_config_path);
    let mut config = match path {
        Some(path) => match DeckConfig::load(&path)? {
            Some(config) => {
                tracing::debug!(path = %path.display(), "loaded config");
                config
            }
            None if cli.config.is_some() => {
                return Err(ConfigError::Invalid(format!("{} does not exist", path.display())).into());
            }
            None => DeckConfig::default(),
        },
        None => DeckConfig::default(),
    };

    if let Some(socket) = &cli.host_tmux_socket {
        config.local.host_tmux_socket = Some(socket.clone());
    }
    if let Some(label) = &cli.docker_label {
        config.docker.label = Some(label.clone());
    }
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

fn directory(config: DeckConfig) -> Directory {
    Directory::new(Arc::new(config), ProcessRunner::shared(), BridgeRegistry::new())
}

// ── Server mode ────────────────────────────────────────────────────

async fn run_server(bind: SocketAddr, config: DeckConfig) -> Result<(), DeckError> {
    tracing::info!("tmuxdeck server starting");
    if config.bridge.tokens.is_empty() {
        tracing::warn!("no bridge tokens configured, bridge agents will be rejected");
    }

    let renderer = Renderer::new(&config.render);
    let state = api::AppState::new(directory(config), renderer);
    let registry = state.registry.clone();
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %bind, "HTTP/WS server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received Ctrl+C");
        })
        .await?;

    for name in registry.agent_names() {
        registry.unregister(&name);
    }
    tracing::info!("tmuxdeck server exiting");
    Ok(())
}

// ── Bridge agent mode ──────────────────────────────────────────────

async fn run_bridge(config: AgentConfig) -> Result<(), DeckError> {
    tracing::info!(agent = %config.name, url = %config.url, "tmuxdeck bridge starting");
    let agent = Agent::new(config, ProcessRunner::shared());

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C");
            ctrl_c.cancel();
        }
    });

    agent.run(shutdown).await?;
    tracing::info!("tmuxdeck bridge exiting");
    Ok(())
}

// ── One-shot commands ──────────────────────────────────────────────

async fn run_list(config: DeckConfig, filter: Option<String>) -> Result<(), DeckError> {
    let mut sessions = directory(config).list_all().await;
    if let Some(filter) = filter.as_deref() {
        let wanted = PaneStatus::parse(filter);
        sessions.retain(|s| s.status == wanted);
    }

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    let rows: Vec<(String, String, String, &str)> = sessions
        .iter()
        .map(|s| {
            (
                s.container_id.clone(),
                format!("{} ({})", s.name, s.id),
                s.windows.len().to_string(),
                s.status.as_str(),
            )
        })
        .collect();
    let w_container = column_width(rows.iter().map(|r| r.0.len()), "CONTAINER");
    let w_session = column_width(rows.iter().map(|r| r.1.len()), "SESSION (ID)");
    let w_windows = column_width(rows.iter().map(|r| r.2.len()), "WINDOWS");

    println!(
        "{:<w_container$}  {:<w_session$}  {:<w_windows$}  STATUS",
        "CONTAINER", "SESSION (ID)", "WINDOWS"
    );
    for (container, session, windows, status) in &rows {
        println!("{container:<w_container$}  {session:<w_session$}  {windows:<w_windows$}  {status}");
    }
    Ok(())
}

fn column_width(lengths: impl Iterator<Item = usize>, header: &str) -> usize {
    lengths.max().unwrap_or(0).max(header.len())
}

async fn run_capture(
    config: DeckConfig,
    session_id: String,
    window: u32,
    ansi: bool,
    output: Option<PathBuf>,
) -> Result<(), DeckError> {
    let (backend, target) = directory(config).resolve_session(&session_id)?;
    let options = CaptureOptions {
        ansi,
        max_lines: None,
    };
    let text = backend.capture_pane(&target.session, window, options).await?;
    let text = trim_leading_blank_lines(&text);
    match output {
        Some(path) => {
            tokio::fs::write(&path, text).await?;
            eprintln!("wrote {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

async fn run_screenshot(
    config: DeckConfig,
    session_id: String,
    window: u32,
    output: PathBuf,
) -> Result<(), DeckError> {
    let renderer = Renderer::new(&config.render);
    let (backend, target) = directory(config).resolve_session(&session_id)?;
    let options = CaptureOptions {
        ansi: true,
        max_lines: None,
    };
    let text = backend.capture_pane(&target.session, window, options).await?;
    let cols = backend.pane_width(&target.session, window).await?;
    let png = tokio::task::spawn_blocking(move || renderer.render_png(&text, cols as usize)).await??;
    tokio::fs::write(&output, png).await?;
    eprintln!("wrote {}", output.display());
    Ok(())
}
