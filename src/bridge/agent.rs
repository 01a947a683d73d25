//! The remote side of a bridge: dials the control plane, answers requests
//! against this machine's tmux servers and containers, and pushes periodic
//! session reports.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::protocol::{
    response_frame, AgentMessage, ErrorReply, Reply, Request, RequestFrame, ServerMessage,
    ALL_SOURCES, CORRELATION_FIELD,
};
use crate::backend::{list_containers, Backend, ContainerBackend, LocalBackend, SourceError};
use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::exec::SharedRunner;
use crate::session::SessionSummary;
use crate::source::{classify, validate_agent_name, Source, HOST_ID, LOCAL_ID};
use crate::task::{spawn_logged, TaskHandle};
use crate::tmux::{CaptureOptions, KeyInput};

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid agent name: {0}")]
    InvalidName(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// WebSocket URL of the control plane, e.g. `ws://deck:8000/ws/bridge`.
    pub url: String,
    pub token: String,
    pub name: String,
    /// Serve the default tmux server as `local`.
    pub local: bool,
    /// Serve the tmux server behind this socket as `host`.
    pub host_tmux_socket: Option<String>,
    /// Serve tmux inside Docker containers.
    pub docker: bool,
    pub docker_bin: String,
    pub docker_label: Option<String>,
    pub report_interval: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub max_file_size: u64,
}

impl AgentConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            name: name.into(),
            local: true,
            host_tmux_socket: None,
            docker: false,
            docker_bin: "docker".into(),
            docker_label: None,
            report_interval: Duration::from_secs(5),
            reconnect_min: Duration::from_secs(5),
            reconnect_max: Duration::from_secs(60),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// A bridge agent. Cheap to clone; clones share configuration.
#[derive(Clone)]
pub struct Agent {
    config: Arc<AgentConfig>,
    runner: SharedRunner,
}

impl Agent {
    pub fn new(config: AgentConfig, runner: SharedRunner) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Stay connected until `shutdown` fires, reconnecting with backoff.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), AgentError> {
        validate_agent_name(&self.config.name).map_err(AgentError::InvalidName)?;
        let mut backoff = Backoff::new(self.config.reconnect_min, self.config.reconnect_max);

        loop {
            let connected = tokio::select! {
                result = self.connect() => result,
                _ = shutdown.cancelled() => return Ok(()),
            };
            match connected {
                Ok(ws) => {
                    backoff.reset();
                    tracing::info!(url = %self.config.url, agent = %self.config.name, "bridge connected");
                    match self.serve(ws, &shutdown).await {
                        Ok(()) => tracing::info!(agent = %self.config.name, "bridge disconnected"),
                        Err(e) => tracing::warn!(agent = %self.config.name, error = %e, "bridge connection dropped"),
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.config.url, error = %e, "bridge connection failed");
                }
            }

            if shutdown.is_cancelled() {
                return Ok(());
            }
            let delay = backoff.next_delay();
            tracing::info!(delay_secs = delay.as_secs_f64(), "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
        }
    }

    /// Open the socket and complete the hello/welcome exchange.
    async fn connect(&self) -> Result<WsStream, AgentError> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.token))
            .map_err(|_| AgentError::Handshake("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (mut ws, _) = tokio_tungstenite::connect_async(request).await?;
        let hello = AgentMessage::Hello {
            name: self.config.name.clone(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        };
        ws.send(Message::Text(serde_json::to_string(&hello)?.into()))
            .await?;

        tokio::time::timeout(HANDSHAKE_TIMEOUT, await_welcome(&mut ws))
            .await
            .map_err(|_| AgentError::Handshake("no welcome from server".into()))??;
        Ok(ws)
    }

    async fn serve(&self, ws: WsStream, shutdown: &CancellationToken) -> Result<(), AgentError> {
        let (mut sink, mut stream) = ws.split();
        let (reply_tx, mut reply_rx) = mpsc::channel::<String>(64);

        let mut report = tokio::time::interval(self.config.report_interval);
        report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await;
        let mut reporting: Option<TaskHandle> = None;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.on_frame(text.as_str(), &reply_tx),
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                Some(frame) = reply_rx.recv() => {
                    sink.send(Message::Text(frame.into())).await?;
                }
                _ = report.tick() => {
                    self.start_report(&mut reporting, &reply_tx);
                }
                _ = ping.tick() => {
                    sink.send(Message::Ping(vec![].into())).await?;
                }
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Spawn a session report unless the previous one is still running.
    /// Returns whether a report was started.
    fn start_report(&self, previous: &mut Option<TaskHandle>, replies: &mpsc::Sender<String>) -> bool {
        if previous.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("previous session report still running, skipping");
            return false;
        }
        let agent = self.clone();
        let tx = replies.clone();
        *previous = Some(spawn_logged("session-report", async move {
            let sessions = agent.list_sessions(ALL_SOURCES).await?;
            let frame = serde_json::to_string(&AgentMessage::SessionReport { sessions })
                .map_err(|e| SourceError::Malformed(e.to_string()))?;
            let _ = tx.send(frame).await;
            Ok::<(), SourceError>(())
        }));
        true
    }

    /// Handle one inbound text frame. Requests run on their own task so
    /// slow ones do not hold up the rest.
    fn on_frame(&self, text: &str, replies: &mpsc::Sender<String>) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("ignoring malformed frame from server");
                return;
            }
        };
        let Some(id) = value.get(CORRELATION_FIELD).and_then(Value::as_u64) else {
            tracing::debug!(frame = %text, "ignoring uncorrelated frame");
            return;
        };

        let agent = self.clone();
        let tx = replies.clone();
        spawn_logged("bridge-request", async move {
            let result = match serde_json::from_value::<RequestFrame>(value) {
                Ok(frame) => {
                    tracing::debug!(id, request = frame.request.name(), source = %frame.source, "request");
                    agent.handle(&frame.source, frame.request).await
                }
                Err(e) => Err(SourceError::InvalidInput(format!("unrecognized request: {e}"))),
            };
            let result = result.map_err(|e| ErrorReply {
                error: e.to_string(),
                code: Some(e.code().to_string()),
            });
            tx.send(response_frame(id, result).to_string())
                .await
                .map_err(|_| "connection closed before reply was sent")
        })
        .detach();
    }

    /// Execute `request` against `source`.
    pub async fn handle(&self, source: &str, request: Request) -> Result<Reply, SourceError> {
        let reply = match request {
            Request::ListSessions => Reply::Sessions {
                sessions: self.list_sessions(source).await?,
            },
            Request::ListWindows { session } => Reply::Windows {
                windows: self.backend(source)?.list_windows(&session).await?,
            },
            Request::CapturePane {
                session,
                window,
                ansi,
                max_lines,
            } => Reply::Capture {
                text: self
                    .backend(source)?
                    .capture_pane(&session, window, CaptureOptions { ansi, max_lines })
                    .await?,
            },
            Request::PaneWidth { session, window } => Reply::Width {
                width: self.backend(source)?.pane_width(&session, window).await?,
            },
            Request::SendKeys {
                session,
                window,
                text,
                enter,
                submit,
            } => {
                let input = KeyInput {
                    text,
                    enter,
                    submit,
                };
                self.backend(source)?
                    .send_keys(&session, window, &input)
                    .await?;
                Reply::Ack { ok: true }
            }
            Request::FileRead { path } => {
                let content = self.backend(source)?.read_file(&path).await?;
                Reply::File {
                    data: STANDARD.encode(&content.data),
                    mime_type: content.mime,
                }
            }
        };
        Ok(reply)
    }

    /// Map an agent-side container identifier to a backend this agent serves.
    fn backend(&self, source: &str) -> Result<Backend, SourceError> {
        let config = &self.config;
        let unknown = || SourceError::NotFound(format!("source {source} on {}", config.name));
        match classify(source).ok_or_else(unknown)? {
            Source::Local { host: false } if config.local => Ok(Backend::Local(
                LocalBackend::new(false, None, self.runner.clone(), config.max_file_size),
            )),
            Source::Local { host: true } => {
                let socket = config.host_tmux_socket.as_deref().ok_or_else(unknown)?;
                Ok(Backend::Local(LocalBackend::new(
                    true,
                    Some(socket),
                    self.runner.clone(),
                    config.max_file_size,
                )))
            }
            Source::Container { id } if config.docker => Ok(Backend::Container(
                ContainerBackend::new(&id, &config.docker_bin, self.runner.clone(), config.max_file_size),
            )),
            Source::Bridge { .. } => Err(SourceError::InvalidInput(format!(
                "agents do not relay to other bridges: {source}"
            ))),
            _ => Err(unknown()),
        }
    }

    /// Sessions of one source, or of all of them for [`ALL_SOURCES`]. Each
    /// summary is tagged with its source.
    pub async fn list_sessions(&self, source: &str) -> Result<Vec<SessionSummary>, SourceError> {
        if source != ALL_SOURCES {
            return self.list_source(source.to_string()).await;
        }

        let mut sources: Vec<String> = Vec::new();
        if self.config.local {
            sources.push(LOCAL_ID.to_string());
        }
        if self.config.host_tmux_socket.is_some() {
            sources.push(HOST_ID.to_string());
        }
        if self.config.docker {
            match list_containers(
                &self.runner,
                &self.config.docker_bin,
                "",
                self.config.docker_label.as_deref(),
            )
            .await
            {
                Ok(ids) => sources.extend(ids),
                Err(e) => tracing::warn!(error = %e, "failed to list docker containers"),
            }
        }

        let listings: Vec<BoxFuture<'_, _>> = sources
            .into_iter()
            .map(|s| self.list_source(s).boxed())
            .collect();
        let mut sessions = Vec::new();
        for result in join_all(listings).await {
            match result {
                Ok(found) => sessions.extend(found),
                Err(e) => tracing::warn!(error = %e, "failed to list sessions"),
            }
        }
        Ok(sessions)
    }

    async fn list_source(&self, source: String) -> Result<Vec<SessionSummary>, SourceError> {
        let mut sessions = self.backend(&source)?.list_sessions().await?;
        for session in &mut sessions {
            session.source = Some(source.clone());
        }
        Ok(sessions)
    }
}

async fn await_welcome(ws: &mut WsStream) -> Result<(), AgentError> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                return match serde_json::from_str::<ServerMessage>(text.as_str()) {
                    Ok(ServerMessage::Welcome) => Ok(()),
                    Err(_) => Err(AgentError::Handshake(format!(
                        "unexpected first frame: {}",
                        text.as_str()
                    ))),
                };
            }
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.as_str().to_string()).unwrap_or_default();
                return Err(AgentError::Handshake(format!("server closed: {reason}")));
            }
            _ => {}
        }
    }
    Err(AgentError::Handshake("server closed".into()))
}
