//! Terminal backends: one contract over local tmux, tmux inside Docker
//! containers, and tmux on remote bridge agents.

mod bridge;
mod container;
mod local;
mod tmux_exec;

use std::time::Duration;

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::exec::ExecError;
use crate::session::{SessionSummary, Window};
use crate::tmux::{CaptureOptions, KeyInput};

pub use bridge::BridgeBackend;
pub use container::{list_containers, ContainerBackend};
pub use local::LocalBackend;
pub use tmux_exec::TmuxExec;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection lost")]
    ConnectionLost,

    #[error("too large: {0}")]
    TooLarge(String),

    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// Application-level failure reported by a bridge agent.
    #[error("{0}")]
    Remote(String),

    #[error(transparent)]
    Exec(ExecError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SourceError {
    /// Machine-readable kind, as sent in bridge error replies.
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::NotFound(_) => "not_found",
            SourceError::Unreachable(_) => "unreachable",
            SourceError::Timeout(_) => "timeout",
            SourceError::ConnectionLost => "connection_lost",
            SourceError::TooLarge(_) => "too_large",
            SourceError::Unsupported(_) => "unsupported",
            SourceError::Malformed(_) => "malformed",
            SourceError::Remote(_) => "remote",
            SourceError::Exec(_) => "exec",
            SourceError::InvalidInput(_) => "invalid_input",
        }
    }

    /// Rebuild an error from a bridge reply's message and code.
    ///
    /// Agents that predate error codes only send a message; the common
    /// not-found phrasings are recognized from the text.
    pub fn from_remote(message: String, code: Option<&str>) -> Self {
        match code {
            Some("not_found") => SourceError::NotFound(message),
            Some("too_large") => SourceError::TooLarge(message),
            Some("unsupported") => SourceError::Unsupported(message),
            Some("invalid_input") => SourceError::InvalidInput(message),
            Some("unreachable") => SourceError::Unreachable(message),
            Some("malformed") => SourceError::Malformed(message),
            Some(_) => SourceError::Remote(message),
            None => {
                let lower = message.to_ascii_lowercase();
                if lower.contains("not found") || lower.contains("no such file") {
                    SourceError::NotFound(message)
                } else {
                    SourceError::Remote(message)
                }
            }
        }
    }
}

impl From<BridgeError> for SourceError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Unreachable(agent) => {
                SourceError::Unreachable(format!("bridge agent {agent} is not connected"))
            }
            BridgeError::Timeout(d) => SourceError::Timeout(d),
            BridgeError::ConnectionLost => SourceError::ConnectionLost,
            BridgeError::Remote { message, code } => {
                SourceError::from_remote(message, code.as_deref())
            }
            BridgeError::Malformed(detail) => SourceError::Malformed(detail),
        }
    }
}

impl From<ExecError> for SourceError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Timeout(_, d) => SourceError::Timeout(d),
            ExecError::NotFound(program) => {
                SourceError::Unreachable(format!("{program} is not installed"))
            }
            other => SourceError::Exec(other),
        }
    }
}

/// Reject a payload of `len` bytes above `limit`.
pub(crate) fn check_size(what: &str, len: usize, limit: u64) -> Result<(), SourceError> {
    if len as u64 > limit {
        return Err(SourceError::TooLarge(format!(
            "{what} is {len} bytes, limit is {limit} bytes"
        )));
    }
    Ok(())
}

/// Raw file bytes plus their detected MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub data: Vec<u8>,
    pub mime: String,
}

/// A resolved source. Every variant honors the same contract.
#[derive(Debug, Clone)]
pub enum Backend {
    Local(LocalBackend),
    Container(ContainerBackend),
    Bridge(BridgeBackend),
}

impl Backend {
    /// The container identifier this backend was resolved from.
    pub fn container_id(&self) -> String {
        match self {
            Backend::Local(b) => b.container_id().to_string(),
            Backend::Container(b) => b.container_id().to_string(),
            Backend::Bridge(b) => b.container_id(),
        }
    }

    /// Source tag for listings (`local`, `host`, `container`, `bridge`).
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Local(b) => b.container_id(),
            Backend::Container(_) => "container",
            Backend::Bridge(_) => "bridge",
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SourceError> {
        match self {
            Backend::Local(b) => b.tmux().list_sessions().await,
            Backend::Container(b) => b.tmux().list_sessions().await,
            Backend::Bridge(b) => b.list_sessions().await,
        }
    }

    pub async fn list_windows(&self, session: &str) -> Result<Vec<Window>, SourceError> {
        match self {
            Backend::Local(b) => b.tmux().list_windows(session).await,
            Backend::Container(b) => b.tmux().list_windows(session).await,
            Backend::Bridge(b) => b.list_windows(session).await,
        }
    }

    pub async fn capture_pane(
        &self,
        session: &str,
        window: u32,
        options: CaptureOptions,
    ) -> Result<String, SourceError> {
        match self {
            Backend::Local(b) => b.tmux().capture_pane(session, window, options).await,
            Backend::Container(b) => b.tmux().capture_pane(session, window, options).await,
            Backend::Bridge(b) => b.capture_pane(session, window, options).await,
        }
    }

    pub async fn pane_width(&self, session: &str, window: u32) -> Result<u16, SourceError> {
        match self {
            Backend::Local(b) => b.tmux().pane_width(session, window).await,
            Backend::Container(b) => b.tmux().pane_width(session, window).await,
            Backend::Bridge(b) => b.pane_width(session, window).await,
        }
    }

    pub async fn send_keys(
        &self,
        session: &str,
        window: u32,
        input: &KeyInput,
    ) -> Result<(), SourceError> {
        match self {
            Backend::Local(b) => b.tmux().send_keys(session, window, input).await,
            Backend::Container(b) => b.tmux().send_keys(session, window, input).await,
            Backend::Bridge(b) => b.send_keys(session, window, input).await,
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<FileContent, SourceError> {
        match self {
            Backend::Local(b) => b.read_file(path).await,
            Backend::Container(b) => b.read_file(path).await,
            Backend::Bridge(b) => b.read_file(path).await,
        }
    }
}
