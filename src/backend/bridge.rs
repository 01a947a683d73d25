use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::bridge::protocol::{Request, ALL_SOURCES};
use crate::bridge::BridgeRegistry;
use crate::session::{validate_session_name, SessionSummary, Window};
use crate::source::{bridge_container_id, classify};
use crate::tmux::{CaptureOptions, KeyInput};

use super::{check_size, FileContent, SourceError};

/// A source on a remote agent, reached through the registry.
#[derive(Clone)]
pub struct BridgeBackend {
    registry: BridgeRegistry,
    agent: String,
    remote: String,
    timeout: Duration,
    max_file_size: u64,
}

impl std::fmt::Debug for BridgeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeBackend")
            .field("agent", &self.agent)
            .field("remote", &self.remote)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SessionsReply {
    sessions: Vec<SessionSummary>,
}

#[derive(Deserialize)]
struct WindowsReply {
    windows: Vec<Window>,
}

#[derive(Deserialize)]
struct CaptureReply {
    text: String,
}

#[derive(Deserialize)]
struct WidthReply {
    width: u16,
}

#[derive(Deserialize)]
struct FileReply {
    data: String,
    mime_type: String,
}

impl BridgeBackend {
    pub fn new(
        registry: BridgeRegistry,
        agent: &str,
        remote: &str,
        timeout: Duration,
        max_file_size: u64,
    ) -> Self {
        Self {
            registry,
            agent: agent.to_string(),
            remote: remote.to_string(),
            timeout,
            max_file_size,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn container_id(&self) -> String {
        bridge_container_id(&self.agent, &self.remote)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        source: &str,
        request: Request,
    ) -> Result<T, SourceError> {
        let kind = request.name();
        let value: Value = self
            .registry
            .send_and_wait(&self.agent, source, request, self.timeout)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| SourceError::Malformed(format!("{kind} reply from {}: {e}", self.agent)))
    }

    /// Sessions of this backend's remote source.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SourceError> {
        let reply: SessionsReply = self.call(&self.remote, Request::ListSessions).await?;
        Ok(reply.sessions)
    }

    /// Sessions of every source the agent knows, grouped by their bridge
    /// container id. One round trip. Sessions tagged with a source that
    /// would not resolve back to this agent are dropped.
    pub async fn list_all_sources(&self) -> Result<Vec<(String, SessionSummary)>, SourceError> {
        let reply: SessionsReply = self.call(ALL_SOURCES, Request::ListSessions).await?;
        Ok(reply
            .sessions
            .into_iter()
            .filter_map(|summary| {
                let remote = summary.source.as_deref().unwrap_or(&self.remote);
                let id = bridge_container_id(&self.agent, remote);
                if classify(&id).is_none() {
                    tracing::warn!(agent = %self.agent, source = remote, session = %summary.name, "dropping session with invalid source tag");
                    return None;
                }
                Some((id, summary))
            })
            .collect())
    }

    pub async fn list_windows(&self, session: &str) -> Result<Vec<Window>, SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        let reply: WindowsReply = self
            .call(
                &self.remote,
                Request::ListWindows {
                    session: session.to_string(),
                },
            )
            .await?;
        Ok(reply.windows)
    }

    pub async fn capture_pane(
        &self,
        session: &str,
        window: u32,
        options: CaptureOptions,
    ) -> Result<String, SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        let reply: CaptureReply = self
            .call(&self.remote, Request::capture(session, window, options))
            .await?;
        check_size(
            &format!("capture of {session}:{window}"),
            reply.text.len(),
            self.max_file_size,
        )?;
        Ok(reply.text)
    }

    pub async fn pane_width(&self, session: &str, window: u32) -> Result<u16, SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        let reply: WidthReply = self
            .call(
                &self.remote,
                Request::PaneWidth {
                    session: session.to_string(),
                    window,
                },
            )
            .await?;
        Ok(reply.width)
    }

    pub async fn send_keys(
        &self,
        session: &str,
        window: u32,
        input: &KeyInput,
    ) -> Result<(), SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        let _: Value = self
            .call(&self.remote, Request::send_keys(session, window, input))
            .await?;
        Ok(())
    }

    /// Fetch a file through the agent. The ceiling is enforced on the
    /// decoded payload.
    pub async fn read_file(&self, path: &str) -> Result<FileContent, SourceError> {
        let reply: FileReply = self
            .call(
                &self.remote,
                Request::FileRead {
                    path: path.to_string(),
                },
            )
            .await?;
        let data = STANDARD
            .decode(reply.data.as_bytes())
            .map_err(|e| SourceError::Malformed(format!("file data from {}: {e}", self.agent)))?;
        check_size(path, data.len(), self.max_file_size)?;
        Ok(FileContent {
            data,
            mime: reply.mime_type,
        })
    }
}
