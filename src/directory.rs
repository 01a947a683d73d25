//! Resolves container and session identifiers to backends, and merges the
//! session listings of every source.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use crate::backend::{
    list_containers, Backend, BridgeBackend, ContainerBackend, LocalBackend, SourceError,
};
use crate::bridge::BridgeRegistry;
use crate::config::DeckConfig;
use crate::exec::SharedRunner;
use crate::session::{parse_session_id, Session};
use crate::source::{classify, Source, HOST_ID, LOCAL_ID};

/// A session addressed by its global id, after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub container_id: String,
    pub session: String,
}

/// The router every caller goes through.
#[derive(Clone)]
pub struct Directory {
    config: Arc<DeckConfig>,
    runner: SharedRunner,
    registry: BridgeRegistry,
}

impl Directory {
    pub fn new(config: Arc<DeckConfig>, runner: SharedRunner, registry: BridgeRegistry) -> Self {
        Self {
            config,
            runner,
            registry,
        }
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn registry(&self) -> &BridgeRegistry {
        &self.registry
    }

    /// Pick the backend for a container identifier from its shape and the
    /// configuration alone. No I/O.
    ///
    /// Bridge identifiers always resolve; a disconnected agent fails as
    /// `Unreachable` when an operation is attempted.
    pub fn resolve(&self, container_id: &str) -> Result<Backend, SourceError> {
        let not_found = || SourceError::NotFound(format!("container {container_id}"));
        let max = self.config.limits.max_file_size;
        match classify(container_id).ok_or_else(not_found)? {
            Source::Local { host: false } => {
                if !self.config.local.enabled {
                    return Err(not_found());
                }
                Ok(Backend::Local(LocalBackend::new(
                    false,
                    None,
                    self.runner.clone(),
                    max,
                )))
            }
            Source::Local { host: true } => {
                let socket = self
                    .config
                    .local
                    .host_tmux_socket
                    .as_deref()
                    .ok_or_else(not_found)?;
                Ok(Backend::Local(LocalBackend::new(
                    true,
                    Some(socket),
                    self.runner.clone(),
                    max,
                )))
            }
            Source::Container { id } => {
                if !self.config.docker.enabled {
                    return Err(not_found());
                }
                Ok(Backend::Container(ContainerBackend::new(
                    &id,
                    &self.config.docker.docker_bin,
                    self.runner.clone(),
                    max,
                )))
            }
            Source::Bridge { agent, remote } => Ok(Backend::Bridge(BridgeBackend::new(
                self.registry.clone(),
                &agent,
                &remote,
                self.config.bridge.request_timeout(),
                max,
            ))),
        }
    }

    /// Decode a session id and resolve its container.
    pub fn resolve_session(&self, session_id: &str) -> Result<(Backend, SessionTarget), SourceError> {
        let (container_id, session) = parse_session_id(session_id)
            .ok_or_else(|| SourceError::NotFound(format!("session {session_id}")))?;
        let backend = self.resolve(&container_id)?;
        Ok((
            backend,
            SessionTarget {
                container_id,
                session,
            },
        ))
    }

    /// Every session on every source, sorted by (container id, name).
    ///
    /// Sources are queried concurrently. A failing source is logged and
    /// contributes nothing.
    pub async fn list_all(&self) -> Vec<Session> {
        let mut sources: Vec<BoxFuture<'_, Vec<Session>>> = Vec::new();

        if self.config.local.enabled {
            sources.push(self.list_source(LOCAL_ID.to_string()).boxed());
        }
        if self.config.local.host_tmux_socket.is_some() {
            sources.push(self.list_source(HOST_ID.to_string()).boxed());
        }
        if self.config.docker.enabled {
            sources.push(self.list_docker().boxed());
        }
        for agent in self.registry.agent_names() {
            sources.push(self.list_bridge(agent).boxed());
        }

        let mut sessions: Vec<Session> = join_all(sources).await.into_iter().flatten().collect();
        sessions.sort_by(|a, b| {
            a.container_id
                .cmp(&b.container_id)
                .then_with(|| a.name.cmp(&b.name))
        });
        sessions
    }

    async fn list_source(&self, container_id: String) -> Vec<Session> {
        let backend = match self.resolve(&container_id) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(container = %container_id, error = %e, "cannot resolve source");
                return Vec::new();
            }
        };
        match backend.list_sessions().await {
            Ok(summaries) => summaries
                .into_iter()
                .map(|s| Session::new(&container_id, backend.kind(), s))
                .collect(),
            Err(e) => {
                tracing::warn!(container = %container_id, error = %e, "failed to list sessions");
                Vec::new()
            }
        }
    }

    async fn list_docker(&self) -> Vec<Session> {
        let docker = &self.config.docker;
        let ids = match list_containers(
            &self.runner,
            &docker.docker_bin,
            &docker.name_prefix,
            docker.label.as_deref(),
        )
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list docker containers");
                return Vec::new();
            }
        };
        join_all(ids.into_iter().map(|id| self.list_source(id)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn list_bridge(&self, agent: String) -> Vec<Session> {
        let backend = BridgeBackend::new(
            self.registry.clone(),
            &agent,
            LOCAL_ID,
            self.config.bridge.request_timeout(),
            self.config.limits.max_file_size,
        );
        match backend.list_all_sources().await {
            Ok(listed) => listed
                .into_iter()
                .map(|(container_id, summary)| Session::new(&container_id, "bridge", summary))
                .collect(),
            Err(e) => {
                tracing::warn!(agent = %agent, error = %e, "failed to list bridge sessions");
                Vec::new()
            }
        }
    }
}
