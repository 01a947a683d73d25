use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use super::connection::{BridgeConnection, BridgeError, Inbound};
use super::protocol::{AgentMessage, Request, RequestFrame};
use crate::session::SessionSummary;

/// An unsolicited frame pushed by an agent.
#[derive(Debug, Clone)]
pub struct BridgeEvent {
    pub agent: String,
    pub frame: Value,
}

/// Public view of a connected agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub name: String,
    /// Seconds since the UNIX epoch.
    pub connected_at: u64,
    pub pending_requests: usize,
    /// Session count from the agent's latest report, if any.
    pub reported_sessions: Option<usize>,
}

struct Inner {
    connections: RwLock<HashMap<String, Arc<BridgeConnection>>>,
    reports: RwLock<HashMap<String, Vec<SessionSummary>>>,
    events: broadcast::Sender<BridgeEvent>,
    next_serial: AtomicU64,
}

/// Currently connected remote agents, keyed by agent name.
///
/// Created once at start-up and cloned into every component that talks to
/// agents; clones share state.
#[derive(Clone)]
pub struct BridgeRegistry {
    inner: Arc<Inner>,
}

impl Default for BridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                connections: RwLock::new(HashMap::new()),
                reports: RwLock::new(HashMap::new()),
                events,
                next_serial: AtomicU64::new(1),
            }),
        }
    }

    /// Create a connection object for `name` without registering it.
    pub fn new_connection(
        &self,
        name: &str,
    ) -> (Arc<BridgeConnection>, tokio::sync::mpsc::Receiver<String>) {
        let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
        BridgeConnection::new(name, serial)
    }

    /// Make `conn` the active connection for its agent name.
    ///
    /// A previous connection under the same name is closed first, failing its
    /// pending requests with `ConnectionLost`.
    pub fn register(&self, conn: Arc<BridgeConnection>) {
        let name = conn.name().to_string();
        let previous = self.inner.connections.write().insert(name.clone(), conn);
        if let Some(previous) = previous {
            tracing::info!(agent = %name, "bridge reconnected, replacing previous connection");
            previous.close();
        } else {
            tracing::info!(agent = %name, "bridge registered");
        }
    }

    /// Remove the connection for `name`, failing its pending requests.
    /// Returns true if a connection was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.inner.connections.write().remove(name);
        match removed {
            Some(conn) => {
                conn.close();
                self.inner.reports.write().remove(name);
                tracing::info!(agent = %name, "bridge unregistered");
                true
            }
            None => false,
        }
    }

    /// Like [`unregister`](Self::unregister), but only if `conn` is still the
    /// active connection for its name. A replaced connection is closed either
    /// way.
    pub fn unregister_connection(&self, conn: &Arc<BridgeConnection>) -> bool {
        let removed = {
            let mut connections = self.inner.connections.write();
            match connections.get(conn.name()) {
                Some(current) if Arc::ptr_eq(current, conn) => {
                    connections.remove(conn.name());
                    true
                }
                _ => false,
            }
        };
        conn.close();
        if removed {
            self.inner.reports.write().remove(conn.name());
            tracing::info!(agent = %conn.name(), "bridge unregistered");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<BridgeConnection>> {
        self.inner.connections.read().get(name).cloned()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.inner.connections.read().contains_key(name)
    }

    /// Names of all connected agents, sorted.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.connections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn agents(&self) -> Vec<AgentInfo> {
        let reports = self.inner.reports.read();
        let mut agents: Vec<AgentInfo> = self
            .inner
            .connections
            .read()
            .values()
            .map(|conn| AgentInfo {
                name: conn.name().to_string(),
                connected_at: conn
                    .connected_at()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0),
                pending_requests: conn.pending_count(),
                reported_sessions: reports.get(conn.name()).map(Vec::len),
            })
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    /// Send `request` for `source` on agent `name` and wait for the response.
    ///
    /// Fails with `Unreachable` without any I/O if the agent is not
    /// connected. Never retries.
    pub async fn send_and_wait(
        &self,
        name: &str,
        source: &str,
        request: Request,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let conn = self
            .get(name)
            .ok_or_else(|| BridgeError::Unreachable(name.to_string()))?;
        let kind = request.name();
        let frame = RequestFrame {
            correlation_id: None,
            source: source.to_string(),
            request,
        };
        let payload = serde_json::to_value(&frame)
            .map_err(|e| BridgeError::Malformed(format!("failed to encode {kind}: {e}")))?;
        conn.request(payload, timeout).await
    }

    /// Feed an inbound frame received on `conn`.
    ///
    /// Responses complete their pending request; everything else is
    /// published to [`subscribe`](Self::subscribe) listeners, and session
    /// reports are cached.
    pub fn handle_frame(&self, conn: &BridgeConnection, text: &str) {
        match conn.dispatch(text) {
            Inbound::Completed(_) | Inbound::Discarded(_) => {}
            Inbound::Invalid => {
                tracing::warn!(agent = %conn.name(), "ignoring malformed bridge frame");
            }
            Inbound::Unsolicited(frame) => {
                match serde_json::from_value::<AgentMessage>(frame.clone()) {
                    Ok(AgentMessage::SessionReport { sessions }) => {
                        tracing::debug!(agent = %conn.name(), count = sessions.len(), "session report");
                        if self.is_current(conn) {
                            self.inner
                                .reports
                                .write()
                                .insert(conn.name().to_string(), sessions);
                        }
                    }
                    Ok(AgentMessage::Hello { .. }) => {
                        tracing::debug!(agent = %conn.name(), "ignoring repeated hello");
                    }
                    Err(_) => {
                        tracing::debug!(agent = %conn.name(), "unsolicited bridge frame");
                    }
                }
                let _ = self.inner.events.send(BridgeEvent {
                    agent: conn.name().to_string(),
                    frame,
                });
            }
        }
    }

    /// Listen for unsolicited agent frames.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    /// Sessions from the agent's most recent report.
    pub fn last_report(&self, name: &str) -> Option<Vec<SessionSummary>> {
        self.inner.reports.read().get(name).cloned()
    }

    fn is_current(&self, conn: &BridgeConnection) -> bool {
        self.inner
            .connections
            .read()
            .get(conn.name())
            .is_some_and(|c| c.serial() == conn.serial())
    }
}
