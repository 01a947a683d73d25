use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::protocol::CORRELATION_FIELD;

/// Outbound frames buffered per connection before senders wait.
const OUTBOUND_CAPACITY: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("bridge not connected: {0}")]
    Unreachable(String),

    #[error("bridge request timed out after {0:?}")]
    Timeout(Duration),

    #[error("bridge connection lost")]
    ConnectionLost,

    /// The agent answered with an application-level error.
    #[error("{message}")]
    Remote {
        message: String,
        code: Option<String>,
    },

    #[error("malformed bridge response: {0}")]
    Malformed(String),
}

type Completion = oneshot::Sender<Result<Value, BridgeError>>;

/// What became of an inbound frame.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// Completed the pending request with this correlation id.
    Completed(u64),
    /// Carried a correlation id nobody is waiting for (timed out, cancelled,
    /// or never issued). Dropped.
    Discarded(u64),
    /// Not a response; for the unsolicited-frame listener.
    Unsolicited(Value),
    /// Not a JSON object.
    Invalid,
}

/// One live duplex channel to a remote agent.
///
/// The socket task owns the other ends: it drains the outbound receiver
/// returned by [`BridgeConnection::new`] into the WebSocket and feeds every
/// received text frame to [`BridgeConnection::dispatch`].
pub struct BridgeConnection {
    name: String,
    serial: u64,
    connected_at: SystemTime,
    outbound: mpsc::Sender<String>,
    pending: Mutex<BTreeMap<u64, Completion>>,
    next_id: AtomicU64,
    alive: AtomicBool,
    closed: CancellationToken,
}

impl std::fmt::Debug for BridgeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConnection")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .field("alive", &self.is_alive())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl BridgeConnection {
    /// Create a connection for `name`. Returns the receiver of outbound frames.
    pub fn new(name: impl Into<String>, serial: u64) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let conn = Arc::new(Self {
            name: name.into(),
            serial,
            connected_at: SystemTime::now(),
            outbound,
            pending: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            closed: CancellationToken::new(),
        });
        (conn, rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinguishes physical connections that share an agent name.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send `payload` (a JSON object) and wait for the matching response.
    ///
    /// Resolves with the response object, `Remote` if it carries an `error`
    /// field, `Timeout` once `timeout` elapses, or `ConnectionLost` if the
    /// connection closes first. Dropping the returned future cancels the
    /// request; a response arriving afterwards is discarded.
    pub async fn request(&self, mut payload: Value, timeout: Duration) -> Result<Value, BridgeError> {
        let obj = payload
            .as_object_mut()
            .ok_or_else(|| BridgeError::Malformed("request payload must be an object".into()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            // Checked under the lock so a concurrent close() cannot miss us.
            if !self.is_alive() {
                return Err(BridgeError::ConnectionLost);
            }
            pending.insert(id, tx);
        }
        let _guard = PendingGuard { conn: self, id };

        obj.insert(CORRELATION_FIELD.into(), id.into());
        tracing::debug!(agent = %self.name, id, "bridge request");
        let exchange = async {
            if self.outbound.send(payload.to_string()).await.is_err() {
                return Err(BridgeError::ConnectionLost);
            }
            rx.await.unwrap_or(Err(BridgeError::ConnectionLost))
        };

        // The deadline covers queueing as well as the reply.
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(agent = %self.name, id, "bridge request timed out");
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    /// Route one inbound text frame.
    pub fn dispatch(&self, text: &str) -> Inbound {
        let value: Value = match serde_json::from_str(text) {
            Ok(v @ Value::Object(_)) => v,
            _ => return Inbound::Invalid,
        };
        let id = match value.get(CORRELATION_FIELD).and_then(Value::as_u64) {
            Some(id) => id,
            None => return Inbound::Unsolicited(value),
        };

        let completion = self.pending.lock().remove(&id);
        match completion {
            Some(tx) => {
                let _ = tx.send(into_result(value));
                Inbound::Completed(id)
            }
            None => {
                tracing::debug!(agent = %self.name, id, "discarding response with no pending request");
                Inbound::Discarded(id)
            }
        }
    }

    /// Mark the connection dead and fail every pending request with
    /// `ConnectionLost`, oldest first. Idempotent.
    pub fn close(&self) {
        let drained = {
            let mut pending = self.pending.lock();
            self.alive.store(false, Ordering::Release);
            std::mem::take(&mut *pending)
        };
        if !drained.is_empty() {
            tracing::debug!(agent = %self.name, count = drained.len(), "failing pending bridge requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(BridgeError::ConnectionLost));
        }
        self.closed.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Queue a frame that expects no response.
    pub async fn send_frame(&self, frame: String) -> Result<(), BridgeError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| BridgeError::ConnectionLost)
    }
}

/// Removes a pending entry when its request future finishes or is dropped.
struct PendingGuard<'a> {
    conn: &'a BridgeConnection,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.conn.pending.lock().remove(&self.id);
    }
}

fn into_result(mut value: Value) -> Result<Value, BridgeError> {
    if let Some(obj) = value.as_object_mut() {
        obj.remove(CORRELATION_FIELD);
        if let Some(error) = obj.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let code = obj.get("code").and_then(Value::as_str).map(str::to_string);
            return Err(BridgeError::Remote { message, code });
        }
    }
    Ok(value)
}
