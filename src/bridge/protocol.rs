//! JSON frames exchanged between the control plane and remote agents.
//!
//! Every frame is a WebSocket text message holding one JSON object.
//!
//! Control plane → agent:
//! - `{"type":"welcome"}` after a successful handshake
//! - requests: `{"type":<command>,"correlation_id":<u64>,"source":<id>,...}`
//!
//! Agent → control plane:
//! - `{"type":"hello","name":<agent>,"version":<version>}` as the first frame
//! - responses: `{"correlation_id":<u64>,...}` or
//!   `{"correlation_id":<u64>,"error":<message>,"code":<code>}`
//! - `{"type":"session_report","sessions":[...]}` periodically

use serde::{Deserialize, Serialize};

use crate::session::{SessionSummary, Window};
use crate::tmux::{CaptureOptions, KeyInput};

/// Field carrying the correlation id in requests and responses.
pub const CORRELATION_FIELD: &str = "correlation_id";

/// `source` value asking an agent to list sessions from every source it
/// knows. Each returned summary then carries its own `source`.
pub const ALL_SOURCES: &str = "*";

/// An operation the control plane asks an agent to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    ListSessions,
    ListWindows {
        session: String,
    },
    CapturePane {
        session: String,
        window: u32,
        #[serde(default)]
        ansi: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_lines: Option<u32>,
    },
    PaneWidth {
        session: String,
        window: u32,
    },
    SendKeys {
        session: String,
        window: u32,
        text: String,
        #[serde(default)]
        enter: bool,
        #[serde(default)]
        submit: bool,
    },
    FileRead {
        path: String,
    },
}

impl Request {
    pub fn capture(session: &str, window: u32, options: CaptureOptions) -> Self {
        Request::CapturePane {
            session: session.to_string(),
            window,
            ansi: options.ansi,
            max_lines: options.max_lines,
        }
    }

    pub fn send_keys(session: &str, window: u32, input: &KeyInput) -> Self {
        Request::SendKeys {
            session: session.to_string(),
            window,
            text: input.text.clone(),
            enter: input.enter,
            submit: input.submit,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::ListSessions => "list_sessions",
            Request::ListWindows { .. } => "list_windows",
            Request::CapturePane { .. } => "capture_pane",
            Request::PaneWidth { .. } => "pane_width",
            Request::SendKeys { .. } => "send_keys",
            Request::FileRead { .. } => "file_read",
        }
    }
}

/// A request addressed to one of the agent's sources. The correlation id is
/// attached by the connection when the frame is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,
    pub source: String,
    #[serde(flatten)]
    pub request: Request,
}

/// Successful result payloads, one per request type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Sessions { sessions: Vec<SessionSummary> },
    Windows { windows: Vec<Window> },
    Capture { text: String },
    Width { width: u16 },
    File { data: String, mime_type: String },
    Ack { ok: bool },
}

/// Error payload sent back to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    /// Machine-readable kind (`not_found`, `too_large`, ...), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Frames initiated by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    Hello {
        name: String,
        #[serde(default)]
        version: Option<String>,
    },
    SessionReport {
        sessions: Vec<SessionSummary>,
    },
}

/// Frames initiated by the control plane that are not requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome,
}

/// Build a response frame for `correlation_id` from a handler result.
pub fn response_frame(
    correlation_id: u64,
    result: Result<Reply, ErrorReply>,
) -> serde_json::Value {
    let mut value = match result {
        Ok(reply) => serde_json::to_value(reply),
        Err(err) => serde_json::to_value(err),
    }
    .unwrap_or_else(|e| serde_json::json!({ "error": format!("failed to encode reply: {e}") }));
    if let Some(obj) = value.as_object_mut() {
        obj.insert(CORRELATION_FIELD.into(), correlation_id.into());
    }
    value
}
