use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};

use super::auth::authorize_bridge;
use super::error::ApiError;
use super::AppState;
use crate::bridge::protocol::{AgentMessage, ServerMessage};
use crate::bridge::BridgeRegistry;
use crate::source::validate_agent_name;

/// How long a freshly connected agent has to introduce itself.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /ws/bridge`: the endpoint remote agents dial.
///
/// Credentials are checked before the upgrade headers.
pub(super) async fn ws_bridge(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    authorize_bridge(&headers, &state.config.bridge.tokens)?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    let registry = state.registry.clone();
    Ok(ws.on_upgrade(move |socket| handle_bridge_socket(socket, registry)))
}

async fn handle_bridge_socket(mut socket: WebSocket, registry: BridgeRegistry) {
    let name = match tokio::time::timeout(HELLO_TIMEOUT, await_hello(&mut socket)).await {
        Ok(Ok(name)) => name,
        Ok(Err(reason)) => {
            tracing::warn!(reason = %reason, "rejecting bridge handshake");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            tracing::warn!("bridge did not send hello in time");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let welcome = match serde_json::to_string(&ServerMessage::Welcome) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode welcome");
            return;
        }
    };
    if socket.send(Message::Text(welcome.into())).await.is_err() {
        return;
    }

    let (conn, mut outbound) = registry.new_connection(&name);
    registry.register(conn.clone());

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(text) = frame else { break };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => registry.handle_frame(&conn, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(agent = %name, error = %e, "bridge socket error");
                        break;
                    }
                }
            }
            _ = conn.closed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    registry.unregister_connection(&conn);
}

/// Wait for the agent's hello and return its validated name.
async fn await_hello(socket: &mut WebSocket) -> Result<String, String> {
    while let Some(msg) = socket.recv().await {
        match msg.map_err(|e| e.to_string())? {
            Message::Text(text) => {
                return match serde_json::from_str::<AgentMessage>(text.as_str()) {
                    Ok(AgentMessage::Hello { name, version }) => {
                        validate_agent_name(&name)?;
                        tracing::debug!(
                            agent = %name,
                            version = version.as_deref().unwrap_or("unknown"),
                            "bridge hello"
                        );
                        Ok(name)
                    }
                    _ => Err("first frame must be hello".to_string()),
                };
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err("connection closed before hello".to_string())
}
