//! Request/response correlation over a bridge connection, driven from the
//! agent side by reading the outbound queue and feeding replies back in.

use std::time::Duration;

use serde_json::{json, Value};
use tmuxdeck::bridge::protocol::{Request, CORRELATION_FIELD};
use tmuxdeck::bridge::{BridgeError, BridgeRegistry};

const TIMEOUT: Duration = Duration::from_secs(5);

fn list_windows(session: &str) -> Request {
    Request::ListWindows {
        session: session.to_string(),
    }
}

fn reply_to(sent: &Value, body: Value) -> String {
    let mut body = body;
    body[CORRELATION_FIELD] = sent[CORRELATION_FIELD].clone();
    body.to_string()
}

#[tokio::test]
async fn unregistered_agent_is_unreachable_without_io() {
    let registry = BridgeRegistry::new();
    let err = registry
        .send_and_wait("nobody", "local", list_windows("main"), TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Unreachable("nobody".to_string()));
}

#[tokio::test]
async fn responses_in_reverse_order_reach_their_callers() {
    let registry = BridgeRegistry::new();
    let (conn, mut outbound) = registry.new_connection("box");
    registry.register(conn.clone());

    let callers: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|session| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .send_and_wait("box", "local", list_windows(session), TIMEOUT)
                    .await
            })
        })
        .collect();

    let mut sent = Vec::new();
    for _ in 0..3 {
        let frame: Value = serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
        sent.push(frame);
    }
    let ids: std::collections::HashSet<_> = sent.iter().map(|f| f[CORRELATION_FIELD].clone()).collect();
    assert_eq!(ids.len(), 3, "correlation ids must be distinct");

    for frame in sent.iter().rev() {
        let echo = frame["session"].clone();
        registry.handle_frame(&conn, &reply_to(frame, json!({ "echo": echo })));
    }

    for (caller, session) in callers.into_iter().zip(["a", "b", "c"]) {
        let value = caller.await.unwrap().unwrap();
        assert_eq!(value["echo"], session);
        assert!(value.get(CORRELATION_FIELD).is_none());
    }
    assert_eq!(conn.pending_count(), 0);
}

#[tokio::test]
async fn late_response_after_timeout_is_discarded() {
    let registry = BridgeRegistry::new();
    let (conn, mut outbound) = registry.new_connection("box");
    registry.register(conn.clone());

    let err = registry
        .send_and_wait("box", "local", list_windows("main"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Timeout(Duration::from_millis(50)));
    assert_eq!(conn.pending_count(), 0);

    let sent: Value = serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
    registry.handle_frame(&conn, &reply_to(&sent, json!({ "windows": [] })));
    assert_eq!(conn.pending_count(), 0);
    assert!(conn.is_alive());
}

#[tokio::test]
async fn unregister_fails_every_pending_request() {
    let registry = BridgeRegistry::new();
    let (conn, mut outbound) = registry.new_connection("box");
    registry.register(conn.clone());

    let callers: Vec<_> = (0..4)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .send_and_wait("box", "local", list_windows(&format!("s{i}")), TIMEOUT)
                    .await
            })
        })
        .collect();
    for _ in 0..4 {
        outbound.recv().await.unwrap();
    }
    assert_eq!(conn.pending_count(), 4);

    assert!(registry.unregister("box"));
    for caller in callers {
        assert_eq!(caller.await.unwrap().unwrap_err(), BridgeError::ConnectionLost);
    }
    assert!(!registry.is_connected("box"));

    let err = registry
        .send_and_wait("box", "local", list_windows("main"), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unreachable(_)));
}

#[tokio::test]
async fn reconnect_replaces_connection_and_fails_old_requests() {
    let registry = BridgeRegistry::new();
    let (old, mut old_out) = registry.new_connection("box");
    registry.register(old.clone());

    let pending = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .send_and_wait("box", "local", list_windows("main"), TIMEOUT)
                .await
        })
    };
    old_out.recv().await.unwrap();

    let (new, mut new_out) = registry.new_connection("box");
    registry.register(new.clone());
    assert_eq!(pending.await.unwrap().unwrap_err(), BridgeError::ConnectionLost);
    assert!(!old.is_alive());

    // The old socket task noticing its end must not evict the replacement.
    assert!(!registry.unregister_connection(&old));
    assert!(registry.is_connected("box"));

    let caller = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .send_and_wait("box", "local", list_windows("main"), TIMEOUT)
                .await
        })
    };
    let sent: Value = serde_json::from_str(&new_out.recv().await.unwrap()).unwrap();
    registry.handle_frame(&new, &reply_to(&sent, json!({ "windows": [] })));
    assert_eq!(caller.await.unwrap().unwrap(), json!({ "windows": [] }));
}

#[tokio::test]
async fn remote_error_carries_code() {
    let registry = BridgeRegistry::new();
    let (conn, mut outbound) = registry.new_connection("box");
    registry.register(conn.clone());

    let caller = {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry
                .send_and_wait("box", "local", list_windows("gone"), TIMEOUT)
                .await
        })
    };
    let sent: Value = serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
    assert_eq!(sent["type"], "list_windows");
    assert_eq!(sent["source"], "local");
    registry.handle_frame(
        &conn,
        &reply_to(&sent, json!({ "error": "session gone", "code": "not_found" })),
    );
    assert_eq!(
        caller.await.unwrap().unwrap_err(),
        BridgeError::Remote {
            message: "session gone".to_string(),
            code: Some("not_found".to_string()),
        }
    );
}
