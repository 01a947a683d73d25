pub mod auth;
mod bridge_ws;
pub mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::bridge::BridgeRegistry;
use crate::config::DeckConfig;
use crate::directory::Directory;
use crate::render::Renderer;

use bridge_ws::ws_bridge;
use handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub directory: Directory,
    pub registry: BridgeRegistry,
    pub config: Arc<DeckConfig>,
    /// Shared by screenshot requests; rendering runs on the blocking pool.
    pub renderer: Arc<Renderer>,
}

impl AppState {
    pub fn new(directory: Directory, renderer: Renderer) -> Self {
        let registry = directory.registry().clone();
        let config = Arc::new(directory.config().clone());
        Self {
            directory,
            registry,
            config,
            renderer: Arc::new(renderer),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/sessions", get(sessions_list))
        .route("/sessions/{id}/windows", get(session_windows))
        .route(
            "/sessions/{id}/windows/{index}/capture",
            get(window_capture),
        )
        .route(
            "/sessions/{id}/windows/{index}/screenshot",
            get(window_screenshot),
        )
        .route("/sessions/{id}/windows/{index}/keys", post(window_keys))
        .route("/containers/{id}/file", get(container_file))
        .route("/bridges", get(bridges_list));

    Router::new()
        .route("/health", get(health))
        .route("/ws/bridge", get(ws_bridge))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
}
