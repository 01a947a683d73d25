use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::bridge::AgentInfo;
use crate::files::{categorize, pretty_print, FileCategory};
use crate::session::{trim_leading_blank_lines, PaneStatus, Session, Window};
use crate::tmux::{CaptureOptions, KeyInput};

use super::error::ApiError;
use super::AppState;

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Deserialize)]
pub(super) struct SessionsQuery {
    status: Option<String>,
}

pub(super) async fn sessions_list(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Json<Vec<Session>> {
    let mut sessions = state.directory.list_all().await;
    if let Some(filter) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let wanted = PaneStatus::parse(filter);
        sessions.retain(|s| s.status == wanted);
    }
    Json(sessions)
}

pub(super) async fn session_windows(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Window>>, ApiError> {
    let (backend, target) = state.directory.resolve_session(&id)?;
    Ok(Json(backend.list_windows(&target.session).await?))
}

#[derive(Deserialize)]
pub(super) struct CaptureQuery {
    #[serde(default)]
    ansi: bool,
    lines: Option<u32>,
}

#[derive(Serialize)]
pub(super) struct CaptureResponse {
    content: String,
}

pub(super) async fn window_capture(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
    Query(query): Query<CaptureQuery>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let (backend, target) = state.directory.resolve_session(&id)?;
    let options = CaptureOptions {
        ansi: query.ansi,
        max_lines: query.lines,
    };
    let text = backend.capture_pane(&target.session, index, options).await?;
    Ok(Json(CaptureResponse {
        content: trim_leading_blank_lines(&text).to_string(),
    }))
}

pub(super) async fn window_screenshot(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
) -> Result<Response, ApiError> {
    let (backend, target) = state.directory.resolve_session(&id)?;
    let options = CaptureOptions {
        ansi: true,
        max_lines: None,
    };
    let text = backend.capture_pane(&target.session, index, options).await?;
    let cols = backend.pane_width(&target.session, index).await?;

    let renderer = state.renderer.clone();
    let png = tokio::task::spawn_blocking(move || renderer.render_png(&text, cols as usize))
        .await
        .map_err(|e| ApiError::InternalError(format!("render task failed: {e}")))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

pub(super) async fn window_keys(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
    Json(input): Json<KeyInput>,
) -> Result<StatusCode, ApiError> {
    if input.text.is_empty() && !input.enter && !input.submit {
        return Err(ApiError::InvalidRequest("nothing to send".into()));
    }
    let (backend, target) = state.directory.resolve_session(&id)?;
    backend.send_keys(&target.session, index, &input).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub(super) struct FileQuery {
    path: String,
}

pub(super) async fn container_file(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    if query.path.is_empty() {
        return Err(ApiError::InvalidRequest("path is required".into()));
    }
    let backend = state.directory.resolve(&container_id)?;
    let file = backend.read_file(&query.path).await?;
    let category = categorize(&file.mime).ok_or_else(|| ApiError::Unsupported(file.mime.clone()))?;

    let (content_type, body) = match category {
        FileCategory::Text => (
            "text/plain; charset=utf-8".to_string(),
            pretty_print(file.data, &query.path),
        ),
        FileCategory::Image | FileCategory::Pdf => (file.mime.clone(), file.data),
    };

    let mut response = body.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert("x-file-category", HeaderValue::from_static(category.as_str()));
    if let Ok(value) = HeaderValue::from_str(&file.mime) {
        headers.insert("x-file-mime", value);
    }
    Ok(response)
}

pub(super) async fn bridges_list(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    Json(state.registry.agents())
}
