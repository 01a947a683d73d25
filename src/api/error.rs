use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::backend::SourceError;
use crate::render::RenderError;

/// Structured error type for all API handlers.
///
/// Each variant maps to an HTTP status code, a machine-readable code string,
/// and a human-readable message. Implements [`IntoResponse`] so handlers can
/// return `Result<T, ApiError>` directly.
#[derive(Debug)]
pub enum ApiError {
    /// 401 - No bridge token provided.
    AuthRequired,
    /// 403 - Bridge token provided but not accepted.
    AuthInvalid,
    /// 404 - Session, window, container or file does not exist.
    NotFound(String),
    /// 400 - Malformed or invalid request.
    InvalidRequest(String),
    /// 502 - The source cannot be reached (e.g. bridge agent not connected).
    Unreachable(String),
    /// 502 - The bridge connection dropped while the request was in flight.
    ConnectionLost,
    /// 502 - The source answered with something unusable.
    BadGateway(String),
    /// 504 - The source did not answer in time.
    Timeout(Duration),
    /// 413 - File exceeds the size ceiling.
    TooLarge(String),
    /// 415 - File type cannot be rendered.
    Unsupported(String),
    /// 500 - Catch-all internal error.
    InternalError(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error variant.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthRequired => StatusCode::UNAUTHORIZED,
            ApiError::AuthInvalid => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            ApiError::ConnectionLost => StatusCode::BAD_GATEWAY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a machine-readable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthRequired => "auth_required",
            ApiError::AuthInvalid => "auth_invalid",
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Unreachable(_) => "unreachable",
            ApiError::ConnectionLost => "connection_lost",
            ApiError::BadGateway(_) => "bad_gateway",
            ApiError::Timeout(_) => "timeout",
            ApiError::TooLarge(_) => "too_large",
            ApiError::Unsupported(_) => "unsupported_media_type",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    /// Returns a human-readable error message.
    pub fn message(&self) -> String {
        match self {
            ApiError::AuthRequired => {
                "Authentication required. Provide a bridge token via the Authorization header."
                    .to_string()
            }
            ApiError::AuthInvalid => "Invalid bridge token.".to_string(),
            ApiError::NotFound(what) => format!("Not found: {}.", what),
            ApiError::InvalidRequest(detail) => format!("Invalid request: {}.", detail),
            ApiError::Unreachable(detail) => format!("Source unreachable: {}.", detail),
            ApiError::ConnectionLost => {
                "Connection to the bridge was lost during the request.".to_string()
            }
            ApiError::BadGateway(detail) => format!("Bad response from source: {}.", detail),
            ApiError::Timeout(after) => {
                format!("Source did not respond within {}s.", after.as_secs())
            }
            ApiError::TooLarge(detail) => format!("File too large: {}.", detail),
            ApiError::Unsupported(mime) => {
                format!("Cannot render this file type (detected: {}).", mime)
            }
            ApiError::InternalError(detail) => format!("Internal error: {}.", detail),
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::NotFound(what) => ApiError::NotFound(what),
            SourceError::InvalidInput(detail) => ApiError::InvalidRequest(detail),
            SourceError::Unreachable(detail) => ApiError::Unreachable(detail),
            SourceError::ConnectionLost => ApiError::ConnectionLost,
            SourceError::Malformed(detail) => ApiError::BadGateway(detail),
            SourceError::Timeout(after) => ApiError::Timeout(after),
            SourceError::TooLarge(detail) => ApiError::TooLarge(detail),
            SourceError::Unsupported(mime) => ApiError::Unsupported(mime),
            other @ (SourceError::Remote(_) | SourceError::Exec(_)) => {
                ApiError::InternalError(other.to_string())
            }
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::InvalidSize { .. } => ApiError::InvalidRequest(e.to_string()),
            RenderError::Encode(_) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
            }
        });
        let mut response = (self.status_code(), Json(body)).into_response();
        if let ApiError::Timeout(after) = self {
            if let Ok(value) = HeaderValue::from_str(&after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    /// Helper: convert an ApiError into a response and extract the status and
    /// parsed JSON body.
    async fn response_parts(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = Body::new(response.into_body())
            .collect()
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn source_errors_map_to_statuses() {
        let cases = [
            (SourceError::NotFound("s".into()), StatusCode::NOT_FOUND),
            (SourceError::Unreachable("a".into()), StatusCode::BAD_GATEWAY),
            (SourceError::ConnectionLost, StatusCode::BAD_GATEWAY),
            (SourceError::Malformed("x".into()), StatusCode::BAD_GATEWAY),
            (
                SourceError::Timeout(Duration::from_secs(30)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (SourceError::TooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (
                SourceError::Unsupported("application/zip".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (SourceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (SourceError::Remote("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, _) = response_parts(ApiError::from(err)).await;
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn timeout_sets_retry_after() {
        let response = ApiError::Timeout(Duration::from_secs(30)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[tokio::test]
    async fn body_has_code_and_message() {
        let (_, json) = response_parts(ApiError::NotFound("session abc".into())).await;
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["error"]["message"], "Not found: session abc.");
    }

    #[tokio::test]
    async fn auth_statuses() {
        let (status, _) = response_parts(ApiError::AuthRequired).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, json) = response_parts(ApiError::AuthInvalid).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "auth_invalid");
    }
}
