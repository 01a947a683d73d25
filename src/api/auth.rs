use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use super::error::ApiError;

/// Extract a Bearer token from the Authorization header.
pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// True if `candidate` equals one of `accepted`. Every comparison runs in
/// constant time and all tokens are always checked.
pub(crate) fn token_accepted(candidate: &str, accepted: &[String]) -> bool {
    accepted.iter().fold(false, |found, token| {
        let eq: bool = candidate.as_bytes().ct_eq(token.as_bytes()).into();
        found | eq
    })
}

/// Check a bridge agent's Authorization header against the configured tokens.
pub(crate) fn authorize_bridge(headers: &HeaderMap, accepted: &[String]) -> Result<(), ApiError> {
    let token = extract_bearer(headers).ok_or(ApiError::AuthRequired)?;
    if accepted.is_empty() || !token_accepted(token, accepted) {
        return Err(ApiError::AuthInvalid);
    }
    Ok(())
}
