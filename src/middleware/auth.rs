// Shared-password gate for the API

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::AppState;
use crate::types::AppError;

pub const PASSWORD_HEADER: &str = "x-access-password";

/// Rejects requests whose `x-access-password` does not match `UI_PASSWORD`.
/// With no password configured every request passes.
pub async fn require_password(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let supplied = header_str(req.headers(), PASSWORD_HEADER);

    if !password_matches(state.config.auth.ui_password.as_deref(), supplied) {
        warn!(path = %req.uri().path(), "Rejected request with missing or wrong access password");
        return Err(AppError::Auth("Invalid or missing access password".to_string()));
    }

    Ok(next.run(req).await)
}

/// Digests are compared so the check does not short-circuit on the first
/// differing byte of the password itself.
pub fn password_matches(expected: Option<&str>, supplied: Option<&str>) -> bool {
    match (expected, supplied) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(expected), Some(supplied)) => Sha256::digest(expected.as_bytes()) == Sha256::digest(supplied.as_bytes()),
    }
}

/// Trimmed header value; missing, blank or non-ASCII values are `None`
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
