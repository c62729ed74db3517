//! Translation between HTTP and the flow layer: who is calling, and how a
//! failed command is reported.

use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use flows::FlowError;
use shared::{
    domain::{User, UserId},
    error::{ApiError, ErrorCode},
};
use tracing::error;

pub(crate) type Rejection = (StatusCode, Json<ApiError>);

pub(crate) const USER_ID_HEADER: &str = "x-user-id";
pub(crate) const USER_NAME_HEADER: &str = "x-user-name";
pub(crate) const USER_EMAIL_HEADER: &str = "x-user-email";

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn reject(api: ApiError) -> Rejection {
    (status_for(api.code), Json(api))
}

pub(crate) fn reject_flow(err: FlowError) -> Rejection {
    if err.is_internal() {
        error!(error = %err, kind = err.name(), "command failed on infrastructure");
    }
    reject(err.into())
}

/// The authenticating proxy in front of the server forwards the caller's
/// identity in headers.
pub(crate) fn user_from_headers(headers: &HeaderMap) -> Result<User, Rejection> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let unauthorized = |message: &str| {
        reject(ApiError::new(
            ErrorCode::Unauthorized,
            "Unauthenticated",
            message,
        ))
    };

    let id = header(USER_ID_HEADER)
        .ok_or_else(|| unauthorized("missing x-user-id header"))?
        .parse::<UserId>()
        .map_err(|_| unauthorized("x-user-id is not a valid user id"))?;
    let name = header(USER_NAME_HEADER).unwrap_or_default().to_string();
    let email = header(USER_EMAIL_HEADER)
        .ok_or_else(|| unauthorized("missing x-user-email header"))?
        .to_string();
    Ok(User { id, name, email })
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
