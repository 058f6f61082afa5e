use reqwest::StatusCode;
use thiserror::Error;

use super::ApiResponse;
use crate::auth::RenewalError;

/// Failure to get a request onto the wire or a response back.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Errors returned by the gateway.
///
/// Status failures keep the complete response so callers can read the
/// backend's payload and headers. Only the `Display` text is truncated.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {}", preview(.0))]
    AccessDenied(ApiResponse),

    #[error("Unauthorized - session is no longer valid")]
    Unauthorized,

    #[error("Resource not found: {}", preview(.0))]
    NotFound(ApiResponse),

    #[error("Rate limited - please wait before retrying")]
    RateLimited(ApiResponse),

    #[error("Server error: {}", preview(.0))]
    ServerError(ApiResponse),

    #[error("Request failed with status {}: {}", .0.status, preview(.0))]
    Status(ApiResponse),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session renewal failed: {0}")]
    Renewal(#[from] RenewalError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

fn preview(response: &ApiResponse) -> String {
    truncate_body(&response.text())
}

impl ApiError {
    pub fn from_status(response: ApiResponse) -> Self {
        match response.status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(response),
            404 => ApiError::NotFound(response),
            429 => ApiError::RateLimited(response),
            500..=599 => ApiError::ServerError(response),
            _ => ApiError::Status(response),
        }
    }

    /// The failed response, for errors caused by a non-success status.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            ApiError::AccessDenied(response)
            | ApiError::NotFound(response)
            | ApiError::RateLimited(response)
            | ApiError::ServerError(response)
            | ApiError::Status(response) => Some(response),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|response| response.status)
    }

    /// True when the caller must log in again before retrying.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::Renewal(_))
    }
}
