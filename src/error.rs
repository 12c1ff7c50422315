//! Error normalization.
//!
//! Every failure — translation, transport, upstream HTTP, mid-stream —
//! collapses into the OpenAI-shaped envelope `{"error":{"message","type"}}`.
//! `RelayError` is the failure signal; `ErrorEnvelope` is the wire shape.
//! The two stay separate: an error value renders to exactly one envelope
//! and one HTTP status, but the envelope carries no failure semantics.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::schema::anthropic;

/// OpenAI-compatible error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
}

/// Client-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequestError,
    AuthenticationError,
    PermissionDenied,
    RateLimitError,
    InsufficientQuota,
    ServerError,
    ApiError,
}

impl ErrorKind {
    /// Translate the upstream error taxonomy to the client-facing one.
    pub fn from_upstream(error_type: &str) -> Self {
        match error_type {
            "overloaded_error" => ErrorKind::ServerError,
            "rate_limit_error" => ErrorKind::RateLimitError,
            "invalid_request_error" => ErrorKind::InvalidRequestError,
            "request_too_large" => ErrorKind::InvalidRequestError,
            "authentication_error" => ErrorKind::AuthenticationError,
            "permission_error" => ErrorKind::PermissionDenied,
            "not_found_error" => ErrorKind::InvalidRequestError,
            "timeout_error" => ErrorKind::ServerError,
            "api_error" => ErrorKind::ApiError,
            "billing_error" => ErrorKind::InsufficientQuota,
            _ => ErrorKind::ApiError,
        }
    }

    /// Derive a kind from a bare upstream HTTP status when the error body
    /// could not be parsed.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ErrorKind::AuthenticationError,
            StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitError,
            s if s.is_client_error() => ErrorKind::InvalidRequestError,
            _ => ErrorKind::ApiError,
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequestError => StatusCode::BAD_REQUEST,
            ErrorKind::AuthenticationError => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::RateLimitError | ErrorKind::InsufficientQuota => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ErrorKind::ServerError | ErrorKind::ApiError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Request translation failures. All map to `invalid_request_error`.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("{0}")]
    UnsupportedFeature(String),

    #[error("{0}")]
    MalformedContent(String),

    #[error("{0}")]
    MissingField(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Translate(#[from] TranslateError),

    /// Inbound body failed to decode as a chat completion request.
    #[error("{0}")]
    BadRequest(String),

    /// Inbound body exceeded the configured size limit.
    #[error("Request Entity Too Large")]
    BodyTooLarge,

    /// No stored credential; the transport cannot authenticate upstream.
    #[error("no credentials configured; run `claude-relay auth login`")]
    MissingCredentials,

    #[error("token refresh failed: {0}")]
    OAuth(String),

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream SSE transport broke mid-stream.
    #[error("upstream stream failed: {0}")]
    Stream(String),

    /// Upstream response body failed to parse.
    #[error("failed to parse upstream response: {0}")]
    Decode(String),

    /// Structured upstream error, already mapped to the client taxonomy.
    #[error("{message}")]
    Upstream { kind: ErrorKind, message: String },
}

impl RelayError {
    /// Parse an upstream error body; falls back to status-derived kinds
    /// when the body is not the documented envelope.
    pub fn from_upstream_body(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<anthropic::ErrorResponse>(body) {
            Ok(resp) => RelayError::Upstream {
                kind: ErrorKind::from_upstream(&resp.error.error_type),
                message: resp.error.message,
            },
            Err(_) => RelayError::Upstream {
                kind: ErrorKind::from_status(status),
                message: if body.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("upstream error")
                        .to_string()
                } else {
                    body.to_string()
                },
            },
        }
    }

    /// Surface an upstream mid-stream `error` event as a typed failure.
    pub fn from_stream_error(error: anthropic::ErrorBody) -> Self {
        RelayError::Upstream {
            kind: ErrorKind::from_upstream(&error.error_type),
            message: error.message,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Translate(_) | RelayError::BadRequest(_) | RelayError::BodyTooLarge => {
                ErrorKind::InvalidRequestError
            }
            RelayError::MissingCredentials => ErrorKind::AuthenticationError,
            RelayError::OAuth(_) | RelayError::Transport(_) | RelayError::Stream(_) => {
                ErrorKind::ServerError
            }
            RelayError::Decode(_) => ErrorKind::ApiError,
            RelayError::Upstream { kind, .. } => *kind,
        }
    }

    /// HTTP status for the buffered (pre-headers) presentation.
    pub fn status(&self) -> StatusCode {
        match self {
            // Semantically an invalid_request_error, but the wire status
            // stays 413 so clients see the size rejection.
            RelayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            other => other.kind().status(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                message: self.to_string(),
                kind: self.kind(),
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}
