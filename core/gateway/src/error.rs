//! Gateway error kinds and their HTTP mapping.
//!
//! Every failure surfaced to a client carries an [`ErrorKind`]; the status
//! code is a pure function of the kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Classification of gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing JSON, bad multipart body, missing required fields.
    MalformedRequest,
    /// Request body exceeds the configured upload limit.
    PayloadTooLarge,
    /// Dial failed: unknown kind, rejected configuration, unreachable provider.
    Connection,
    /// Container or item could not be resolved.
    Resolution,
    /// Container or item could not be resolved, reported as not found.
    NotFound,
    /// A listing call failed.
    Backend,
    /// Reading or writing item content failed.
    Transfer,
    /// The response itself could not be produced.
    Serialization,
}

impl ErrorKind {
    /// Stable identifier used in error bodies.
    pub const fn name(self) -> &'static str {
        match self {
            Self::MalformedRequest => "malformed_request",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Connection => "connection_failed",
            Self::Resolution => "resolution_failed",
            Self::NotFound => "not_found",
            Self::Backend => "backend_failed",
            Self::Transfer => "transfer_failed",
            Self::Serialization => "serialization_failed",
        }
    }

    /// HTTP status reported for this kind.
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MalformedRequest => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Connection
            | Self::Resolution
            | Self::Backend
            | Self::Transfer
            | Self::Serialization => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create an error of this kind.
    pub fn with_message(self, message: impl Into<String>) -> GatewayError {
        GatewayError {
            kind: self,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error of this kind caused by a storage failure.
    ///
    /// The message reads `"<context>. Error: <cause>"`.
    pub fn caused_by(self, context: &str, source: stowaway_common::Error) -> GatewayError {
        GatewayError {
            kind: self,
            message: format!("{}. Error: {}", context, source),
            source: Some(source),
        }
    }
}

/// Error returned by gateway operations and HTTP handlers.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GatewayError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<stowaway_common::Error>,
}

impl GatewayError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the client-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Returns the storage error that caused this one, if any.
    pub fn storage_source(&self) -> Option<&stowaway_common::Error> {
        self.source.as_ref()
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    /// Kind identifier.
    pub error: &'static str,
    /// Human-readable description.
    pub message: &'a str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind.name(), "{}", self.message);
        } else {
            tracing::warn!(kind = self.kind.name(), "{}", self.message);
        }

        let body = ErrorBody {
            error: self.kind.name(),
            message: &self.message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for gateway operations.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
