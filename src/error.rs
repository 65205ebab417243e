//! Error model for vanadio.
//!
//! Every error that reaches an HTTP client is rendered as the standard
//! envelope `{"message": ..., "code": ..., "details": ...}`. This module owns
//! the envelope types, the status-to-code defaults, the lifecycle errors
//! returned by [`crate::server::Server`], and the crate-wide [`Error`] used
//! for internal propagation.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::router::RouteError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical machine-readable error codes carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    BadRequest,
    Unauthorized,
    Unauthenticated,
    Forbidden,
    Conflict,
    InternalError,
    AuthError,
    UpgradeFailed,
    FileNotFound,
}

impl ErrorCode {
    /// The default code for a status. Unknown statuses fall back to
    /// `INTERNAL_ERROR` rather than failing.
    pub fn default_for_status(status: u16) -> Self {
        match status {
            400 => ErrorCode::BadRequest,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            _ => ErrorCode::InternalError,
        }
    }

    /// The wire form of the code, as serialized into the envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::UpgradeFailed => "UPGRADE_FAILED",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
        }
    }
}

/// The standard error envelope. Serialized with
/// `Content-Type: application/json; charset=utf-8` on every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        ErrorBody {
            message: message.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// A single schema-validation failure, surfaced as one entry of the
/// envelope's `details` array for `BAD_REQUEST` responses.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    /// Dotted path to the offending value, e.g. `address.zip`.
    pub field: String,
    pub message: String,
}

/// Errors raised while starting or stopping a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server failed to start: {cause}")]
    Start { cause: String },
    #[error("server failed to stop: {cause}")]
    Stop { cause: String },
}

impl ServerError {
    /// Wire code for the lifecycle error.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Start { .. } => "SERVER_START_ERROR",
            ServerError::Stop { .. } => "SERVER_STOP_ERROR",
        }
    }
}

/// Internal error type used at component boundaries. Handlers return
/// `Result<_, Error>`; the pipeline and the WebSocket dispatcher convert
/// whatever bubbles up into the envelope or the route's error handler.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("{0}")]
    Handler(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// An ad-hoc handler error carrying just a message.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
