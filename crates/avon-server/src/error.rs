//! Error types for server setup and request handling
//!
//! [`ConfigError`] covers everything that stops the server from starting.
//! [`RequestError`] is the client-facing taxonomy; it converts into an
//! HTTP response carrying a JSON description of the failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems detected before or at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Clock callback must be installed before startup")]
    MissingClock,
    #[error("Generic pva/geom callbacks must be installed before startup")]
    MissingGenericCallbacks,
    #[error("Root directory {0} is not an accessible directory")]
    InvalidRootDir(PathBuf),
    #[error("Backend name/version cannot be sent in a header: {0}")]
    InvalidBackendName(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reasons a request could not be answered with a payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No resource is bound at the path
    #[error("{0}")]
    NotFound(String),
    /// The resource exists but its interface type lacks the accessor or formatter
    #[error("{0}")]
    CapabilityAbsent(String),
    /// Writes to a read-only resource
    #[error("{0}")]
    ReadOnly(String),
    /// Writes that have no implementation yet
    #[error("{0}")]
    NotImplemented(String),
    /// The request body could not be decoded
    #[error("{0}")]
    Decode(String),
    /// HTTP method other than GET, HEAD or POST
    #[error("{0}")]
    UnrecognizedMethod(String),
    /// The backend accessor reported a failure
    #[error("{0}")]
    AccessorFailed(String),
    /// The accessor's result could not be encoded
    #[error("{0}")]
    Encoding(String),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::CapabilityAbsent(_) => StatusCode::NOT_FOUND,
            Self::ReadOnly(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Decode(_) | Self::UnrecognizedMethod(_) => StatusCode::BAD_REQUEST,
            Self::AccessorFailed(_) | Self::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, axum::Json(body)).into_response()
    }
}
