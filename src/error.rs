//! Typed errors shared across the request-processing pipeline.
//!
//! Every variant carries the HTTP status it maps to, so the pipeline
//! (`router.rs`/`handlers.rs`) never has to re-derive a status code from
//! a message string.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed request, unknown provider/engine, missing credentials,
    /// invalid topology for the requested plugin.
    #[error("{0}")]
    User(String),

    /// Upstream 5xx, timeout, connection reset. Safe to retry.
    #[error("{0}")]
    Transient(String),

    /// Unrecoverable internal state: instance id claimed by two parents,
    /// fake-node pool exhausted, cyclic graph, inconsistent layering.
    #[error("{0}")]
    Fatal(String),

    /// Result id absent or evicted from the bounded history.
    #[error("{0}")]
    NotFound(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::User(_) => StatusCode::BAD_REQUEST,
            Error::Transient(_) => StatusCode::BAD_GATEWAY,
            Error::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::User(m) | Error::Transient(m) | Error::Fatal(m) | Error::NotFound(m) => m,
        }
    }

    pub fn user(msg: impl Into<String>) -> Self {
        Error::User(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Error::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Error::Fatal(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Error::Transient(err.to_string())
        } else {
            Error::Fatal(err.to_string())
        }
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code >= 500 => Error::Transient(err.to_string()),
            _ => Error::Fatal(err.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::User(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::User(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// The HTTP pipeline never leaks stack traces: only `{code, message}`
/// reaches the client (spec §7 Propagation).
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message().to_string();
        (status, Json(ErrorBody { message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
