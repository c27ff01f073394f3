//! Error types for the code generation client.
//!
//! # Design
//! Every SDK call returns `ApiError` and none of them recover locally. The
//! variants follow where a call can fail: argument validation and file reads
//! happen before any request is sent, `Connection` and `Timeout` come from
//! the transport, and `HttpError` / `MalformedResponse` come from parsing the
//! server's reply.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A required argument was missing or unusable. No request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A local upload file could not be opened or read. No request was sent.
    #[error("failed to read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server returned a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body was not the expected JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
