//! Error types for the quorix session protocol.
//!
//! This module defines the central `Error` enum, which captures every failure a
//! session, a primitive handle or the partition router can surface. It
//! implements `From<tonic::Status>` so RPC failures propagate with `?`, and
//! `From<Error>` for `tonic::Status` so backends written against the same
//! schema can report them with matching status codes.
//!
//! ## Error Cases
//! - `InvalidArgument`: a routing input or operation argument was unusable.
//! - `InvalidConfig`: client configuration failed validation.
//! - `InvalidResponse`: the backend answered with a malformed message.
//! - `SessionClosed`: the session was closed or deleted.
//! - `SessionFailed`: session creation failed earlier; the handle is dead.
//! - `Timeout`: a session RPC did not complete within the request timeout.
//! - `Rpc`: the backend or transport returned a gRPC status.

use core::time::Duration;
use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for quorix clients.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// A routing input or operation argument was rejected before any I/O.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The client configuration is unusable.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The backend response is missing required fields.
    #[error("Invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// The session has been closed or deleted.
    #[error("Session is closed")]
    SessionClosed,

    /// Session creation failed. A new primitive handle is required.
    #[error("Session failed to open")]
    SessionFailed,

    /// A session RPC exceeded the configured request timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend or the transport reported a gRPC status.
    #[error("RPC failed: {0}")]
    Rpc(#[from] Status),
}

impl Error {
    /// Returns the gRPC code this error maps to.
    pub fn code(&self) -> Code {
        match self {
            Error::InvalidArgument { .. } | Error::InvalidConfig { .. } => Code::InvalidArgument,
            Error::InvalidResponse { .. } => Code::Internal,
            Error::SessionClosed | Error::SessionFailed => Code::FailedPrecondition,
            Error::Timeout(_) => Code::DeadlineExceeded,
            Error::Rpc(status) => status.code(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Rpc(status) => status,
            other => Status::new(other.code(), other.to_string()),
        }
    }
}
