//! Transport errors

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by a transport.
///
/// The type is serializable so the dispatcher can send it back to the client verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    /// No share with this name is exported by the remote.
    #[error("share not found: {0}")]
    ShareNotFound(String),

    /// The object does not exist and the disposition does not create it.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The share or object identifier is not (or no longer) valid.
    #[error("invalid share or object handle")]
    InvalidHandle,

    /// The object was not opened with the rights the operation needs.
    #[error("access denied")]
    AccessDenied,

    /// The remote failed to perform the operation.
    #[error("remote io error: {0}")]
    Io(String),

    /// No response arrived within the timeout after all retries.
    #[error("request timed out")]
    TimedOut,

    /// The remote could not be reached.
    #[error("connection to remote failed: {0}")]
    Connection(String),

    /// A message could not be encoded or decoded, or a reply made no sense.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A transfer made no forward progress for too many consecutive calls.
    #[error("transfer stalled after {attempts} calls without progress")]
    Stalled { attempts: u32 },
}

/// Result type returned by every [`crate::Transport`] call.
pub type TransportResult<T> = Result<T, TransportError>;

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::ObjectNotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => Self::AccessDenied,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::AddrNotAvailable => Self::Connection(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<TransportError> for io::Error {
    fn from(e: TransportError) -> Self {
        let kind = match e {
            TransportError::ShareNotFound(_) | TransportError::ObjectNotFound(_) => {
                io::ErrorKind::NotFound
            }
            TransportError::AccessDenied => io::ErrorKind::PermissionDenied,
            TransportError::TimedOut => io::ErrorKind::TimedOut,
            TransportError::Connection(_) => io::ErrorKind::ConnectionRefused,
            TransportError::Protocol(_) => io::ErrorKind::InvalidData,
            TransportError::Stalled { .. } => io::ErrorKind::UnexpectedEof,
            TransportError::InvalidHandle | TransportError::Io(_) => io::ErrorKind::Other,
        };

        io::Error::new(kind, e)
    }
}
