//! Errors for remote file handles

use std::io;

use rfh_core::TransportError;
use thiserror::Error;

use super::Whence;

/// Errors returned by [`super::RemoteFile`] operations.
#[derive(Error, Debug)]
pub enum FileError {
    /// The open mode is contradictory, such as asking for read and write at once.
    #[error("invalid mode configuration: {0}")]
    Configuration(String),

    /// The open mode is not one of the supported modes.
    #[error("unsupported mode {0:?}, only read and write are supported")]
    UnsupportedMode(String),

    /// The seek target falls outside the bounds permitted for its origin.
    #[error("seeking {offset} from {whence:?} is outside of file size {size}")]
    SeekRange {
        offset: i64,
        whence: Whence,
        size: u64,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The path does not name a share and an object within it.
    #[error("invalid path {0:?}")]
    InvalidPath(String),

    /// The handle has not been opened, or has been closed.
    #[error("file handle is not open")]
    NotOpen,

    /// The handle is already open and must be closed before opening it again.
    #[error("file handle is already open")]
    AlreadyOpen,

    /// Stream handles have no position to seek.
    #[error("stream handles are not seekable")]
    NotSeekable,

    /// The contents could not be interpreted as requested.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The transport failed. The handle should be closed and discarded.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for remote file handle operations.
pub type FileResult<T> = Result<T, FileError>;

impl From<FileError> for io::Error {
    fn from(e: FileError) -> Self {
        let kind = match e {
            FileError::Transport(inner) => return inner.into(),
            FileError::NotOpen => io::ErrorKind::NotConnected,
            FileError::AlreadyOpen => io::ErrorKind::AlreadyExists,
            FileError::NotSeekable => io::ErrorKind::Unsupported,
            FileError::InvalidData(_) => io::ErrorKind::InvalidData,
            FileError::Configuration(_)
            | FileError::UnsupportedMode(_)
            | FileError::SeekRange { .. }
            | FileError::InvalidArgument(_)
            | FileError::InvalidPath(_) => io::ErrorKind::InvalidInput,
        };

        io::Error::new(kind, e)
    }
}
