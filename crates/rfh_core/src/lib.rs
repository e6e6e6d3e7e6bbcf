//! Transport-side building blocks for remote file handles.
//!
//! The [`Transport`] trait is the contract a remote file handle consumes: a share
//! connect, a create/open primitive and size-bounded read/write/flush/close calls on an
//! opaque object identifier. Two transports live here: [`mem::MemTransport`] keeps
//! everything in memory, [`middleware::ContextManager`] sends each call over UDP to a
//! [`middleware::Dispatcher`].

pub mod access;
pub mod error;
pub mod mem;
pub mod middleware;
pub mod transport;

pub use access::{CreateDisposition, CreateOptions, FileAccessMask, FileAttributes, ShareAccess};
pub use error::{TransportError, TransportResult};
pub use transport::{
    normalize_path, share_name, CreateParams, CreateReply, FileMetadata, ObjectId, ReadReply,
    ShareId, Transport,
};
