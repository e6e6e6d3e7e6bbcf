//! The transport contract consumed by remote file handles.

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::access::{CreateDisposition, CreateOptions, FileAccessMask, FileAttributes, ShareAccess};
use crate::error::TransportResult;

/// Opaque identifier of a connected share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareId(pub u32);

/// Opaque identifier of an open remote object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Arguments of the create/open primitive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateParams {
    pub desired_access: FileAccessMask,
    pub share_access: ShareAccess,
    pub create_options: CreateOptions,
    pub create_disposition: CreateDisposition,
    pub file_attributes: FileAttributes,
}

/// File metadata returned by the create primitive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Byte length of the object.
    pub end_of_file: u64,
    /// Bytes allocated on the remote for the object.
    pub allocation_size: u64,
    pub attributes: FileAttributes,
    pub creation_time: Option<SystemTime>,
    pub last_access_time: Option<SystemTime>,
    pub last_write_time: Option<SystemTime>,
    pub change_time: Option<SystemTime>,
}

/// Reply of the create primitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReply {
    pub object_id: ObjectId,
    pub metadata: FileMetadata,
}

/// Reply of the read primitive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReply {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,

    /// Hint of how many bytes remain after this read. Not authoritative.
    pub remaining: u64,
}

/// Primitive operations on remote objects.
///
/// Reads and writes are size-bounded: an implementation may transfer fewer bytes than
/// asked for. Callers that need the whole request satisfied must loop.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a share and return its identifier.
    async fn tree_connect(&self, share_path: &str) -> TransportResult<ShareId>;

    /// Create or open the object at `path`, relative to the share root.
    async fn create(
        &self,
        share: ShareId,
        path: &str,
        params: CreateParams,
    ) -> TransportResult<CreateReply>;

    /// Read at most `length` bytes starting at `offset`.
    async fn read(
        &self,
        share: ShareId,
        object: ObjectId,
        offset: u64,
        length: usize,
    ) -> TransportResult<ReadReply>;

    /// Write some prefix of `data` at `offset`, returning how many bytes were accepted.
    async fn write(
        &self,
        share: ShareId,
        object: ObjectId,
        data: &[u8],
        offset: u64,
    ) -> TransportResult<usize>;

    /// Force previously written data to durable storage.
    async fn flush(&self, share: ShareId, object: ObjectId) -> TransportResult<()>;

    /// Release the object identifier.
    async fn close(&self, share: ShareId, object: ObjectId) -> TransportResult<()>;
}

/// Returns the share name of a share path: the last non-empty component.
///
/// Both `\\host\share` and `share` yield `share`.
pub fn share_name(share_path: &str) -> &str {
    share_path
        .rsplit(['\\', '/'])
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
}

/// Normalizes an object path: `\` separators, no empty or `.` segments.
pub fn normalize_path(path: &str) -> String {
    path.split(['\\', '/'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("\\")
}
