//! An in-memory [`Transport`].
//!
//! Shares are maps from normalized paths to objects. Objects are either regular files
//! or pipes; pipes have no size and reading drains what was previously written.
//!
//! [`TransferLimits`] make the transport behave like a real remote under pressure:
//! short reads and writes, replies that over-deliver, and calls that make no progress.
//! Every call is recorded so tests can count round trips.

use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use async_trait::async_trait;
use futures::lock::Mutex;

use crate::access::{CreateDisposition, FileAccessMask, FileAttributes};
use crate::error::{TransportError, TransportResult};
use crate::transport::{
    normalize_path, share_name, CreateParams, CreateReply, FileMetadata, ObjectId, ReadReply,
    ShareId, Transport,
};

/// Allocation granularity reported for files.
const ALLOCATION_UNIT: u64 = 4096;

/// Limits applied to every read and write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferLimits {
    /// Max bytes returned by a single read.
    pub max_read: Option<usize>,

    /// Max bytes accepted by a single write.
    pub max_write: Option<usize>,

    /// Bytes returned past the requested length on file reads, when the file has them.
    pub over_read: usize,

    /// Every read returns zero bytes.
    pub stall_reads: bool,

    /// Every write accepts zero bytes.
    pub stall_writes: bool,

    /// Every flush fails with an io error.
    pub fail_flush: bool,
}

/// A call received by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    TreeConnect(String),
    Create { path: String, params: CreateParams },
    Read { object: ObjectId, offset: u64, length: usize },
    Write { object: ObjectId, offset: u64, length: usize },
    Flush(ObjectId),
    Close(ObjectId),
}

#[derive(Clone, Debug)]
enum MemObject {
    File(Vec<u8>),
    Pipe(VecDeque<u8>),
}

#[derive(Debug)]
struct OpenObject {
    share: ShareId,
    share_name: String,
    path: String,
    access: FileAccessMask,
}

#[derive(Debug, Default)]
struct MemState {
    shares: HashMap<String, HashMap<String, MemObject>>,
    connected: HashMap<ShareId, String>,
    open: HashMap<ObjectId, OpenObject>,
    next_share: u32,
    next_object: u64,
    calls: Vec<Call>,
}

impl MemState {
    /// Looks up an open object along with the access it was opened with.
    fn resolve(
        &mut self,
        share: ShareId,
        object: ObjectId,
    ) -> TransportResult<(FileAccessMask, &mut MemObject)> {
        let open = self
            .open
            .get(&object)
            .filter(|o| o.share == share)
            .ok_or(TransportError::InvalidHandle)?;

        let entry = self
            .shares
            .get_mut(&open.share_name)
            .and_then(|objects| objects.get_mut(&open.path))
            .ok_or_else(|| TransportError::ObjectNotFound(open.path.clone()))?;

        Ok((open.access, entry))
    }
}

/// A transport that keeps every share in memory.
#[derive(Debug, Default)]
pub struct MemTransport {
    state: Mutex<MemState>,
    limits: TransferLimits,

    /// Reported as every timestamp of every object.
    timestamp: Option<SystemTime>,
}

impl MemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply transfer limits to every subsequent read and write.
    pub fn with_limits(mut self, limits: TransferLimits) -> Self {
        self.limits = limits;

        self
    }

    /// Report `time` as the creation, access, write and change time of every object.
    pub fn with_timestamp(mut self, time: SystemTime) -> Self {
        self.timestamp = Some(time);

        self
    }

    /// Export an empty share.
    pub fn with_share(mut self, name: &str) -> Self {
        self.state
            .get_mut()
            .shares
            .entry(name.to_owned())
            .or_default();

        self
    }

    /// Add a regular file to a share, exporting the share if needed.
    pub fn with_file(mut self, share: &str, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.state
            .get_mut()
            .shares
            .entry(share.to_owned())
            .or_default()
            .insert(normalize_path(path), MemObject::File(contents.into()));

        self
    }

    /// Add a pipe to a share with some bytes already pending.
    pub fn with_pipe(mut self, share: &str, path: &str, pending: impl Into<Vec<u8>>) -> Self {
        self.state
            .get_mut()
            .shares
            .entry(share.to_owned())
            .or_default()
            .insert(
                normalize_path(path),
                MemObject::Pipe(pending.into().into_iter().collect()),
            );

        self
    }

    /// Returns the contents of a file, or the pending bytes of a pipe.
    pub async fn contents(&self, share: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;

        match state.shares.get(share)?.get(&normalize_path(path))? {
            MemObject::File(data) => Some(data.clone()),
            MemObject::Pipe(pending) => Some(pending.iter().copied().collect()),
        }
    }

    /// All calls received so far, oldest first.
    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    /// Forget the recorded calls.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Number of object identifiers currently open.
    pub async fn open_objects(&self) -> usize {
        self.state.lock().await.open.len()
    }

    fn read_cap(&self, length: usize) -> usize {
        self.limits.max_read.map_or(length, |cap| length.min(cap))
    }

    fn write_cap(&self, length: usize) -> usize {
        self.limits.max_write.map_or(length, |cap| length.min(cap))
    }
}

/// Metadata reported for an object.
fn metadata_of(object: &MemObject, timestamp: Option<SystemTime>) -> FileMetadata {
    let end_of_file = match object {
        MemObject::File(data) => data.len() as u64,
        MemObject::Pipe(_) => 0,
    };

    FileMetadata {
        end_of_file,
        allocation_size: end_of_file.div_ceil(ALLOCATION_UNIT) * ALLOCATION_UNIT,
        attributes: FileAttributes::NORMAL,
        creation_time: timestamp,
        last_access_time: timestamp,
        last_write_time: timestamp,
        change_time: timestamp,
    }
}

fn to_index(offset: u64) -> TransportResult<usize> {
    usize::try_from(offset)
        .map_err(|_| TransportError::Protocol(format!("offset {} out of range", offset)))
}

#[async_trait]
impl Transport for MemTransport {
    async fn tree_connect(&self, share_path: &str) -> TransportResult<ShareId> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::TreeConnect(share_path.to_owned()));

        let name = share_name(share_path);
        if !state.shares.contains_key(name) {
            return Err(TransportError::ShareNotFound(share_path.to_owned()));
        }

        state.next_share += 1;
        let id = ShareId(state.next_share);
        state.connected.insert(id, name.to_owned());

        log::debug!("connected share {} as {:?}", name, id);

        Ok(id)
    }

    async fn create(
        &self,
        share: ShareId,
        path: &str,
        params: CreateParams,
    ) -> TransportResult<CreateReply> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Create {
            path: path.to_owned(),
            params,
        });

        let name = state
            .connected
            .get(&share)
            .cloned()
            .ok_or(TransportError::InvalidHandle)?;
        let path = normalize_path(path);

        let objects = state
            .shares
            .get_mut(&name)
            .ok_or_else(|| TransportError::ShareNotFound(name.clone()))?;

        let disposition = params.create_disposition;
        match objects.contains_key(&path) {
            true if disposition == CreateDisposition::Create => {
                return Err(TransportError::Io(format!("{} already exists", path)));
            }
            true => (),
            false if disposition.creates() => {
                objects.insert(path.clone(), MemObject::File(Vec::new()));
            }
            false => return Err(TransportError::ObjectNotFound(path)),
        }

        let object = objects
            .get_mut(&path)
            .ok_or_else(|| TransportError::ObjectNotFound(path.clone()))?;
        if let MemObject::File(data) = object {
            if disposition.truncates() {
                data.clear();
            }
        }

        let metadata = metadata_of(object, self.timestamp);

        state.next_object += 1;
        let object_id = ObjectId(state.next_object);
        state.open.insert(
            object_id,
            OpenObject {
                share,
                share_name: name,
                path,
                access: params.desired_access,
            },
        );

        Ok(CreateReply {
            object_id,
            metadata,
        })
    }

    async fn read(
        &self,
        share: ShareId,
        object: ObjectId,
        offset: u64,
        length: usize,
    ) -> TransportResult<ReadReply> {
        let cap = self.read_cap(length);
        let limits = self.limits;

        let mut state = self.state.lock().await;
        state.calls.push(Call::Read {
            object,
            offset,
            length,
        });

        let (access, entry) = state.resolve(share, object)?;
        if !access.allows_read() {
            return Err(TransportError::AccessDenied);
        }

        let reply = match entry {
            MemObject::File(contents) => {
                let start = to_index(offset)?.min(contents.len());
                let end = match limits.stall_reads {
                    true => start,
                    false => (start + cap + limits.over_read).min(contents.len()),
                };

                ReadReply {
                    data: contents[start..end].to_vec(),
                    remaining: (contents.len() - end) as u64,
                }
            }
            MemObject::Pipe(pending) => {
                let take = match limits.stall_reads {
                    true => 0,
                    false => cap.min(pending.len()),
                };
                let data = pending.drain(..take).collect::<Vec<_>>();

                ReadReply {
                    data,
                    remaining: pending.len() as u64,
                }
            }
        };

        Ok(reply)
    }

    async fn write(
        &self,
        share: ShareId,
        object: ObjectId,
        data: &[u8],
        offset: u64,
    ) -> TransportResult<usize> {
        let accepted = match self.limits.stall_writes {
            true => 0,
            false => self.write_cap(data.len()),
        };

        let mut state = self.state.lock().await;
        state.calls.push(Call::Write {
            object,
            offset,
            length: data.len(),
        });

        let (access, entry) = state.resolve(share, object)?;
        if !access.allows_write() {
            return Err(TransportError::AccessDenied);
        }

        match entry {
            MemObject::File(contents) => {
                let start = to_index(offset)?;
                let end = start + accepted;
                if contents.len() < end {
                    contents.resize(end, 0);
                }
                contents[start..end].copy_from_slice(&data[..accepted]);
            }
            MemObject::Pipe(pending) => pending.extend(&data[..accepted]),
        }

        Ok(accepted)
    }

    async fn flush(&self, share: ShareId, object: ObjectId) -> TransportResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Flush(object));

        state.resolve(share, object)?;
        if self.limits.fail_flush {
            return Err(TransportError::Io("flush failed".to_owned()));
        }

        Ok(())
    }

    async fn close(&self, share: ShareId, object: ObjectId) -> TransportResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Close(object));

        let owned = state.open.get(&object).is_some_and(|o| o.share == share);
        if !owned {
            return Err(TransportError::InvalidHandle);
        }

        state.open.remove(&object);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::FileAccessMask;

    fn read_params() -> CreateParams {
        CreateParams {
            desired_access: FileAccessMask::FILE_READ_DATA,
            create_disposition: CreateDisposition::Open,
            ..Default::default()
        }
    }

    fn write_params() -> CreateParams {
        CreateParams {
            desired_access: FileAccessMask::GENERIC_READ | FileAccessMask::GENERIC_WRITE,
            create_disposition: CreateDisposition::OpenIf,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_short_reads_and_writes() {
        let transport = MemTransport::new()
            .with_file("docs", "a\\b.txt", b"0123456789".to_vec())
            .with_limits(TransferLimits {
                max_read: Some(4),
                max_write: Some(3),
                ..Default::default()
            });

        let share = transport.tree_connect("\\\\host\\docs").await.unwrap();
        let reply = transport.create(share, "a/b.txt", write_params()).await.unwrap();
        assert_eq!(reply.metadata.end_of_file, 10);
        assert_eq!(reply.metadata.allocation_size, ALLOCATION_UNIT);

        let read = transport.read(share, reply.object_id, 2, 100).await.unwrap();
        assert_eq!(read.data, b"2345");
        assert_eq!(read.remaining, 4);

        let written = transport
            .write(share, reply.object_id, b"abcdef", 8)
            .await
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            transport.contents("docs", "a\\b.txt").await.unwrap(),
            b"01234567abc"
        );
    }

    #[tokio::test]
    async fn test_open_missing_and_denied_write() {
        let transport = MemTransport::new().with_file("docs", "present", b"x".to_vec());
        let share = transport.tree_connect("docs").await.unwrap();

        let missing = transport.create(share, "absent", read_params()).await;
        assert!(matches!(missing, Err(TransportError::ObjectNotFound(_))));

        let reply = transport.create(share, "present", read_params()).await.unwrap();
        let denied = transport.write(share, reply.object_id, b"y", 0).await;
        assert_eq!(denied, Err(TransportError::AccessDenied));

        assert_eq!(
            transport.tree_connect("elsewhere").await,
            Err(TransportError::ShareNotFound("elsewhere".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_pipe_drains_pending_bytes() {
        let transport = MemTransport::new().with_pipe("IPC$", "srvsvc", b"hello".to_vec());
        let share = transport.tree_connect("IPC$").await.unwrap();
        let reply = transport.create(share, "srvsvc", write_params()).await.unwrap();
        assert_eq!(reply.metadata.end_of_file, 0);

        let first = transport.read(share, reply.object_id, 0, 3).await.unwrap();
        assert_eq!(first.data, b"hel");
        assert_eq!(first.remaining, 2);

        transport.write(share, reply.object_id, b"!", 0).await.unwrap();
        assert_eq!(transport.contents("IPC$", "srvsvc").await.unwrap(), b"lo!");
    }

    #[tokio::test]
    async fn test_close_releases_handle() {
        let transport = MemTransport::new().with_file("docs", "f", Vec::new());
        let share = transport.tree_connect("docs").await.unwrap();
        let reply = transport.create(share, "f", read_params()).await.unwrap();
        assert_eq!(transport.open_objects().await, 1);

        transport.close(share, reply.object_id).await.unwrap();
        assert_eq!(transport.open_objects().await, 0);
        assert_eq!(
            transport.close(share, reply.object_id).await,
            Err(TransportError::InvalidHandle)
        );
        assert_eq!(transport.calls().await.len(), 4);
    }
}
