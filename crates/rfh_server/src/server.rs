//! Server definition and implementations

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;
use rfh_core::{
    share_name, CreateDisposition, CreateOptions, CreateParams, CreateReply, FileAccessMask,
    FileAttributes, FileMetadata, ObjectId, ReadReply, ShareId, Transport, TransportError,
    TransportResult,
};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Allocation granularity reported for files.
const ALLOCATION_UNIT: u64 = 4096;

/// A file opened on behalf of a client.
#[derive(Debug)]
struct OpenFile {
    share: ShareId,
    path: PathBuf,
    access: FileAccessMask,
    file: Arc<Mutex<File>>,
}

#[derive(Debug, Default)]
struct ServerState {
    connected: HashMap<ShareId, String>,
    open: HashMap<ObjectId, OpenFile>,
    next_share: u32,
    next_object: u64,
}

/// A transport that exports local directories as shares.
///
/// The server has access to all files seen within a share's directory, and to nothing
/// outside of it.
#[derive(Debug)]
pub struct DirTransport {
    /// Share name to the directory it exports.
    shares: HashMap<String, PathBuf>,

    /// Max bytes moved by a single read or write.
    max_transfer: Option<usize>,

    state: Mutex<ServerState>,
}

impl DirTransport {
    pub fn new() -> Self {
        Self {
            shares: Default::default(),
            max_transfer: None,
            state: Default::default(),
        }
    }

    /// Export `dir` as the share `name`.
    pub fn with_share<P: AsRef<Path>>(mut self, name: &str, dir: P) -> std::io::Result<Self> {
        let base = dir.as_ref().canonicalize()?;
        log::debug!("exporting {:?} as share {}", base, name);

        self.shares.insert(name.to_owned(), base);

        Ok(self)
    }

    /// Cap every read and write at `max` bytes.
    pub fn with_max_transfer(mut self, max: Option<usize>) -> Self {
        self.max_transfer = max.map(|m| m.max(1));

        self
    }

    /// Checks if a provided path contains prev-dir path segments `..`.
    /// Paths are not resolved at the OS-level, as they might not exist yet.
    ///
    /// This prevents out-of-dir accesses, such as when the path is `../../some_path`.
    fn contains_backdir<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .components()
            .any(|segment| segment == std::path::Component::ParentDir)
    }

    /// Resolve a share-relative object path to a full path under `base`.
    ///
    /// Paths with 'backdirs' will not be resolved, and will return `None`.
    fn resolve_path(base: &Path, path: &str) -> Option<PathBuf> {
        let mut full_path = base.to_path_buf();
        full_path.extend(
            path.split(['\\', '/'])
                .filter(|segment| !segment.is_empty() && *segment != "."),
        );

        match Self::contains_backdir(&full_path) {
            true => None,
            false => Some(full_path),
        }
    }

    fn transfer_cap(&self, length: usize) -> usize {
        self.max_transfer.map_or(length, |cap| length.min(cap))
    }

    /// Looks up an open file, checking it belongs to `share`.
    async fn lookup(
        &self,
        share: ShareId,
        object: ObjectId,
    ) -> TransportResult<(FileAccessMask, Arc<Mutex<File>>)> {
        let state = self.state.lock().await;

        state
            .open
            .get(&object)
            .filter(|o| o.share == share)
            .map(|o| (o.access, o.file.clone()))
            .ok_or(TransportError::InvalidHandle)
    }
}

impl Default for DirTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for opening a file with the given disposition and access.
fn open_options(params: &CreateParams) -> OpenOptions {
    let write = params.desired_access.allows_write();
    let mut options = OpenOptions::new();
    options
        .read(params.desired_access.allows_read() || !write)
        .write(write);

    match params.create_disposition {
        CreateDisposition::Open => options.create(false),
        CreateDisposition::Create => options.create_new(true),
        CreateDisposition::OpenIf => options.create(true),
        CreateDisposition::Overwrite => options.truncate(true),
        CreateDisposition::Supersede | CreateDisposition::OverwriteIf => {
            options.create(true).truncate(true)
        }
    };

    options
}

/// Metadata reported for a local file.
fn metadata_of(meta: &std::fs::Metadata) -> FileMetadata {
    let mut attributes = match meta.is_dir() {
        true => FileAttributes::DIRECTORY,
        false => FileAttributes::NORMAL,
    };
    if meta.permissions().readonly() {
        attributes = attributes | FileAttributes::READONLY;
    }

    let modified = meta.modified().ok();

    FileMetadata {
        end_of_file: meta.len(),
        allocation_size: meta.len().div_ceil(ALLOCATION_UNIT) * ALLOCATION_UNIT,
        attributes,
        creation_time: meta.created().ok(),
        last_access_time: meta.accessed().ok(),
        last_write_time: modified,
        change_time: modified,
    }
}

#[async_trait]
impl Transport for DirTransport {
    async fn tree_connect(&self, share_path: &str) -> TransportResult<ShareId> {
        let name = share_name(share_path);
        if !self.shares.contains_key(name) {
            log::error!("no share named {:?}", name);
            return Err(TransportError::ShareNotFound(share_path.to_owned()));
        }

        let mut state = self.state.lock().await;
        state.next_share += 1;
        let id = ShareId(state.next_share);
        state.connected.insert(id, name.to_owned());

        log::info!("share {} connected as {:?}", name, id);

        Ok(id)
    }

    async fn create(
        &self,
        share: ShareId,
        path: &str,
        params: CreateParams,
    ) -> TransportResult<CreateReply> {
        let name = self
            .state
            .lock()
            .await
            .connected
            .get(&share)
            .cloned()
            .ok_or(TransportError::InvalidHandle)?;

        let base = self
            .shares
            .get(&name)
            .ok_or_else(|| TransportError::ShareNotFound(name.clone()))?;

        let full_path = match Self::resolve_path(base, path) {
            Some(p) => p,
            None => {
                log::error!("rejected path outside of share {}: {:?}", name, path);
                return Err(TransportError::AccessDenied);
            }
        };

        log::debug!("opening {:?} with {:?}", full_path, params.create_disposition);

        let file = open_options(&params).open(&full_path).await.map_err(|e| {
            log::error!("failed to open {:?}: {}", full_path, e);
            match e.kind() {
                std::io::ErrorKind::NotFound => TransportError::ObjectNotFound(path.to_owned()),
                _ => TransportError::from(e),
            }
        })?;

        let meta = file.metadata().await?;
        if meta.is_dir()
            && params
                .create_options
                .contains(CreateOptions::FILE_NON_DIRECTORY_FILE)
        {
            return Err(TransportError::Io(format!("{} is a directory", path)));
        }

        let mut state = self.state.lock().await;
        state.next_object += 1;
        let object_id = ObjectId(state.next_object);
        state.open.insert(
            object_id,
            OpenFile {
                share,
                path: full_path,
                access: params.desired_access,
                file: Arc::new(Mutex::new(file)),
            },
        );

        Ok(CreateReply {
            object_id,
            metadata: metadata_of(&meta),
        })
    }

    async fn read(
        &self,
        share: ShareId,
        object: ObjectId,
        offset: u64,
        length: usize,
    ) -> TransportResult<ReadReply> {
        let (access, file) = self.lookup(share, object).await?;
        if !access.allows_read() {
            return Err(TransportError::AccessDenied);
        }

        let mut file = file.lock().await;
        let len = file.metadata().await?.len();

        let mut buf = vec![0_u8; self.transfer_cap(length)];
        file.seek(SeekFrom::Start(offset)).await?;
        let size = file.read(&mut buf).await?;
        buf.truncate(size);

        log::trace!("read {} of {} bytes at {} from {:?}", size, length, offset, object);

        Ok(ReadReply {
            data: buf,
            remaining: len.saturating_sub(offset + size as u64),
        })
    }

    async fn write(
        &self,
        share: ShareId,
        object: ObjectId,
        data: &[u8],
        offset: u64,
    ) -> TransportResult<usize> {
        let (access, file) = self.lookup(share, object).await?;
        if !access.allows_write() {
            return Err(TransportError::AccessDenied);
        }

        let chunk = &data[..self.transfer_cap(data.len())];

        let mut file = file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        let written = file.write(chunk).await?;

        log::trace!("wrote {} of {} bytes at {} to {:?}", written, data.len(), offset, object);

        Ok(written)
    }

    async fn flush(&self, share: ShareId, object: ObjectId) -> TransportResult<()> {
        let (_, file) = self.lookup(share, object).await?;

        let mut file = file.lock().await;
        file.flush().await?;
        file.sync_data().await?;

        Ok(())
    }

    async fn close(&self, share: ShareId, object: ObjectId) -> TransportResult<()> {
        let mut state = self.state.lock().await;

        let owned = state.open.get(&object).is_some_and(|o| o.share == share);
        if !owned {
            return Err(TransportError::InvalidHandle);
        }

        if let Some(closed) = state.open.remove(&object) {
            log::debug!("closed {:?} ({:?})", closed.path, object);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rfh::fs::{self, FileError, OpenMode, ReadSize, RemoteFile};

    use super::*;

    fn share_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello world").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("nested.txt"), b"nested").unwrap();

        dir
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/srv/docs");

        assert_eq!(
            DirTransport::resolve_path(base, "sub\\nested.txt"),
            Some(PathBuf::from("/srv/docs/sub/nested.txt"))
        );
        assert_eq!(
            DirTransport::resolve_path(base, "./a/b"),
            Some(PathBuf::from("/srv/docs/a/b"))
        );
        assert_eq!(DirTransport::resolve_path(base, "..\\secret"), None);
        assert_eq!(DirTransport::resolve_path(base, "a/../../b"), None);
    }

    #[tokio::test]
    async fn test_read_local_file() {
        let dir = share_dir();
        let transport = DirTransport::new().with_share("docs", dir.path()).unwrap();

        let contents = fs::read_to_string(&transport, "\\\\server\\docs\\sub\\nested.txt")
            .await
            .unwrap();

        assert_eq!(contents, "nested");
    }

    #[tokio::test]
    async fn test_short_transfers_round_trip() {
        let dir = share_dir();
        let transport = DirTransport::new()
            .with_share("docs", dir.path())
            .unwrap()
            .with_max_transfer(Some(7));

        let payload = (0..1000u32).map(|i| (i % 97) as u8).collect::<Vec<_>>();

        let mut file = RemoteFile::from_unc_path("docs\\out.bin").unwrap();
        file.open(&transport, OpenMode::Write).await.unwrap();
        assert_eq!(file.write(&payload).await.unwrap(), payload.len());
        file.close().await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("out.bin")).unwrap(), payload);

        file.open(&transport, OpenMode::Read).await.unwrap();
        assert_eq!(file.size(), 1000);
        let contents = file.read(ReadSize::Rest).await.unwrap().unwrap();
        assert_eq!(contents, payload);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_errors() {
        let dir = share_dir();
        let transport = DirTransport::new().with_share("docs", dir.path()).unwrap();

        let res = fs::read(&transport, "docs\\absent.txt").await;
        assert!(matches!(
            res,
            Err(FileError::Transport(TransportError::ObjectNotFound(_)))
        ));

        let res = fs::read(&transport, "docs\\..\\escape.txt").await;
        assert!(matches!(
            res,
            Err(FileError::Transport(TransportError::AccessDenied))
        ));

        let res = fs::read(&transport, "docs\\sub").await;
        assert!(matches!(res, Err(FileError::Transport(TransportError::Io(_)))));

        let res = fs::read(&transport, "other\\hello.txt").await;
        assert!(matches!(
            res,
            Err(FileError::Transport(TransportError::ShareNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_read_handle_cannot_write() {
        let dir = share_dir();
        let transport = DirTransport::new().with_share("docs", dir.path()).unwrap();

        let mut file = RemoteFile::from_unc_path("docs\\hello.txt").unwrap();
        file.open(&transport, OpenMode::Read).await.unwrap();

        let res = file.write(b"nope").await;
        assert!(matches!(
            res,
            Err(FileError::Transport(TransportError::AccessDenied))
        ));

        file.close().await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("hello.txt")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn test_close_releases_object() {
        let dir = share_dir();
        let transport = DirTransport::new().with_share("docs", dir.path()).unwrap();

        let share = transport.tree_connect("docs").await.unwrap();
        let reply = transport
            .create(share, "hello.txt", OpenMode::Read.create_params())
            .await
            .unwrap();
        assert_eq!(reply.metadata.end_of_file, 11);

        transport.close(share, reply.object_id).await.unwrap();
        assert_eq!(
            transport.read(share, reply.object_id, 0, 5).await,
            Err(TransportError::InvalidHandle)
        );
    }
}
