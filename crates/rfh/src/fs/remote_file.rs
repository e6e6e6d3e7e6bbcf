//! The remote file handle.

use std::fmt::{Debug, Display};
use std::time::{Duration, SystemTime};

use rfh_core::{FileAttributes, FileMetadata, ObjectId, ShareId, Transport, TransportError};

use super::{FileError, FileResult, OpenMode, ReadSize, UncPath, Whence};
use crate::defaults;

/// Tuning knobs of a single handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleOptions {
    /// Consecutive transport calls that move no bytes before a read or write gives up.
    pub max_stalled_transfers: u32,

    /// Bytes requested by [`ReadSize::Rest`] on a stream handle.
    pub stream_read_size: usize,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            max_stalled_transfers: defaults::MAX_STALLED_TRANSFERS,
            stream_read_size: defaults::STREAM_READ_SIZE,
        }
    }
}

/// A file that resides over the network in the remote.
///
/// The handle offers read/write/seek/flush/close over a [`Transport`] whose reads and
/// writes may complete partially. Regular files keep a position that every read and
/// write advances. Stream handles (see [`OpenMode::is_stream`]) have no position: every
/// read or write is a single transport call whose result is returned as-is.
///
/// The size is taken from the remote when the file is opened and is not refreshed by
/// writes.
///
/// ```no_run
/// # async fn example(transport: &rfh::mem::MemTransport) -> rfh::fs::FileResult<()> {
/// use rfh::fs::{OpenMode, ReadSize, RemoteFile};
///
/// let mut file = RemoteFile::from_unc_path("docs\\notes.txt")?;
/// file.open(transport, OpenMode::Read).await?;
/// let contents = file.read(ReadSize::Rest).await?;
/// file.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct RemoteFile<'a, T: Transport + ?Sized> {
    connection: Option<&'a T>,
    unc: UncPath,

    share_id: Option<ShareId>,
    object_id: Option<ObjectId>,
    mode: Option<OpenMode>,
    metadata: FileMetadata,

    size: u64,
    position: u64,

    options: HandleOptions,
}

impl<'a, T> RemoteFile<'a, T>
where
    T: Transport + ?Sized,
{
    /// Create a handle for a `share\relative\path` or `\\host\share\relative\path`.
    ///
    /// Nothing is sent to the remote until [`Self::open`].
    pub fn from_unc_path(path: &str) -> FileResult<Self> {
        Ok(Self::from(path.parse::<UncPath>()?))
    }

    /// Replace the handle's tuning options.
    pub fn with_options(mut self, options: HandleOptions) -> Self {
        self.options = options;

        self
    }

    /// Open the file on `connection`.
    ///
    /// The share is connected on the first open and reused afterwards, as long as the
    /// same connection is used.
    pub async fn open(&mut self, connection: &'a T, mode: OpenMode) -> FileResult<()> {
        if self.object_id.is_some() {
            return Err(FileError::AlreadyOpen);
        }

        // a share id is only meaningful to the connection that issued it
        if !self.connection.is_some_and(|c| std::ptr::eq(c, connection)) {
            self.share_id = None;
        }

        let share_id = match self.share_id {
            Some(id) => id,
            None => {
                let id = connection.tree_connect(self.unc.share()).await?;
                log::debug!("connected to share {} as {:?}", self.unc.share(), id);
                self.share_id = Some(id);
                id
            }
        };

        let reply = connection
            .create(share_id, self.unc.path(), mode.create_params())
            .await?;

        log::debug!(
            "opened {} in mode {} as {:?}, size {}",
            self.unc,
            mode,
            reply.object_id,
            reply.metadata.end_of_file
        );

        self.connection = Some(connection);
        self.object_id = Some(reply.object_id);
        self.mode = Some(mode);
        self.size = reply.metadata.end_of_file;
        self.position = 0;
        self.metadata = reply.metadata;

        Ok(())
    }

    /// Parse `mode` and open the file.
    ///
    /// The mode is validated before anything is sent to the remote.
    pub async fn open_with(&mut self, connection: &'a T, mode: &str) -> FileResult<()> {
        let mode = mode.parse::<OpenMode>()?;

        self.open(connection, mode).await
    }

    /// Move the position and return the new one.
    ///
    /// From [`Whence::Start`], any position within `0..=size` is reachable. Relative
    /// seeks from [`Whence::Current`] and [`Whence::End`] must land strictly inside the
    /// file, so neither `0` nor `size` is reachable that way.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> FileResult<u64> {
        self.session()?;
        if self.is_stream() {
            return Err(FileError::NotSeekable);
        }

        let size = i128::from(self.size);
        let out_of_range = || FileError::SeekRange {
            offset,
            whence,
            size: self.size,
        };

        let target = match whence {
            Whence::Start => {
                let target = i128::from(offset);
                if target < 0 || target > size {
                    return Err(out_of_range());
                }
                target
            }
            Whence::Current | Whence::End => {
                let base = match whence {
                    Whence::Current => i128::from(self.position),
                    _ => size,
                };
                let target = base + i128::from(offset);
                if !(0 < target && target < size) {
                    return Err(out_of_range());
                }
                target
            }
        };

        // target lies within 0..=size
        self.position = target as u64;

        Ok(self.position)
    }

    /// Read from the current position.
    ///
    /// Returns `None` when a [`ReadSize::Bytes`] read starts at the end of the file.
    /// Reads are clamped to the end of the file, so a regular file yields exactly
    /// `min(n, size - position)` bytes and [`ReadSize::Rest`] yields `size - position`
    /// bytes.
    ///
    /// Stream handles make one transport call and return whatever it produced.
    pub async fn read(&mut self, size: impl Into<ReadSize>) -> FileResult<Option<Vec<u8>>> {
        let size = size.into();
        if size == ReadSize::Bytes(0) {
            return Err(FileError::InvalidArgument("cannot read 0 bytes".to_owned()));
        }

        self.session()?;

        if self.is_stream() {
            let length = match size {
                ReadSize::Rest => self.options.stream_read_size,
                ReadSize::Bytes(n) => n,
            };

            return self.raw_read(length, self.position).await.map(Some);
        }

        let remaining = self.size.saturating_sub(self.position);
        let length = match size {
            ReadSize::Rest => remaining,
            ReadSize::Bytes(_) if remaining == 0 => return Ok(None),
            ReadSize::Bytes(n) => remaining.min(n as u64),
        };

        if length == 0 {
            return Ok(Some(Vec::new()));
        }

        let length = usize::try_from(length).map_err(|_| {
            FileError::InvalidArgument(format!("cannot buffer {} bytes in memory", length))
        })?;

        let data = self.raw_read(length, self.position).await?;
        self.position += data.len() as u64;

        Ok(Some(data))
    }

    /// Write all of `data` at the current position, returning the bytes written.
    ///
    /// Regular files advance the position by the bytes written. Stream handles make a
    /// single transport call and report what it accepted.
    pub async fn write(&mut self, data: &[u8]) -> FileResult<usize> {
        let written = self.raw_write(data, self.position).await?;

        if !self.is_stream() {
            self.position += written as u64;
        }

        Ok(written)
    }

    /// Force written data to durable storage. Does nothing for read handles.
    pub async fn flush(&mut self) -> FileResult<()> {
        let (connection, share, object) = self.session()?;

        if self.mode.is_some_and(OpenMode::is_read) {
            return Ok(());
        }

        connection.flush(share, object).await?;

        Ok(())
    }

    /// Flush, then release the remote object.
    ///
    /// The handle can be opened again afterwards. Closing a handle that is not open
    /// fails with [`FileError::NotOpen`].
    pub async fn close(&mut self) -> FileResult<()> {
        let flushed = self.flush().await;
        let (connection, share, object) = self.session()?;

        // the object id is released even if the flush failed
        self.object_id = None;
        connection.close(share, object).await?;

        log::debug!("closed {} ({:?})", self.unc, object);

        flushed
    }

    /// Read `size` bytes at `offset` from the remote.
    ///
    /// Regular files are read until exactly `size` bytes have accumulated; each call
    /// asks for what is still missing, right after what already arrived. Stream handles
    /// get a single call.
    async fn raw_read(&self, size: usize, offset: u64) -> FileResult<Vec<u8>> {
        let (connection, share, object) = self.session()?;

        if self.is_stream() {
            let reply = connection.read(share, object, offset, size).await?;
            log::trace!("stream read of {} returned {} bytes", size, reply.data.len());

            return Ok(reply.data);
        }

        let mut buffer = Vec::with_capacity(size);
        let mut stalled = 0;

        while buffer.len() < size {
            let missing = size - buffer.len();
            let reply = connection
                .read(share, object, offset + buffer.len() as u64, missing)
                .await?;

            log::trace!(
                "read {} of {} missing bytes at {}",
                reply.data.len(),
                missing,
                offset + buffer.len() as u64
            );

            if reply.data.is_empty() {
                stalled += 1;
                log::warn!("read of {} made no progress ({} in a row)", self.unc, stalled);

                if stalled >= self.options.max_stalled_transfers.max(1) {
                    return Err(TransportError::Stalled { attempts: stalled }.into());
                }
                continue;
            }

            stalled = 0;
            buffer.extend_from_slice(&reply.data);
        }

        // the last reply may carry more than asked for
        buffer.truncate(size);

        Ok(buffer)
    }

    /// Write all of `data` at `offset` on the remote, returning the bytes written.
    ///
    /// The position within `data` and the position within the remote file advance
    /// together but are tracked separately. Stream handles get a single call.
    async fn raw_write(&self, data: &[u8], offset: u64) -> FileResult<usize> {
        let (connection, share, object) = self.session()?;

        if data.is_empty() {
            return Ok(0);
        }

        if self.is_stream() {
            let written = connection.write(share, object, data, offset).await?;
            log::trace!("stream write of {} accepted {} bytes", data.len(), written);

            return Ok(written);
        }

        let mut buffer_cursor = 0;
        let mut file_offset = offset;
        let mut stalled = 0;

        while buffer_cursor < data.len() {
            let pending = &data[buffer_cursor..];
            let written = connection.write(share, object, pending, file_offset).await?;

            log::trace!(
                "wrote {} of {} pending bytes at {}",
                written,
                pending.len(),
                file_offset
            );

            if written > pending.len() {
                return Err(TransportError::Protocol(format!(
                    "remote accepted {} bytes of a {} byte write",
                    written,
                    pending.len()
                ))
                .into());
            }

            if written == 0 {
                stalled += 1;
                log::warn!("write to {} made no progress ({} in a row)", self.unc, stalled);

                if stalled >= self.options.max_stalled_transfers.max(1) {
                    return Err(TransportError::Stalled { attempts: stalled }.into());
                }
                continue;
            }

            stalled = 0;
            buffer_cursor += written;
            file_offset += written as u64;
        }

        Ok(buffer_cursor)
    }

    /// The connection, share and object of an open handle.
    fn session(&self) -> FileResult<(&'a T, ShareId, ObjectId)> {
        match (self.connection, self.share_id, self.object_id) {
            (Some(connection), Some(share), Some(object)) => Ok((connection, share, object)),
            _ => Err(FileError::NotOpen),
        }
    }

    /// Share path, `share` or `\\host\share`.
    pub fn share_path(&self) -> &str {
        self.unc.share()
    }

    /// Path of the file relative to the share root.
    pub fn full_path(&self) -> &str {
        self.unc.path()
    }

    /// Last component of the path.
    pub fn name(&self) -> &str {
        self.unc.name()
    }

    /// Size reported by the remote when the file was opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Mode of the current or last open.
    pub fn mode(&self) -> Option<OpenMode> {
        self.mode
    }

    pub fn is_stream(&self) -> bool {
        self.mode.is_some_and(OpenMode::is_stream)
    }

    pub fn is_open(&self) -> bool {
        self.object_id.is_some()
    }

    pub fn share_id(&self) -> Option<ShareId> {
        self.share_id
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.object_id
    }

    pub fn allocation_size(&self) -> u64 {
        self.metadata.allocation_size
    }

    pub fn attributes(&self) -> FileAttributes {
        self.metadata.attributes
    }

    pub fn creation_time(&self) -> Option<SystemTime> {
        self.metadata.creation_time
    }

    pub fn last_access_time(&self) -> Option<SystemTime> {
        self.metadata.last_access_time
    }

    pub fn last_write_time(&self) -> Option<SystemTime> {
        self.metadata.last_write_time
    }

    pub fn change_time(&self) -> Option<SystemTime> {
        self.metadata.change_time
    }

    pub fn options(&self) -> HandleOptions {
        self.options
    }
}

impl<'a, T> From<UncPath> for RemoteFile<'a, T>
where
    T: Transport + ?Sized,
{
    fn from(unc: UncPath) -> Self {
        Self {
            connection: None,
            unc,
            share_id: None,
            object_id: None,
            mode: None,
            metadata: Default::default(),
            size: 0,
            position: 0,
            options: Default::default(),
        }
    }
}

impl<'a, T> Debug for RemoteFile<'a, T>
where
    T: Transport + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("unc", &self.unc)
            .field("share_id", &self.share_id)
            .field("object_id", &self.object_id)
            .field("mode", &self.mode)
            .field("size", &self.size)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

/// Human-readable dump of the handle's metadata.
impl<'a, T> Display for RemoteFile<'a, T>
where
    T: Transport + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn time(t: Option<SystemTime>) -> String {
            t.filter(|t| is_formattable(*t))
                .map(|t| humantime::format_rfc3339(t).to_string())
                .unwrap_or_else(|| "-".to_owned())
        }

        writeln!(f, "===== FILE =====")?;
        writeln!(f, "share_path : {}", self.share_path())?;
        writeln!(f, "full_path : {}", self.full_path())?;
        writeln!(f, "name : {}", self.name())?;
        writeln!(f, "size : {}", self.size)?;
        writeln!(f, "allocation_size : {}", self.metadata.allocation_size)?;
        writeln!(f, "attributes : {:#x}", self.metadata.attributes.bits())?;
        writeln!(f, "creation_time : {}", time(self.metadata.creation_time))?;
        writeln!(f, "last_access_time : {}", time(self.metadata.last_access_time))?;
        writeln!(f, "last_write_time : {}", time(self.metadata.last_write_time))?;
        writeln!(f, "change_time : {}", time(self.metadata.change_time))?;
        writeln!(
            f,
            "mode : {}",
            self.mode.map(|m| m.to_string()).unwrap_or_else(|| "-".to_owned())
        )?;
        writeln!(f, "is_stream : {}", self.is_stream())?;
        writeln!(f, "share_id : {:?}", self.share_id)?;
        writeln!(f, "object_id : {:?}", self.object_id)
    }
}

/// RFC 3339 only covers the years 1970 through 9999.
fn is_formattable(t: SystemTime) -> bool {
    const YEAR_10000: Duration = Duration::from_secs(253_402_300_800);

    t.duration_since(SystemTime::UNIX_EPOCH)
        .is_ok_and(|since| since < YEAR_10000)
}
