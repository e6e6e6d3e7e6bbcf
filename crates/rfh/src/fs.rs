//! Remote file module
//!
//! [`RemoteFile`] is the handle; the free functions here open, use and close one in a
//! single call.

mod error;
mod mode;
mod path;
mod remote_file;

use rfh_core::Transport;

pub use error::{FileError, FileResult};
pub use mode::{OpenMode, ReadSize, Whence};
pub use path::UncPath;
pub use remote_file::{HandleOptions, RemoteFile};

/// Read the whole contents of a remote file.
///
/// This can be used in place of opening a file, reading and then closing it.
pub async fn read<T>(connection: &T, path: &str) -> FileResult<Vec<u8>>
where
    T: Transport + ?Sized,
{
    let mut file = RemoteFile::from_unc_path(path)?;
    file.open(connection, OpenMode::Read).await?;

    let contents = file.read(ReadSize::Rest).await;
    let closed = file.close().await;

    let contents = contents?.unwrap_or_default();
    closed?;

    Ok(contents)
}

/// Read the contents of a remote file to a string.
pub async fn read_to_string<T>(connection: &T, path: &str) -> FileResult<String>
where
    T: Transport + ?Sized,
{
    let contents = read(connection, path).await?;

    String::from_utf8(contents).map_err(|e| FileError::InvalidData(e.to_string()))
}

/// Write `contents` to the start of a remote file, creating it if needed.
///
/// An existing file is overwritten from offset 0 but not truncated, so bytes past the
/// end of `contents` are kept.
pub async fn write<T>(connection: &T, path: &str, contents: &[u8]) -> FileResult<usize>
where
    T: Transport + ?Sized,
{
    let mut file = RemoteFile::from_unc_path(path)?;
    file.open(connection, OpenMode::Write).await?;

    let written = file.write(contents).await;
    let closed = file.close().await;

    let written = written?;
    closed?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use rfh_core::mem::MemTransport;

    use super::*;

    #[tokio::test]
    async fn test_read_to_string() {
        let transport =
            MemTransport::new().with_file("docs", "notes\\todo.txt", b"buy milk".to_vec());

        let contents = read_to_string(&transport, "\\\\host\\docs\\notes\\todo.txt")
            .await
            .unwrap();

        assert_eq!(contents, "buy milk");
        assert_eq!(transport.open_objects().await, 0);
    }

    #[tokio::test]
    async fn test_read_to_string_rejects_invalid_utf8() {
        let transport = MemTransport::new().with_file("docs", "blob", vec![0xff, 0xfe]);

        let res = read_to_string(&transport, "docs\\blob").await;

        assert!(matches!(res, Err(FileError::InvalidData(_))));
        assert_eq!(transport.open_objects().await, 0);
    }

    #[tokio::test]
    async fn test_write_keeps_tail() {
        let transport = MemTransport::new().with_file("docs", "f.txt", b"0123456789".to_vec());

        let written = write(&transport, "docs/f.txt", b"abc").await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            transport.contents("docs", "f.txt").await.unwrap(),
            b"abc3456789"
        );

        write(&transport, "docs/new.txt", b"fresh").await.unwrap();
        assert_eq!(read(&transport, "docs/new.txt").await.unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let transport = MemTransport::new().with_share("docs");

        let res = read(&transport, "docs\\absent").await;

        assert!(matches!(
            res,
            Err(FileError::Transport(rfh_core::TransportError::ObjectNotFound(_)))
        ));
    }
}
