mod args;

use std::io::{self, Write};
use std::net::SocketAddrV4;
use std::path::Path;

use args::{ClientArgs, Command};
use clap::Parser;
use rfh::defaults::COPY_CHUNK_SIZE;
use rfh::fs::{OpenMode, ReadSize, RemoteFile, Whence};
use rfh::middleware::ContextManager;
use rfh::Transport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::main]
async fn main() -> io::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "INFO");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_env("RUST_LOG")
        .init();

    let args = ClientArgs::parse();
    let manager = ContextManager::new(
        args.listen_address,
        SocketAddrV4::new(args.target, args.port),
        args.request_timeout.into(),
        args.num_retries,
    )
    .await?;

    log::info!("connected to {}", manager.target());

    match args.command {
        Command::Cat {
            path,
            offset,
            length,
        } => cat(&manager, &path, offset, length).await,
        Command::Get { path, local } => get(&manager, &path, &local).await,
        Command::Put { local, path } => put(&manager, &local, &path).await,
        Command::Stat { path } => stat(&manager, &path).await,
    }
}

/// Print a span of a remote file to stdout.
async fn cat<T: Transport>(
    connection: &T,
    path: &str,
    offset: Option<u64>,
    length: Option<usize>,
) -> io::Result<()> {
    let mut file = RemoteFile::from_unc_path(path)?;
    file.open(connection, OpenMode::Read).await?;

    if let Some(offset) = offset {
        let offset = i64::try_from(offset)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        file.seek(offset, Whence::Start)?;
    }

    let size = match length {
        Some(n) => ReadSize::Bytes(n),
        None => ReadSize::Rest,
    };
    let contents = file.read(size).await;
    file.close().await?;

    if let Some(contents) = contents? {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&contents)?;
        stdout.flush()?;
    }

    Ok(())
}

/// Copy a remote file to `local`, one chunk at a time.
async fn get<T: Transport>(connection: &T, path: &str, local: &Path) -> io::Result<()> {
    let mut file = RemoteFile::from_unc_path(path)?;
    file.open(connection, OpenMode::Read).await?;

    let mut out = tokio::fs::File::create(local).await?;
    let mut copied = 0;

    let res = async {
        while let Some(chunk) = file.read(COPY_CHUNK_SIZE).await? {
            out.write_all(&chunk).await?;
            copied += chunk.len();
            log::debug!("copied {} of {} bytes", copied, file.size());
        }
        out.flush().await?;

        io::Result::Ok(())
    }
    .await;

    file.close().await?;
    res?;

    log::info!("copied {} bytes from {} to {:?}", copied, path, local);

    Ok(())
}

/// Copy `local` to a remote file, one chunk at a time.
async fn put<T: Transport>(connection: &T, local: &Path, path: &str) -> io::Result<()> {
    let mut input = tokio::fs::File::open(local).await?;

    let mut file = RemoteFile::from_unc_path(path)?;
    file.open(connection, OpenMode::Write).await?;

    let mut buf = vec![0_u8; COPY_CHUNK_SIZE];
    let res = async {
        loop {
            let size = input.read(&mut buf).await?;
            if size == 0 {
                break;
            }
            file.write(&buf[..size]).await?;
        }

        io::Result::Ok(file.position())
    }
    .await;

    file.close().await?;
    let copied = res?;

    log::info!("copied {} bytes from {:?} to {}", copied, local, path);

    Ok(())
}

/// Print the metadata of a remote file.
async fn stat<T: Transport>(connection: &T, path: &str) -> io::Result<()> {
    let mut file = RemoteFile::from_unc_path(path)?;
    file.open(connection, OpenMode::Read).await?;

    print!("{}", file);

    file.close().await?;

    Ok(())
}
