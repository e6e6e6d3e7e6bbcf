//! Remote file handles over the UDP middleware, against an in-memory remote.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use rfh::fs::{self, FileError, OpenMode, ReadSize, RemoteFile, Whence};
use rfh::mem::MemTransport;
use rfh::middleware::{ContextManager, Dispatcher, MAX_TRANSFER_SIZE};
use rfh::TransportError;

async fn bind(transport: MemTransport) -> Dispatcher<MemTransport> {
    let _ = pretty_env_logger::try_init();

    Dispatcher::new(
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
        transport,
        false,
        Duration::from_secs(2),
    )
    .await
    .unwrap()
}

async fn serve(
    dispatcher: Dispatcher<MemTransport>,
    timeout: Duration,
    retries: u8,
) -> ContextManager {
    let addr = dispatcher.local_addr().unwrap();

    tokio::spawn(async move { dispatcher.dispatch().await });

    ContextManager::new(Ipv4Addr::LOCALHOST, addr, timeout, retries)
        .await
        .unwrap()
}

async fn connect(transport: MemTransport) -> ContextManager {
    serve(bind(transport).await, Duration::from_millis(500), 3).await
}

#[tokio::test]
async fn test_large_file_round_trip() {
    let ctx = connect(MemTransport::new().with_share("docs")).await;

    // several transfers worth in each direction
    let payload = (0..(MAX_TRANSFER_SIZE * 2 + 12_345))
        .map(|i| (i % 253) as u8)
        .collect::<Vec<_>>();

    let mut file = RemoteFile::from_unc_path("\\\\localhost\\docs\\big.bin").unwrap();
    file.open(&ctx, OpenMode::Write).await.unwrap();
    assert_eq!(file.write(&payload).await.unwrap(), payload.len());
    assert_eq!(file.position(), payload.len() as u64);
    file.close().await.unwrap();

    file.open(&ctx, OpenMode::Read).await.unwrap();
    assert_eq!(file.size(), payload.len() as u64);

    let contents = file.read(ReadSize::Rest).await.unwrap().unwrap();
    assert_eq!(contents.len(), payload.len());
    assert!(contents == payload);

    file.seek(-10, Whence::End).unwrap();
    let tail = file.read(100).await.unwrap().unwrap();
    assert_eq!(tail, payload[payload.len() - 10..]);
    assert_eq!(file.read(1).await.unwrap(), None);

    file.close().await.unwrap();
}

#[tokio::test]
async fn test_helpers_over_udp() {
    let ctx = connect(MemTransport::new().with_file("docs", "notes.txt", b"remote notes".to_vec()))
        .await;

    assert_eq!(
        fs::read_to_string(&ctx, "docs/notes.txt").await.unwrap(),
        "remote notes"
    );

    fs::write(&ctx, "docs/notes.txt", b"REMOTE").await.unwrap();
    assert_eq!(
        fs::read_to_string(&ctx, "docs/notes.txt").await.unwrap(),
        "REMOTE notes"
    );
}

#[tokio::test]
async fn test_remote_errors_surface() {
    let ctx = connect(MemTransport::new().with_share("docs")).await;

    let mut file = RemoteFile::from_unc_path("docs\\missing.txt").unwrap();
    let res = file.open(&ctx, OpenMode::Read).await;
    assert!(matches!(
        res,
        Err(FileError::Transport(TransportError::ObjectNotFound(_)))
    ));

    let mut file = RemoteFile::from_unc_path("nowhere\\file.txt").unwrap();
    let res = file.open(&ctx, OpenMode::Read).await;
    assert!(matches!(
        res,
        Err(FileError::Transport(TransportError::ShareNotFound(_)))
    ));
}

#[tokio::test]
async fn test_stream_survives_dropped_replies() {
    let payload = (0..1000u32).map(|i| (i % 241) as u8).collect::<Vec<_>>();
    let dispatcher =
        bind(MemTransport::new().with_pipe("IPC$", "events", payload.clone())).await;

    // every third reply is lost on average; retransmissions must not drain the pipe again
    let ctx = serve(dispatcher.with_omissions(3), Duration::from_millis(50), 12).await;

    let mut pipe = RemoteFile::from_unc_path("IPC$\\events").unwrap();
    pipe.open(&ctx, OpenMode::ReadStream).await.unwrap();

    let mut received = Vec::new();
    while received.len() < payload.len() {
        let chunk = pipe.read(25).await.unwrap().unwrap();
        assert!(!chunk.is_empty());
        received.extend(chunk);
    }

    assert_eq!(received, payload);
    pipe.close().await.unwrap();
}
