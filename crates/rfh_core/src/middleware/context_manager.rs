//! The client-side middleware module

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::net::UdpSocket;

use super::{
    deserialize_primary, serialize_primary, Envelope, Request, Response, BYTE_BUF_SIZE,
    MAX_DATAGRAM_SIZE, MAX_TRANSFER_SIZE,
};
use crate::error::{TransportError, TransportResult};
use crate::transport::{CreateParams, CreateReply, ObjectId, ReadReply, ShareId, Transport};

/// The context manager for the client.
///
/// The context manager sends transport calls to its server-side counterpart,
/// the [`super::Dispatcher`], and implements [`Transport`] on top of it.
///
/// Requests are retransmitted until a reply with a matching request id arrives,
/// or until the retries run out.
#[derive(Debug)]
pub struct ContextManager {
    /// The client's IP
    source_ip: Ipv4Addr,
    /// The server's address
    target: SocketAddrV4,

    /// Time to wait for a reply before retransmitting
    timeout: Duration,

    /// Number of retransmissions before giving up
    retries: u8,

    request_counter: AtomicU64,
}

impl ContextManager {
    /// Create a new context manager and check that the remote is up.
    pub async fn new(
        source: Ipv4Addr,
        target: SocketAddrV4,
        timeout: Duration,
        retries: u8,
    ) -> io::Result<Self> {
        let manager = Self {
            source_ip: source,
            target,
            timeout,
            retries,
            // random start, so ids of different managers rarely meet in a reply cache
            request_counter: AtomicU64::new(rand::random()),
        };

        log::debug!("establishing initial conn with remote {}...", target);

        match manager.invoke(Request::Ping).await? {
            Response::Pong => {
                log::debug!("remote {} is up", target);
                Ok(manager)
            }
            other => {
                log::debug!("invalid response: {:?}", other);
                Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "expected ping response",
                ))
            }
        }
    }

    /// Address of the remote.
    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    /// Send a request to the remote and return its response.
    ///
    /// A [`Response::Error`] from the remote is returned as `Err`.
    pub async fn invoke(&self, request: Request) -> TransportResult<Response> {
        let request_id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        let payload = serialize_primary(&Envelope {
            request_id,
            body: request,
        })?;

        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::Protocol(format!(
                "request of {} bytes exceeds max datagram size",
                payload.len()
            )));
        }

        // for now, bind and connect on every invocation
        let sock = self.connect_remote().await?;
        let mut retries = self.retries;

        let response = loop {
            sock.send(&payload)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;

            tokio::select! {
                biased;

                res = Self::recv_response(&sock, request_id).fuse() => break res?,

                _ = tokio::time::sleep(self.timeout).fuse() => {
                    match retries {
                        0 => return Err(TransportError::TimedOut),
                        _ => retries -= 1,
                    }

                    log::debug!(
                        "request #{} to {} timed out. retries remaining: {}",
                        request_id,
                        self.target,
                        retries
                    );
                }
            }
        };

        match response {
            Response::Error(e) => Err(e),
            other => Ok(other),
        }
    }

    /// Waits for the response to `request_id`, skipping stray datagrams.
    async fn recv_response(sock: &UdpSocket, request_id: u64) -> TransportResult<Response> {
        let mut buf = vec![0_u8; BYTE_BUF_SIZE];

        loop {
            let size = sock.recv(&mut buf).await?;

            let envelope: Envelope<Response> = match deserialize_primary(&buf[..size]) {
                Ok(e) => e,
                Err(e) => {
                    log::error!("dropping malformed response: {}", e);
                    continue;
                }
            };

            if envelope.request_id != request_id {
                log::debug!(
                    "dropping stray response #{}, awaiting #{}",
                    envelope.request_id,
                    request_id
                );
                continue;
            }

            return Ok(envelope.body);
        }
    }

    /// Create and bind to a new socket with an arbitrary port, connected to the remote.
    async fn connect_remote(&self) -> TransportResult<UdpSocket> {
        let sock = UdpSocket::bind(SocketAddrV4::new(self.source_ip, 0))
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        sock.connect(self.target)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(sock)
    }
}

/// Error for a response of the wrong kind.
fn unexpected(response: Response) -> TransportError {
    TransportError::Protocol(format!("unexpected response: {:?}", response))
}

#[async_trait]
impl Transport for ContextManager {
    async fn tree_connect(&self, share_path: &str) -> TransportResult<ShareId> {
        let request = Request::TreeConnect {
            share_path: share_path.to_owned(),
        };

        match self.invoke(request).await? {
            Response::TreeConnect(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    async fn create(
        &self,
        share: ShareId,
        path: &str,
        params: CreateParams,
    ) -> TransportResult<CreateReply> {
        let request = Request::Create {
            share,
            path: path.to_owned(),
            params,
        };

        match self.invoke(request).await? {
            Response::Create(reply) => Ok(reply),
            other => Err(unexpected(other)),
        }
    }

    async fn read(
        &self,
        share: ShareId,
        object: ObjectId,
        offset: u64,
        length: usize,
    ) -> TransportResult<ReadReply> {
        let request = Request::Read {
            share,
            object,
            offset,
            length: length.min(MAX_TRANSFER_SIZE),
        };

        match self.invoke(request).await? {
            Response::Read(reply) => Ok(reply),
            other => Err(unexpected(other)),
        }
    }

    async fn write(
        &self,
        share: ShareId,
        object: ObjectId,
        data: &[u8],
        offset: u64,
    ) -> TransportResult<usize> {
        // anything past the transfer size is left for the caller to resend
        let chunk = &data[..data.len().min(MAX_TRANSFER_SIZE)];
        let request = Request::Write {
            share,
            object,
            data: chunk.to_vec(),
            offset,
        };

        match self.invoke(request).await? {
            Response::Write(written) => Ok(written),
            other => Err(unexpected(other)),
        }
    }

    async fn flush(&self, share: ShareId, object: ObjectId) -> TransportResult<()> {
        match self.invoke(Request::Flush { share, object }).await? {
            Response::Flush => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn close(&self, share: ShareId, object: ObjectId) -> TransportResult<()> {
        match self.invoke(Request::Close { share, object }).await? {
            Response::Close => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
