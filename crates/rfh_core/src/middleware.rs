//! This module contains the client and server side
//! objects that carry transport calls over the network.
//!
//! Every [`Transport`] call becomes one [`Request`] datagram answered by one
//! [`Response`] datagram. Both are wrapped in an [`Envelope`] carrying a request id,
//! so a client that retransmits can tell a late reply from the one it is waiting for.

mod context_manager;
mod dispatch;

use std::io;
use std::net::{SocketAddr, SocketAddrV4};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use context_manager::*;
pub use dispatch::*;

use crate::error::{TransportError, TransportResult};
use crate::transport::{CreateParams, CreateReply, ObjectId, ReadReply, ShareId, Transport};

/// Receive buffer size, large enough for any UDP datagram.
pub const BYTE_BUF_SIZE: usize = 65535;

/// Largest datagram we are willing to send.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Max bytes moved by a single read or write, so that a request or response fits in
/// one datagram with room to spare for the envelope.
pub const MAX_TRANSFER_SIZE: usize = 60_000;

/// Number of recent replies a dispatcher keeps to answer retransmitted requests.
pub const REPLY_CACHE_SIZE: usize = 1024;

/// A transport call, as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Request {
    /// Liveness check, answered with [`Response::Pong`].
    Ping,

    TreeConnect {
        share_path: String,
    },

    Create {
        share: ShareId,
        path: String,
        params: CreateParams,
    },

    Read {
        share: ShareId,
        object: ObjectId,
        offset: u64,
        length: usize,
    },

    Write {
        share: ShareId,
        object: ObjectId,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        offset: u64,
    },

    Flush {
        share: ShareId,
        object: ObjectId,
    },

    Close {
        share: ShareId,
        object: ObjectId,
    },
}

/// The outcome of a [`Request`], as sent back by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Response {
    Pong,
    TreeConnect(ShareId),
    Create(CreateReply),
    Read(ReadReply),
    Write(usize),
    Flush,
    Close,

    /// The transport call failed on the remote.
    Error(TransportError),
}

/// A request or response tagged with the id of the request it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<B> {
    pub request_id: u64,
    pub body: B,
}

/// Serialize a message for the wire.
pub fn serialize_primary<T: Serialize>(item: &T) -> TransportResult<Vec<u8>> {
    postcard::to_stdvec(item).map_err(|e| TransportError::Protocol(e.to_string()))
}

/// Deserialize a message from the wire.
pub fn deserialize_primary<T: DeserializeOwned>(bytes: &[u8]) -> TransportResult<T> {
    postcard::from_bytes(bytes).map_err(|e| TransportError::Protocol(e.to_string()))
}

/// Execute a request against a transport and wrap the outcome in a response.
pub async fn handle_request<T: Transport + ?Sized>(transport: &T, request: Request) -> Response {
    let res = match request {
        Request::Ping => Ok(Response::Pong),
        Request::TreeConnect { share_path } => transport
            .tree_connect(&share_path)
            .await
            .map(Response::TreeConnect),
        Request::Create {
            share,
            path,
            params,
        } => transport
            .create(share, &path, params)
            .await
            .map(Response::Create),
        Request::Read {
            share,
            object,
            offset,
            length,
        } => transport
            .read(share, object, offset, length.min(MAX_TRANSFER_SIZE))
            .await
            .map(Response::Read),
        Request::Write {
            share,
            object,
            data,
            offset,
        } => transport
            .write(share, object, &data, offset)
            .await
            .map(Response::Write),
        Request::Flush { share, object } => {
            transport.flush(share, object).await.map(|_| Response::Flush)
        }
        Request::Close { share, object } => {
            transport.close(share, object).await.map(|_| Response::Close)
        }
    };

    res.unwrap_or_else(Response::Error)
}

/// Narrow a socket address down to IPv4.
pub(crate) fn sockaddr_to_v4(addr: SocketAddr) -> io::Result<SocketAddrV4> {
    match addr {
        SocketAddr::V4(a) => Ok(a),
        SocketAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "IPv6 addresses are not supported",
        )),
    }
}

/// Returns the outcome of the probability of getting `1` in `frac`.
pub(crate) fn probability_frac(frac: u32) -> bool {
    let rand_num: u64 = rand::random();
    let threshold = u64::MAX / frac.max(1) as u64;

    rand_num < threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemTransport;

    #[test]
    fn test_envelope_serde() {
        let message = Envelope {
            request_id: 42,
            body: Request::Write {
                share: ShareId(1),
                object: ObjectId(7),
                data: b"some bytes".to_vec(),
                offset: 1 << 33,
            },
        };

        let ser = serialize_primary(&message).unwrap();
        let des: Envelope<Request> = deserialize_primary(&ser).unwrap();

        assert_eq!(des, message);
    }

    #[test]
    fn test_deserialize_garbage_is_protocol_error() {
        let res: TransportResult<Envelope<Response>> = deserialize_primary(&[0xff, 0xff, 0xff]);

        assert!(matches!(res, Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_handle_request_routes_to_transport() {
        let transport = MemTransport::new().with_file("docs", "notes.txt", b"abc".to_vec());

        assert_eq!(handle_request(&transport, Request::Ping).await, Response::Pong);

        let share = match handle_request(
            &transport,
            Request::TreeConnect {
                share_path: "docs".to_owned(),
            },
        )
        .await
        {
            Response::TreeConnect(id) => id,
            other => panic!("unexpected response: {:?}", other),
        };

        let missing = handle_request(
            &transport,
            Request::Create {
                share,
                path: "missing.txt".to_owned(),
                params: CreateParams::default(),
            },
        )
        .await;

        assert!(matches!(
            missing,
            Response::Error(TransportError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_prob() {
        let frac = 10;

        let hits = (0..1000).filter(|_| probability_frac(frac)).count();

        // expected ~100
        assert!(hits < 500, "1 in {} yielded {} of 1000", frac, hits);
    }
}
