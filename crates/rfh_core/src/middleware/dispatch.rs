//! Dispatcher side implementation.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use futures::lock::Mutex;
use tokio::net::{ToSocketAddrs, UdpSocket};

use super::{
    deserialize_primary, handle_request, probability_frac, serialize_primary, sockaddr_to_v4,
    Envelope, Request, Response, BYTE_BUF_SIZE, REPLY_CACHE_SIZE,
};
use crate::error::TransportError;
use crate::transport::Transport;

/// A request is identified by its sender and the id the sender gave it.
type RequestKey = (SocketAddr, u64);

/// What the dispatcher knows about a request it has seen before.
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    /// The request is still executing.
    Pending,

    /// The serialized response that was sent back.
    Done(Arc<Vec<u8>>),
}

#[derive(Debug)]
struct CachedReply {
    request: Request,
    reply: Reply,
}

/// Replies to recent requests, so a retransmitted request is answered without being
/// executed a second time.
#[derive(Debug)]
struct ReplyCache {
    replies: HashMap<RequestKey, CachedReply>,

    /// Keys in insertion order, oldest first.
    order: VecDeque<RequestKey>,
    capacity: usize,
}

impl ReplyCache {
    fn new(capacity: usize) -> Self {
        Self {
            replies: Default::default(),
            order: Default::default(),
            capacity,
        }
    }

    /// Registers a request about to execute.
    ///
    /// Returns what is known about it if the same request was seen before. A request
    /// that reuses a key with a different body replaces the old entry.
    fn begin(&mut self, key: RequestKey, request: &Request) -> Option<Reply> {
        if self.capacity == 0 {
            return None;
        }

        match self.replies.get(&key) {
            Some(cached) if cached.request == *request => return Some(cached.reply.clone()),
            Some(_) => {
                self.replies.remove(&key);
                self.order.retain(|k| *k != key);
            }
            None => (),
        }

        self.replies.insert(
            key,
            CachedReply {
                request: request.clone(),
                reply: Reply::Pending,
            },
        );
        self.order.push_back(key);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.replies.remove(&oldest);
            }
        }

        None
    }

    /// Records the serialized response of a request.
    fn complete(&mut self, key: RequestKey, response: Arc<Vec<u8>>) {
        if let Some(cached) = self.replies.get_mut(&key) {
            cached.reply = Reply::Done(response);
        }
    }

    /// Drops a request that produced no response.
    fn forget(&mut self, key: RequestKey) {
        if self.replies.remove(&key).is_some() {
            self.order.retain(|k| *k != key);
        }
    }
}

/// The dispatcher for remote transport calls.
///
/// The dispatcher receives [`Request`]s from [`super::ContextManager`]s and executes
/// them against the transport it serves. Requests are executed at most once: a
/// retransmitted request is answered from a cache of recent replies.
#[derive(Debug)]
pub struct Dispatcher<T>
where
    T: Transport,
{
    socket: Arc<UdpSocket>,

    /// Max time a single request may take before an error is returned instead.
    timeout: Duration,

    /// Process requests one after another instead of spawning a task per request.
    sequential: bool,

    /// Drop 1 in N responses, to simulate an unreliable network.
    omission_rate: Option<u32>,

    replies: Arc<Mutex<ReplyCache>>,

    transport: Arc<T>,
}

impl<T> Dispatcher<T>
where
    T: Transport + 'static,
{
    /// Create a new dispatcher serving `transport` from a listening address.
    pub async fn new<A: ToSocketAddrs>(
        addr: A,
        transport: T,
        sequential: bool,
        timeout: Duration,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;

        Ok(Self {
            socket: Arc::new(socket),
            timeout,
            sequential,
            omission_rate: None,
            replies: Arc::new(Mutex::new(ReplyCache::new(REPLY_CACHE_SIZE))),
            transport: Arc::new(transport),
        })
    }

    /// Drop 1 in `rate` responses on average.
    pub fn with_omissions(mut self, rate: u32) -> Self {
        log::info!("dispatcher dropping 1 in {} responses", rate);
        self.omission_rate = Some(rate);

        self
    }

    /// Remember the replies of the last `capacity` requests.
    ///
    /// A capacity of 0 turns duplicate filtering off, so every retransmission is
    /// executed again.
    pub fn with_reply_cache(mut self, capacity: usize) -> Self {
        self.replies = Arc::new(Mutex::new(ReplyCache::new(capacity)));

        self
    }

    /// Address the dispatcher is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddrV4> {
        sockaddr_to_v4(self.socket.local_addr()?)
    }

    /// Runs the dispatcher indefinitely.
    pub async fn dispatch(&self) -> io::Result<()> {
        let mut buf = vec![0_u8; BYTE_BUF_SIZE];
        let mut request_num: u64 = 0;

        loop {
            log::debug!("awaiting request #{}", request_num);

            let (size, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    // ICMP errors from earlier replies surface here, keep serving
                    log::error!("receive error: {}", e);
                    continue;
                }
            };

            log::debug!("received request #{} ({} bytes) from {}", request_num, size, addr);

            let bytes = buf[..size].to_vec();
            let socket = self.socket.clone();
            let transport = self.transport.clone();
            let replies = self.replies.clone();
            let timeout = self.timeout;
            let omission_rate = self.omission_rate;

            // tasks can run for an arbitrary amount of time
            let handle = tokio::spawn(async move {
                Self::execute_handler(
                    addr,
                    &bytes,
                    socket,
                    transport,
                    replies,
                    timeout,
                    omission_rate,
                )
                .await
            });

            // if we are processing sequentially, we wait on each task every loop iter
            if self.sequential {
                if let Err(e) = handle.await {
                    log::error!("request #{} task failed: {}", request_num, e);
                }
            }

            request_num += 1;
        }
    }

    /// Decodes, executes and answers a single request.
    async fn execute_handler(
        address: SocketAddr,
        data: &[u8],
        socket: Arc<UdpSocket>,
        transport: Arc<T>,
        replies: Arc<Mutex<ReplyCache>>,
        timeout: Duration,
        omission_rate: Option<u32>,
    ) {
        // connection packets have zero length
        if data.is_empty() {
            return;
        }

        let envelope: Envelope<Request> = match deserialize_primary(data) {
            Ok(e) => e,
            Err(e) => {
                log::error!("deserialization failed: {}", e);
                return;
            }
        };

        log::debug!("request #{} from {}", envelope.request_id, address);
        log::trace!("request contents: {:?}", envelope.body);

        let key = (address, envelope.request_id);
        let seen = replies.lock().await.begin(key, &envelope.body);

        let serialized = match seen {
            Some(Reply::Pending) => {
                log::debug!("request #{} from {} is still executing", key.1, address);
                return;
            }
            Some(Reply::Done(serialized)) => {
                log::debug!("replaying reply to request #{} from {}", key.1, address);
                serialized
            }
            None => {
                let handled = handle_request(transport.as_ref(), envelope.body);
                let response = match tokio::time::timeout(timeout, handled).await {
                    Ok(r) => r,
                    Err(_) => Response::Error(TransportError::TimedOut),
                };

                let serialized = match serialize_primary(&Envelope {
                    request_id: envelope.request_id,
                    body: response,
                }) {
                    Ok(s) => Arc::new(s),
                    Err(e) => {
                        log::error!("serialization failed: {}", e);
                        replies.lock().await.forget(key);
                        return;
                    }
                };

                replies.lock().await.complete(key, serialized.clone());
                serialized
            }
        };

        if omission_rate.is_some_and(probability_frac) {
            log::error!("faulty packet transmission to {}", address);
            return;
        }

        match socket.send_to(&serialized, address).await {
            Ok(sent) => log::debug!("sent {} bytes to {}", sent, address),
            Err(e) => log::error!("failed to respond to {}: {}", address, e),
        }
    }
}
