//! Remote file handles and the defaults shared between server and client.

pub mod fs;

pub use rfh_core::{mem, middleware, Transport, TransportError, TransportResult};

/// Default constants used between a client and the remote.
pub mod defaults {

    /// The default port used by the remote
    pub const DEFAULT_PORT: u16 = 4013;
    /// Default timeout duration for request-responses
    pub const DEFAULT_TIMEOUT: &str = "250ms";
    /// Default number of retries
    pub const DEFAULT_RETRIES: u8 = 3;

    /// Default failure rate, used for testing.
    ///
    /// A transmission experiences an omission failure every 1 in 50 attempts on average.
    pub const DEFAULT_FAILURE_RATE: u32 = 50;

    /// Consecutive transport calls without progress before a transfer is abandoned.
    pub const MAX_STALLED_TRANSFERS: u32 = 3;

    /// Bytes requested by a read-to-end on a stream handle.
    pub const STREAM_READ_SIZE: usize = 64 * 1024;

    /// Chunk size used when copying a remote file piecewise.
    pub const COPY_CHUNK_SIZE: usize = 256 * 1024;
}
