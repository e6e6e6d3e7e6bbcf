//! CLI args

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// Remote file handle server arguments
#[derive(Parser)]
pub(crate) struct ServerArgs {
    /// The IPv4 address for the server to bind to.
    #[clap(short, long)]
    #[clap(default_value_t = Ipv4Addr::LOCALHOST)]
    pub address: Ipv4Addr,

    /// The port number for the server to listen on.
    #[clap(short, long)]
    #[clap(default_value_t = rfh::defaults::DEFAULT_PORT)]
    pub port: u16,

    /// A share to export, as `NAME=DIR`. Can be repeated.
    ///
    /// Without any, the current directory is exported as `share`.
    #[clap(short, long = "share")]
    pub shares: Vec<ShareSpec>,

    /// The timeout duration
    #[clap(short, long)]
    #[clap(default_value = rfh::defaults::DEFAULT_TIMEOUT)]
    pub request_timeout: humantime::Duration,

    /// Process requests sequentially instead of in parallel.
    #[clap(long)]
    pub sequential: bool,

    /// Max bytes moved by a single read or write. Smaller values force clients into
    /// short transfers.
    #[clap(long)]
    pub max_transfer: Option<usize>,

    /// Number of recent replies kept to answer retransmitted requests without
    /// executing them again. 0 executes every retransmission.
    #[clap(long)]
    #[clap(default_value_t = rfh::middleware::REPLY_CACHE_SIZE)]
    pub reply_cache_size: usize,

    /// Whether to simulate a faulty network
    #[clap(long)]
    pub simulate_omissions: bool,

    /// Drop 1 in N responses when simulating a faulty network.
    #[clap(long)]
    #[clap(default_value_t = rfh::defaults::DEFAULT_FAILURE_RATE)]
    pub failure_rate: u32,
}

/// A share name bound to a local directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ShareSpec {
    pub name: String,
    pub dir: PathBuf,
}

impl FromStr for ShareSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, dir) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=DIR, got {:?}", s))?;

        if name.is_empty() || name.contains(['\\', '/']) {
            return Err(format!("invalid share name {:?}", name));
        }
        if dir.is_empty() {
            return Err(format!("share {:?} has no directory", name));
        }

        Ok(Self {
            name: name.to_owned(),
            dir: PathBuf::from(dir),
        })
    }
}
