//! Command-line args for client

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
pub struct ClientArgs {
    /// The IPv4 address of the client.
    #[clap(short, long)]
    #[clap(default_value_t = Ipv4Addr::LOCALHOST)]
    pub listen_address: Ipv4Addr,

    /// The IPv4 address of the server.
    #[clap(short, long)]
    #[clap(default_value_t = Ipv4Addr::LOCALHOST)]
    pub target: Ipv4Addr,

    /// The server port to connect to.
    #[clap(short, long)]
    #[clap(default_value_t = rfh::defaults::DEFAULT_PORT)]
    pub port: u16,

    /// The timeout duration
    #[clap(short, long)]
    #[clap(default_value = rfh::defaults::DEFAULT_TIMEOUT)]
    pub request_timeout: humantime::Duration,

    /// The number of retries before returning an error
    #[clap(short, long)]
    #[clap(default_value_t = rfh::defaults::DEFAULT_RETRIES)]
    pub num_retries: u8,

    #[clap(subcommand)]
    pub command: Command,
}

/// Remote paths are `share\path` or `\\host\share\path`; `/` works as a separator too.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print (part of) a remote file to stdout.
    Cat {
        path: String,

        /// Byte offset to start reading from.
        #[clap(long)]
        offset: Option<u64>,

        /// Number of bytes to read. Reads to the end of the file by default.
        #[clap(long)]
        length: Option<usize>,
    },

    /// Copy a remote file to a local path.
    Get { path: String, local: PathBuf },

    /// Copy a local file to a remote path.
    Put { local: PathBuf, path: String },

    /// Show the metadata of a remote file.
    Stat { path: String },
}
