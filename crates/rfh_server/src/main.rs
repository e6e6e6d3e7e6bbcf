use std::io;
use std::net::SocketAddrV4;

use clap::Parser;
use rfh::middleware::Dispatcher;

use crate::args::ServerArgs;
use crate::server::DirTransport;

mod args;
mod server;

/// Share exported when none is given on the command line.
const DEFAULT_SHARE: &str = "share";

#[tokio::main]
async fn main() -> io::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "INFO");
    }
    pretty_env_logger::init();

    let args = ServerArgs::parse();

    let mut transport = DirTransport::new().with_max_transfer(args.max_transfer);
    if args.shares.is_empty() {
        transport = transport.with_share(DEFAULT_SHARE, std::env::current_dir()?)?;
    }
    for share in &args.shares {
        transport = transport.with_share(&share.name, &share.dir)?;
    }

    let addr = SocketAddrV4::new(args.address, args.port);
    let mut dispatcher =
        Dispatcher::new(addr, transport, args.sequential, args.request_timeout.into())
            .await?
            .with_reply_cache(args.reply_cache_size);

    if args.simulate_omissions {
        dispatcher = dispatcher.with_omissions(args.failure_rate);
    }

    log::info!("server listening on {}", dispatcher.local_addr()?);

    dispatcher.dispatch().await
}
