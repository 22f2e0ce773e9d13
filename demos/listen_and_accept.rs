// ABOUTME: Standalone listener demo: binds a port, accepts clients, and logs every frame
// ABOUTME: Pair with `nc localhost <port>` or a second peertalk client to see traffic

//! # Listen and accept
//!
//! Binds a fixed port and runs until interrupted, logging every accepted
//! connection and every frame it carries.
//!
//! ```bash
//! cargo run --example listen_and_accept -- --port 9000
//! ```

use argh::FromArgs;
use bytes::Bytes;
use peertalk::config::ChannelConfig;
use peertalk::engine::{Address, Channel, ChannelConsumer, EngineError};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

/// listen for peertalk connections and log traffic
#[derive(FromArgs)]
struct CliArgs {
    /// port to listen on
    #[argh(option, short = 'p', default = "9000")]
    port: u16,
}

/// Shared between the listening channel and every accepted connection (a
/// `listen()` call has one consumer for all of them; see `on_accept`).
struct Acceptor;

impl ChannelConsumer for Acceptor {
    fn on_frame(&self, frame_type: u32, tag: u32, payload: Bytes) {
        info!(frame_type, tag, len = payload.len(), "frame");
    }

    fn on_end(&self, error: Option<EngineError>) {
        match error {
            Some(e) => warn!(error = %e, "connection ended with error"),
            None => info!("connection ended"),
        }
    }

    fn on_accept(&self, child: Channel, address: Address) {
        info!(peer = %address, "accepted");
        // `child` already drives its own read loop; dropping our handle here
        // only releases this function's reference to it.
        let _ = child;
    }
}

#[tokio::main]
async fn main() -> peertalk::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(tracing::Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("set tracing subscriber");

    let args: CliArgs = argh::from_env();
    let addr = format!("0.0.0.0:{}", args.port).parse().unwrap();

    let listener = Channel::listen(addr, Arc::new(Acceptor), ChannelConfig::default()).await?;
    info!(port = args.port, "listening");

    signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    listener.close();
    Ok(())
}
