// ABOUTME: Minimal loopback demo: one process listens, connects to itself, and echoes frames
// ABOUTME: Exercises connect/listen/send/cancel end to end without any external daemon

//! # Echo loopback
//!
//! Starts a listener on an ephemeral localhost port, connects a second
//! channel to it, sends a couple of frames, then cancels gracefully and
//! waits for both sides to report `on_end`.
//!
//! ```bash
//! cargo run --example echo_loopback
//! ```

use bytes::Bytes;
use peertalk::config::ChannelConfig;
use peertalk::engine::{Address, Channel, ChannelConsumer, EngineError};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

struct Logger {
    label: &'static str,
    done: Arc<Notify>,
}

impl ChannelConsumer for Logger {
    fn on_frame(&self, frame_type: u32, tag: u32, payload: Bytes) {
        info!(label = self.label, frame_type, tag, len = payload.len(), "received frame");
    }

    fn on_end(&self, error: Option<EngineError>) {
        info!(label = self.label, ?error, "channel ended");
        self.done.notify_one();
    }

    fn on_accept(&self, child: Channel, address: Address) {
        info!(label = self.label, %address, "accepted connection");
        tokio::spawn(async move {
            let _ = child.send_frame(1, 0, Bytes::from_static(b"welcome")).await;
        });
    }
}

#[tokio::main]
async fn main() -> peertalk::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(tracing::Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("set tracing subscriber");

    let server_done = Arc::new(Notify::new());
    let client_done = Arc::new(Notify::new());

    let server_consumer = Arc::new(Logger { label: "server", done: Arc::clone(&server_done) });
    let client_consumer = Arc::new(Logger { label: "client", done: Arc::clone(&client_done) });

    let listener =
        Channel::listen("127.0.0.1:0".parse().unwrap(), server_consumer, ChannelConfig::default())
            .await?;
    let addr = listener.local_addr().expect("listening channel has a local address");

    let client = Channel::connect_network(addr, client_consumer, ChannelConfig::default()).await?;
    client.send_frame(1, 0, Bytes::from_static(b"hello")).await?;
    client.send_frame(1, 0, Bytes::from_static(b"world")).await?;
    client.cancel();
    client_done.notified().await;

    listener.close();
    Ok(())
}
