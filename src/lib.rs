//! PeerTalk: a tagged-frame protocol engine and USB multiplexing client for
//! talking to a tethered companion device.
//!
//! Two hard engineering parts, each usable independently:
//!
//! - [`frame`] + [`engine`]: a full-duplex, length-delimited frame protocol
//!   carried over any byte stream (spec §3/§4.3).
//! - [`usbmux`]: a client of the host's on-machine USB-multiplexing daemon
//!   that enumerates attached devices and opens per-device streams (spec
//!   §4.4), which the engine then drives like any other stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use peertalk::engine::{Channel, ChannelConsumer};
//! use peertalk::config::ChannelConfig;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ChannelConsumer for Echo {
//!     fn on_frame(&self, _frame_type: u32, _tag: u32, _payload: Bytes) {}
//!     fn on_end(&self, _error: Option<peertalk::engine::EngineError>) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> peertalk::Result<()> {
//!     let channel =
//!         Channel::connect_network("127.0.0.1:2345".parse().unwrap(), Arc::new(Echo), ChannelConfig::default())
//!             .await?;
//!     channel.send_frame(1, 0, Bytes::from_static(b"hello")).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
mod error;
pub mod frame;
pub mod transport;
pub mod usbmux;

pub use error::PeerTalkError;

/// A specialized `Result` type for PeerTalk operations.
pub type Result<T> = std::result::Result<T, PeerTalkError>;
