// ABOUTME: Frame protocol engine (FPE): full-duplex tagged-frame channels over any byte stream
// ABOUTME: One Tokio task per channel drives the read loop, write queue, and consumer callbacks

mod address;
mod channel;
mod consumer;
mod error;
mod state;
mod tag;

pub use address::Address;
pub use channel::Channel;
pub use consumer::ChannelConsumer;
pub use error::EngineError;
pub use state::ChannelState;
pub(crate) use tag::TagAllocator;
