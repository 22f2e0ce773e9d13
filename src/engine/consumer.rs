use crate::engine::{Address, Channel, EngineError};
use bytes::Bytes;

/// The Rust collapse of the source's callback-or-delegate duality (spec §9
/// Design Notes): a single consumer capability set with four hooks, three of
/// which are required.
///
/// All events for one channel are delivered in order on that channel's
/// serial task and never re-enter the engine for the same channel.
pub trait ChannelConsumer: Send + Sync + 'static {
    /// Whether to accept a frame's payload bytes. Returning `false` causes
    /// the payload to be discarded from the stream with no [`on_frame`]
    /// delivery. Defaults to accepting everything.
    fn should_accept(&self, frame_type: u32, tag: u32, payload_size: u32) -> bool {
        let _ = (frame_type, tag, payload_size);
        true
    }

    /// A frame has arrived and been accepted.
    fn on_frame(&self, frame_type: u32, tag: u32, payload: Bytes);

    /// The channel has ended; delivered at most once and always last.
    fn on_end(&self, error: Option<EngineError>);

    /// A listening channel accepted a new connection. `child` starts in
    /// `Connected` and is already driving its own read loop; the listening
    /// channel retains no ownership of it.
    fn on_accept(&self, child: Channel, address: Address) {
        let _ = (child, address);
    }
}
