//! Tunable limits for a channel's frame codec and write queue.
//!
//! Generalizes the teacher's hardcoded `MAX_PDU_SIZE` constant and fixed 4 KiB
//! read buffer into explicit, overridable configuration, per spec §4.2/§4.3.

/// Default payload size ceiling: 16 MiB (spec §3).
pub const DEFAULT_PAYLOAD_CEILING: u32 = 16 * 1024 * 1024;

/// Default write queue bound: 64 pending frames (spec §4.3).
pub const DEFAULT_WRITE_QUEUE_FRAMES: usize = 64;

/// Default write queue byte bound: 1 MiB (spec §4.3).
pub const DEFAULT_WRITE_QUEUE_BYTES: usize = 1024 * 1024;

/// Default initial capacity of the persistent per-channel read buffer: 4 KiB.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Per-channel limits governing frame size, backpressure, and buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum `payload_size` accepted before allocating a buffer for it.
    pub payload_ceiling: u32,
    /// Maximum number of frames held in the write queue before `send_frame`
    /// suspends the caller.
    pub write_queue_frames: usize,
    /// Maximum number of bytes held in the write queue before `send_frame`
    /// suspends the caller.
    pub write_queue_bytes: usize,
    /// Initial capacity of the persistent buffer the read loop accumulates
    /// off-the-wire bytes into before a complete header (and any payload
    /// bytes that arrived alongside it) can be parsed out. The buffer grows
    /// past this if a single read brings in more than its capacity.
    pub read_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            payload_ceiling: DEFAULT_PAYLOAD_CEILING,
            write_queue_frames: DEFAULT_WRITE_QUEUE_FRAMES,
            write_queue_bytes: DEFAULT_WRITE_QUEUE_BYTES,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ChannelConfig {
    /// Start from the defaults and override the payload ceiling.
    pub fn with_payload_ceiling(mut self, ceiling: u32) -> Self {
        self.payload_ceiling = ceiling;
        self
    }

    /// Start from the defaults and override the write queue frame bound.
    pub fn with_write_queue_frames(mut self, frames: usize) -> Self {
        self.write_queue_frames = frames;
        self
    }

    /// Start from the defaults and override the write queue byte bound.
    pub fn with_write_queue_bytes(mut self, bytes: usize) -> Self {
        self.write_queue_bytes = bytes;
        self
    }
}
