use crate::frame::FrameCodecError;
use crate::usbmux::UmcError;
use thiserror::Error;

/// Errors the frame protocol engine can surface (spec §7). All of these are
/// terminal for the channel that produced them; the channel moves to
/// `Closed` and is not reused.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// `version != 1`, payload exceeds the ceiling, or a short read split a
    /// header or payload in half.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The peer closed the stream cleanly.
    #[error("stream closed")]
    StreamClosed,

    /// An OS-level read/write/connect/listen error.
    #[error("stream error: {0}")]
    StreamError(String),

    /// A local `close()` aborted an in-flight send.
    #[error("operation cancelled")]
    Cancelled,

    /// The USB-mux daemon refused a `Connect` request.
    #[error("USB device connect failed: {0}")]
    Usb(#[from] UmcError),
}

impl From<FrameCodecError> for EngineError {
    fn from(err: FrameCodecError) -> Self {
        match err {
            FrameCodecError::Io(e) => EngineError::StreamError(e.to_string()),
            other => EngineError::InvalidFrame(other.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::StreamError(err.to_string())
    }
}
