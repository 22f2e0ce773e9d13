use thiserror::Error;

/// Errors surfaced by the USB multiplexing client (spec §4.4/§7).
#[derive(Debug, Error, Clone)]
pub enum UmcError {
    /// `Connect` reply `Number=2`.
    #[error("device refused the connection (BadDevice)")]
    BadDevice,

    /// `Connect` reply `Number=3`.
    #[error("device connection refused")]
    ConnectionRefused,

    /// A reply failed to parse as a plist, or its `packet_type` was not the
    /// plist constant.
    #[error("usbmuxd reply was unparsable or unexpected: {0}")]
    InvalidResponse(String),

    /// The daemon's `Number` for a request we issued did not map to a known
    /// outcome.
    #[error("usbmuxd rejected the request: {0}")]
    InvalidCommand(String),

    /// An OS-level error talking to the daemon socket.
    #[error("usbmuxd transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for UmcError {
    fn from(err: std::io::Error) -> Self {
        UmcError::Transport(err.to_string())
    }
}

impl From<plist::Error> for UmcError {
    fn from(err: plist::Error) -> Self {
        UmcError::InvalidResponse(err.to_string())
    }
}
