//! Top-level error type composing the per-module error enums.

use crate::engine::EngineError;
use crate::frame::FrameCodecError;
use crate::usbmux::UmcError;
use thiserror::Error;

/// Error returned by the public PeerTalk API.
///
/// Mirrors the error kinds in the frame protocol engine, the frame codec, and
/// the USB multiplexing client, each of which is terminal for the channel
/// (or, for the hub, for the in-flight request) that produced it.
#[derive(Debug, Error)]
pub enum PeerTalkError {
    #[error(transparent)]
    Frame(#[from] FrameCodecError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Usb(#[from] UmcError),
}
