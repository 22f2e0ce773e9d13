// ABOUTME: USB multiplexing client (UMC): enumerates tethered devices and opens per-device streams
// ABOUTME: Speaks the host daemon's 16-byte little-endian control header plus XML plist bodies

//! Client for the host's local USB-multiplexing daemon (spec §4.4). A
//! process-wide [`Hub`] receives attach/detach notifications and opens
//! TCP-like streams to ports on tethered devices; the frame protocol engine
//! drives those streams exactly as it drives a plain network socket.

mod device;
mod error;
mod hub;
mod messages;
mod wire;

pub use device::{DeviceEvent, DeviceProperties, DeviceRecord};
pub use error::UmcError;
pub use hub::{Hub, SocketTarget};
