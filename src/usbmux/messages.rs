use super::device::DeviceProperties;
use super::wire::port_to_wire;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ListenRequest {
    #[serde(rename = "MessageType")]
    message_type: &'static str,
    #[serde(rename = "ClientVersionString")]
    client_version_string: String,
    #[serde(rename = "ProgName")]
    prog_name: String,
}

impl ListenRequest {
    pub fn new() -> Self {
        Self {
            message_type: "Listen",
            client_version_string: concat!("peertalk-", env!("CARGO_PKG_VERSION")).to_string(),
            prog_name: "peertalk".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectRequest {
    #[serde(rename = "MessageType")]
    message_type: &'static str,
    #[serde(rename = "DeviceID")]
    device_id: u32,
    #[serde(rename = "PortNumber")]
    port_number: u16,
}

impl ConnectRequest {
    pub fn new(device_id: u32, port: u16) -> Self {
        Self { message_type: "Connect", device_id, port_number: port_to_wire(port) }
    }
}

/// The reply to `Listen` and `Connect` requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultReply {
    #[serde(rename = "Number")]
    pub number: Option<i64>,
}

/// Raw shape of anything that can arrive on the monitor socket once
/// `Listen` has been acknowledged: `Attached`, `Detached`, or a stray
/// `Result` (spec §4.4). Decoded as one envelope and dispatched on
/// `message_type` explicitly, the way the teacher dispatches PDUs on
/// `command_id` rather than trusting an enum-tagged decode of a format
/// that was never designed with Rust's tagged enums in mind.
#[derive(Debug, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "MessageType")]
    pub message_type: String,
    #[serde(rename = "DeviceID")]
    pub device_id: Option<u32>,
    #[serde(rename = "Properties")]
    pub properties: Option<DeviceProperties>,
    #[serde(rename = "Number")]
    pub number: Option<i64>,
}
