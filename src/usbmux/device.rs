use serde::Deserialize;

/// The property map published alongside a device's attach notification
/// (spec §3 "Device record").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceProperties {
    #[serde(rename = "SerialNumber")]
    pub serial_number: String,
    #[serde(rename = "ProductID")]
    pub product_id: u32,
    #[serde(rename = "LocationID")]
    pub location_id: u32,
    #[serde(rename = "ConnectionSpeed")]
    pub connection_speed: u32,
    #[serde(rename = "ConnectionType")]
    pub connection_type: String,
}

/// A device as published by the USB-mux daemon's enumeration (spec §3).
///
/// Created on an `Attached` notification and destroyed on the matching
/// `Detached`; a channel opened to the device survives detach but observes
/// a transport error on its next I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_id: u32,
    pub properties: DeviceProperties,
}

/// An attach/detach notification delivered to hub subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Attached(DeviceRecord),
    Detached { device_id: u32 },
}
