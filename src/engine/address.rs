use std::fmt;

/// A peer's address (spec §3).
///
/// For network peers, `name` is the textual IP address and `port` is the
/// remote port in host byte order. For USB peers, `name` is the decimal
/// device id and `port` is the remote TCP port on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub name: String,
    pub port: u16,
}

impl Address {
    pub fn network(ip: std::net::IpAddr, port: u16) -> Self {
        Self { name: ip.to_string(), port }
    }

    pub fn usb(device_id: u32, port: u16) -> Self {
        Self { name: device_id.to_string(), port }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}
