// ABOUTME: USB-mux control packet codec: 16-byte little-endian header + XML plist body
// ABOUTME: Requests and replies on the daemon socket are correlated by the header's `tag`

use super::UmcError;
use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size in bytes of the fixed control header.
pub const HEADER_SIZE: usize = 16;

/// The only `packet_type` this client sends or accepts; other values are
/// legacy framings the daemon no longer uses with this client.
pub const PACKET_TYPE_PLIST: u32 = 4;

/// The fixed 16-byte control header, in little-endian byte order (spec
/// §4.4). Note this is the opposite byte order from the frame codec's
/// header — the two wire formats are unrelated protocols that happen to
/// share a process.
#[derive(Debug, Clone, Copy)]
struct ControlHeader {
    total_size: u32,
    reserved: u32,
    packet_type: u32,
    tag: u32,
}

impl ControlHeader {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.total_size);
        buf.put_u32_le(self.reserved);
        buf.put_u32_le(self.packet_type);
        buf.put_u32_le(self.tag);
    }

    fn decode(mut buf: &[u8]) -> Self {
        ControlHeader {
            total_size: buf.get_u32_le(),
            reserved: buf.get_u32_le(),
            packet_type: buf.get_u32_le(),
            tag: buf.get_u32_le(),
        }
    }
}

/// Encode `body` as an XML plist and write `[header || body]` to `stream`.
pub async fn write_packet<W, T>(stream: &mut W, tag: u32, body: &T) -> Result<(), UmcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut body_bytes = Vec::new();
    plist::to_writer_xml(&mut body_bytes, body).map_err(UmcError::from)?;

    let header = ControlHeader {
        total_size: (HEADER_SIZE + body_bytes.len()) as u32,
        reserved: 0,
        packet_type: PACKET_TYPE_PLIST,
        tag,
    };
    let mut head = BytesMut::with_capacity(HEADER_SIZE);
    header.encode(&mut head);

    stream.write_all(&head).await?;
    stream.write_all(&body_bytes).await?;
    Ok(())
}

/// Read one control packet and deserialize its plist body as `T`, returning
/// the reply's correlation tag alongside it.
pub async fn read_packet<R, T>(stream: &mut R) -> Result<(u32, T), UmcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut head = [0u8; HEADER_SIZE];
    stream.read_exact(&mut head).await?;
    let header = ControlHeader::decode(&head);

    if header.packet_type != PACKET_TYPE_PLIST {
        return Err(UmcError::InvalidResponse(format!(
            "unexpected packet_type {} (legacy framing is not supported)",
            header.packet_type
        )));
    }

    let body_len = (header.total_size as usize).saturating_sub(HEADER_SIZE);
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).await?;

    let value = plist::from_bytes(&body).map_err(UmcError::from)?;
    Ok((header.tag, value))
}

/// Encode a device port for the wire: `PortNumber` is carried in network
/// byte order inside the little-endian control framing — a well-known
/// asymmetry in the daemon's protocol that must be preserved exactly (spec
/// §4.4 Open Question).
pub fn port_to_wire(port: u16) -> u16 {
    port.to_be()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_to_wire_byte_swaps_on_little_endian_hosts() {
        assert_eq!(port_to_wire(0x1234), 0x3412);
        assert_eq!(port_to_wire(0), 0);
    }

    #[tokio::test]
    async fn write_then_read_round_trips_a_plist_body() {
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Ping {
            #[serde(rename = "MessageType")]
            message_type: String,
        }

        let (mut client, mut server) = tokio::io::duplex(4096);
        let body = Ping { message_type: "Listen".to_string() };
        write_packet(&mut client, 7, &body).await.unwrap();

        let (tag, decoded): (u32, Ping) = read_packet(&mut server).await.unwrap();
        assert_eq!(tag, 7);
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn unexpected_packet_type_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let mut head = BytesMut::with_capacity(HEADER_SIZE);
        ControlHeader { total_size: HEADER_SIZE as u32, reserved: 0, packet_type: 1, tag: 0 }
            .encode(&mut head);
        client.write_all(&head).await.unwrap();

        let err = read_packet::<_, serde::de::IgnoredAny>(&mut server).await.unwrap_err();
        assert!(matches!(err, UmcError::InvalidResponse(_)));
    }
}
