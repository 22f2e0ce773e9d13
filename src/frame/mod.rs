// ABOUTME: Frame wire format and codec for the tagged-frame protocol
// ABOUTME: Encodes/decodes one 16-byte big-endian header plus its optional payload

//! Frame codec: one application message is a 16-byte header immediately
//! followed by `payload_size` payload bytes (spec §3/§4.2).
//!
//! The canonical header layout is the four-field, big-endian form below.
//! Implementations historically shipped a second, divergent layout; this one
//! rejects anything that does not parse as the form documented here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sentinel frame type that requests graceful shutdown of the channel.
///
/// Applications must not use this value as a legitimate frame type.
pub const END_OF_STREAM: u32 = 0xFFFF_FFFF;

/// Protocol version understood by this codec. Any other value is rejected.
pub const VERSION: u32 = 1;

/// Size in bytes of the fixed frame header.
pub const HEADER_SIZE: usize = 16;

/// Errors raised while encoding or decoding a frame.
///
/// All of these are fatal to the channel that produced them (spec §7).
#[derive(Debug, Error)]
pub enum FrameCodecError {
    #[error("invalid frame version: expected {expected}, got {actual}")]
    InvalidVersion { expected: u32, actual: u32 },

    #[error("frame payload size {size} exceeds ceiling {ceiling}")]
    PayloadTooLarge { size: u32, ceiling: u32 },

    #[error("stream closed mid-frame (peer sent {bytes_read} of {expected} header/payload bytes)")]
    ShortRead { bytes_read: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The 16-byte frame header, in network byte order.
///
/// `tag == 0` is reserved to mean "no correlation" (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u32,
    pub frame_type: u32,
    pub tag: u32,
    pub payload_size: u32,
}

impl FrameHeader {
    /// Construct a header for an application frame with the current protocol
    /// version baked in.
    pub fn new(frame_type: u32, tag: u32, payload_size: u32) -> Self {
        Self { version: VERSION, frame_type, tag, payload_size }
    }

    /// The header for the `END_OF_STREAM` sentinel frame (spec §4.3 `cancel`).
    pub fn end_of_stream() -> Self {
        Self { version: VERSION, frame_type: END_OF_STREAM, tag: 0, payload_size: 0 }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.frame_type == END_OF_STREAM
    }

    /// Encode the header to 16 bytes in network byte order.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.version);
        buf.put_u32(self.frame_type);
        buf.put_u32(self.tag);
        buf.put_u32(self.payload_size);
    }

    /// Decode a header from exactly `HEADER_SIZE` buffered bytes, validating
    /// `version == 1`. Does not enforce the payload ceiling; callers check
    /// that separately once they know it (see [`check_payload_size`]).
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        debug_assert!(buf.remaining() >= HEADER_SIZE);
        let version = buf.get_u32();
        if version != VERSION {
            return Err(FrameCodecError::InvalidVersion { expected: VERSION, actual: version });
        }
        let frame_type = buf.get_u32();
        let tag = buf.get_u32();
        let payload_size = buf.get_u32();
        Ok(Self { version, frame_type, tag, payload_size })
    }
}

/// Reject `payload_size` before any allocation is made for it (spec §8
/// "Oversized frame").
pub fn check_payload_size(payload_size: u32, ceiling: u32) -> Result<(), FrameCodecError> {
    if payload_size > ceiling {
        return Err(FrameCodecError::PayloadTooLarge { size: payload_size, ceiling });
    }
    Ok(())
}

/// Encode `[header || payload]` and write it to `stream` in one call.
///
/// The payload is passed by reference; when the caller already owns a
/// `Bytes` handle, no payload copy is made — only the 16-byte header is
/// freshly allocated.
pub async fn write_frame<W>(
    stream: &mut W,
    header: FrameHeader,
    payload: &[u8],
) -> Result<(), FrameCodecError>
where
    W: AsyncWrite + Unpin,
{
    let mut head = BytesMut::with_capacity(HEADER_SIZE);
    header.encode(&mut head);
    stream.write_all(&head).await?;
    if !payload.is_empty() {
        stream.write_all(payload).await?;
    }
    Ok(())
}

/// Read exactly one header off the wire, buffering through `leftover`.
///
/// `leftover` is a per-channel buffer that outlives any single call and is
/// shared with [`read_payload`]/[`discard_payload`] for the same stream.
/// Cancellation safety depends on this: every byte that actually arrives off
/// the wire is appended straight into `leftover` (owned by the caller, not by
/// the future returned here), so if this call is raced against something
/// else in a `select!` and loses, any bytes it already pulled off the wire
/// are still there for the next call — nothing is read twice, and nothing is
/// discarded. Returns `Ok(None)` on a clean EOF before any header bytes have
/// arrived; a partial header is a `ShortRead`.
pub async fn read_header<R>(
    stream: &mut R,
    leftover: &mut BytesMut,
) -> Result<Option<FrameHeader>, FrameCodecError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if leftover.len() >= HEADER_SIZE {
            let mut cursor = Cursor::new(&leftover[..HEADER_SIZE]);
            let header = FrameHeader::decode(&mut cursor)?;
            leftover.advance(HEADER_SIZE);
            return Ok(Some(header));
        }
        let read_before = leftover.len();
        if stream.read_buf(leftover).await? == 0 {
            return if read_before == 0 {
                Ok(None)
            } else {
                Err(FrameCodecError::ShortRead { bytes_read: read_before, expected: HEADER_SIZE })
            };
        }
    }
}

/// Read exactly `payload_size` bytes into a freshly allocated, contiguous
/// buffer, handed to the consumer as a ref-counted [`Bytes`] (spec §4.2, "a
/// fresh, contiguously-addressable buffer"). Bytes already pulled ahead into
/// `leftover` by [`read_header`] are consumed first.
pub async fn read_payload<R>(
    stream: &mut R,
    leftover: &mut BytesMut,
    payload_size: u32,
) -> Result<Bytes, FrameCodecError>
where
    R: AsyncRead + Unpin,
{
    let len = payload_size as usize;
    let mut buf = BytesMut::with_capacity(len);
    let buffered = leftover.len().min(len);
    buf.extend_from_slice(&leftover[..buffered]);
    leftover.advance(buffered);

    let mut read = buffered;
    buf.resize(len, 0);
    while read < len {
        let n = stream.read(&mut buf[read..]).await?;
        if n == 0 {
            return Err(FrameCodecError::ShortRead { bytes_read: read, expected: len });
        }
        read += n;
    }
    Ok(buf.freeze())
}

/// Discard exactly `payload_size` bytes without retaining them (the
/// `should_accept == false` path of spec §4.2). Bytes already pulled ahead
/// into `leftover` by [`read_header`] are consumed first.
pub async fn discard_payload<R>(
    stream: &mut R,
    leftover: &mut BytesMut,
    payload_size: u32,
) -> Result<(), FrameCodecError>
where
    R: AsyncRead + Unpin,
{
    let mut remaining = payload_size as usize;
    let buffered = leftover.len().min(remaining);
    leftover.advance(buffered);
    remaining -= buffered;

    let mut scratch = [0u8; 8192];
    while remaining > 0 {
        let chunk = remaining.min(scratch.len());
        let n = stream.read(&mut scratch[..chunk]).await?;
        if n == 0 {
            return Err(FrameCodecError::ShortRead {
                bytes_read: (payload_size as usize) - remaining,
                expected: payload_size as usize,
            });
        }
        remaining -= n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = FrameHeader::new(101, 7, 42);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);

        let mut cursor = Cursor::new(buf.as_ref());
        let decoded = FrameHeader::decode(&mut cursor).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(0);
        let mut cursor = Cursor::new(buf.as_ref());
        let err = FrameHeader::decode(&mut cursor).unwrap_err();
        assert!(matches!(err, FrameCodecError::InvalidVersion { expected: 1, actual: 2 }));
    }

    #[test]
    fn end_of_stream_sentinel() {
        let header = FrameHeader::end_of_stream();
        assert!(header.is_end_of_stream());
        assert_eq!(header.frame_type, END_OF_STREAM);
        assert_eq!(header.tag, 0);
        assert_eq!(header.payload_size, 0);
    }

    #[test]
    fn payload_ceiling_rejects_oversized() {
        let err = check_payload_size(1 << 30, crate::config::DEFAULT_PAYLOAD_CEILING).unwrap_err();
        assert!(matches!(err, FrameCodecError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn write_then_read_frame() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let header = FrameHeader::new(101, 7, 2);
        write_frame(&mut client, header, b"hi").await.unwrap();

        let mut leftover = BytesMut::new();
        let read_header = read_header(&mut server, &mut leftover).await.unwrap().unwrap();
        assert_eq!(read_header, header);
        let payload =
            read_payload(&mut server, &mut leftover, read_header.payload_size).await.unwrap();
        assert_eq!(&payload[..], b"hi");
    }

    #[tokio::test]
    async fn header_only_frame_has_no_payload_read() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let header = FrameHeader::new(5, 0, 0);
        write_frame(&mut client, header, b"").await.unwrap();

        let mut leftover = BytesMut::new();
        let read_header = read_header(&mut server, &mut leftover).await.unwrap().unwrap();
        assert_eq!(read_header.payload_size, 0);
    }

    #[tokio::test]
    async fn clean_eof_before_header_is_none() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let mut leftover = BytesMut::new();
        assert!(read_header(&mut server, &mut leftover).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn short_read_mid_header_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(&[0, 0, 0, 1]).await.unwrap();
        drop(client);
        let mut leftover = BytesMut::new();
        let err = read_header(&mut server, &mut leftover).await.unwrap_err();
        assert!(matches!(err, FrameCodecError::ShortRead { bytes_read: 4, expected: HEADER_SIZE }));
    }

    #[tokio::test]
    async fn discard_then_continue_reading() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        let big = vec![0xABu8; 1024];
        write_frame(&mut client, FrameHeader::new(101, 1, big.len() as u32), &big).await.unwrap();
        write_frame(&mut client, FrameHeader::new(102, 1, 0), b"").await.unwrap();

        let mut leftover = BytesMut::new();
        let h1 = read_header(&mut server, &mut leftover).await.unwrap().unwrap();
        assert_eq!(h1.frame_type, 101);
        discard_payload(&mut server, &mut leftover, h1.payload_size).await.unwrap();

        let h2 = read_header(&mut server, &mut leftover).await.unwrap().unwrap();
        assert_eq!(h2.frame_type, 102);
        assert_eq!(h2.payload_size, 0);
    }

    /// A header that arrives split across two separate reads (simulating a
    /// TCP segment boundary mid-header) is still assembled correctly, and
    /// bytes from the second read that belong to the payload are preserved
    /// for the following `read_payload` call.
    #[tokio::test]
    async fn header_and_payload_split_across_reads_is_preserved() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        let header = FrameHeader::new(9, 3, 4);
        let mut wire = BytesMut::new();
        header.encode(&mut wire);
        wire.extend_from_slice(b"data");

        // Split the write so the first read lands mid-header and the second
        // carries the rest of the header plus the whole payload.
        client.write_all(&wire[..6]).await.unwrap();
        let rest = wire[6..].to_vec();
        let forward = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            client.write_all(&rest).await.unwrap();
            client
        });

        let mut leftover = BytesMut::new();
        let decoded = read_header(&mut server, &mut leftover).await.unwrap().unwrap();
        assert_eq!(decoded, header);
        let payload = read_payload(&mut server, &mut leftover, decoded.payload_size).await.unwrap();
        assert_eq!(&payload[..], b"data");
        forward.await.unwrap();
    }
}
