// ABOUTME: Byte-stream channel abstraction shared by network and USB-bridged peers
// ABOUTME: Gives the frame engine one read/write/close surface over TCP and Unix-domain sockets

//! Uniform read/write/close over the concrete stream types the engine is
//! driven by (spec §4.1): plain TCP sockets for network peers, and the
//! Unix-domain socket handed off by the USB multiplexing client once a
//! `Connect` succeeds.
//!
//! `Stream` exists (rather than using a boxed `dyn AsyncRead + AsyncWrite`)
//! so that descriptor access is available uniformly across both transports,
//! matching the "descriptor access (for USB-produced streams, to expose the
//! same semantics as native sockets)" requirement.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};

/// How a channel's underlying stream should be shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// `close`: abandon the connection immediately, discarding any
    /// in-flight data.
    Abortive,
    /// `cancel`: half-close the write side; the read side keeps running
    /// until the peer also closes.
    Graceful,
}

/// A concrete byte-stream channel: either a plain TCP socket (network peers)
/// or a Unix-domain socket (USB-bridged peers, produced by the UMC).
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    /// Half-close the write side for a graceful shutdown, or do nothing for
    /// an abortive one — callers perform the abortive close by dropping the
    /// `Stream` outright, which is the only way to guarantee in-flight reads
    /// are abandoned rather than drained.
    pub async fn close(&mut self, mode: CloseMode) -> io::Result<()> {
        match mode {
            CloseMode::Graceful => self.shutdown().await,
            CloseMode::Abortive => Ok(()),
        }
    }

    #[cfg(unix)]
    pub fn raw_fd(&self) -> RawFd {
        match self {
            Stream::Tcp(s) => s.as_raw_fd(),
            Stream::Unix(s) => s.as_raw_fd(),
        }
    }
}

impl From<TcpStream> for Stream {
    fn from(s: TcpStream) -> Self {
        Stream::Tcp(s)
    }
}

impl From<UnixStream> for Stream {
    fn from(s: UnixStream) -> Self {
        Stream::Unix(s)
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
