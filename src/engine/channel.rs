// ABOUTME: Full-duplex frame protocol engine: read loop, write queue, tag allocation, lifecycle
// ABOUTME: One Tokio task per channel drives all I/O completions and consumer callbacks serially

use crate::config::ChannelConfig;
use crate::engine::{Address, ChannelConsumer, ChannelState, EngineError, TagAllocator};
use crate::frame::{self, FrameHeader, HEADER_SIZE};
use crate::transport::Stream;
use crate::usbmux::Hub;
use bytes::{Bytes, BytesMut};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlSignal {
    Idle,
    Close,
    Cancel,
}

struct SendCommand {
    header: FrameHeader,
    payload: Bytes,
    byte_permit: tokio::sync::OwnedSemaphorePermit,
    respond: Option<oneshot::Sender<Result<(), EngineError>>>,
}

/// One logical, full-duplex frame connection between two peers (spec §3).
///
/// A `Channel` exclusively owns its stream handle and write queue; dropping
/// every clone of a channel without calling [`close`](Channel::close) is
/// equivalent to an abortive close.
pub struct Channel {
    state_rx: watch::Receiver<ChannelState>,
    control: watch::Sender<ControlSignal>,
    commands: mpsc::Sender<SendCommand>,
    tag_allocator: Arc<TagAllocator>,
    write_bytes: Arc<Semaphore>,
    config: ChannelConfig,
    attachment: Arc<Mutex<Option<Box<dyn Any + Send + Sync>>>>,
    local_addr: Option<SocketAddr>,
}

impl Clone for Channel {
    fn clone(&self) -> Self {
        Self {
            state_rx: self.state_rx.clone(),
            control: self.control.clone(),
            commands: self.commands.clone(),
            tag_allocator: Arc::clone(&self.tag_allocator),
            write_bytes: Arc::clone(&self.write_bytes),
            config: self.config,
            attachment: Arc::clone(&self.attachment),
            local_addr: self.local_addr,
        }
    }
}

impl Channel {
    /// Connect to a TCP port at an IPv4/IPv6 address (spec §4.3 `connect`).
    pub async fn connect_network(
        addr: SocketAddr,
        consumer: Arc<dyn ChannelConsumer>,
        config: ChannelConfig,
    ) -> Result<Channel, EngineError> {
        let socket = TcpStream::connect(addr).await?;
        debug!(%addr, "connected over network");
        Ok(Self::spawn_connected(Stream::from(socket), consumer, config))
    }

    /// Connect to a port on a device tethered over USB (spec §4.3 `connect
    /// over USB`). Delegates to the USB multiplexing client hub.
    pub async fn connect_usb(
        device_id: u32,
        port: u16,
        consumer: Arc<dyn ChannelConsumer>,
        config: ChannelConfig,
    ) -> Result<Channel, EngineError> {
        let stream = Hub::shared().connect_to_device_port(device_id, port).await?;
        debug!(device_id, port, "connected over usb");
        Ok(Self::spawn_connected(stream, consumer, config))
    }

    /// Attach an already-connected stream and enter `Connected` (spec §4.3
    /// `start_reading_from`).
    pub fn start_reading_from(
        stream: Stream,
        consumer: Arc<dyn ChannelConsumer>,
        config: ChannelConfig,
    ) -> Channel {
        Self::spawn_connected(stream, consumer, config)
    }

    /// Bind and listen for connections (spec §4.3 `listen`). Each accepted
    /// client becomes a new channel in `Connected`, delivered to `consumer`
    /// via [`ChannelConsumer::on_accept`]; the listening channel retains no
    /// ownership of it.
    pub async fn listen(
        addr: SocketAddr,
        consumer: Arc<dyn ChannelConsumer>,
        config: ChannelConfig,
    ) -> Result<Channel, EngineError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr().ok();
        debug!(%addr, "listening");

        let (commands_tx, mut commands_rx) = mpsc::channel::<SendCommand>(1);
        let (control_tx, mut control_rx) = watch::channel(ControlSignal::Idle);
        let (state_tx, state_rx) = watch::channel(ChannelState::Listening);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    changed = control_rx.changed() => {
                        if changed.is_ok() {
                            let _ = state_tx.send(ChannelState::Closed);
                            consumer.on_end(None);
                        }
                        return;
                    }

                    accepted = listener.accept() => {
                        match accepted {
                            Ok((socket, peer)) => {
                                let child = Self::spawn_connected(
                                    Stream::from(socket),
                                    Arc::clone(&consumer),
                                    config,
                                );
                                consumer.on_accept(child, Address::network(peer.ip(), peer.port()));
                            }
                            Err(e) => {
                                warn!(error = %e, "accept failed");
                                let _ = state_tx.send(ChannelState::Closed);
                                consumer.on_end(Some(EngineError::from(e)));
                                return;
                            }
                        }
                    }

                    cmd = commands_rx.recv() => {
                        if let Some(SendCommand { respond: Some(respond), .. }) = cmd {
                            let _ = respond.send(Err(EngineError::InvalidFrame(
                                "cannot send a frame on a listening channel".into(),
                            )));
                        }
                    }
                }
            }
        });

        Ok(Channel {
            state_rx,
            control: control_tx,
            commands: commands_tx,
            tag_allocator: Arc::new(TagAllocator::new()),
            write_bytes: Arc::new(Semaphore::new(config.write_queue_bytes)),
            config,
            attachment: Arc::new(Mutex::new(None)),
            local_addr,
        })
    }

    fn spawn_connected(
        stream: Stream,
        consumer: Arc<dyn ChannelConsumer>,
        config: ChannelConfig,
    ) -> Channel {
        let (commands_tx, commands_rx) = mpsc::channel(config.write_queue_frames.max(1));
        let (control_tx, control_rx) = watch::channel(ControlSignal::Idle);
        let (state_tx, state_rx) = watch::channel(ChannelState::Connected);
        let write_bytes = Arc::new(Semaphore::new(config.write_queue_bytes));

        tokio::spawn(run_connected(stream, consumer, config, commands_rx, control_rx, state_tx));

        Channel {
            state_rx,
            control: control_tx,
            commands: commands_tx,
            tag_allocator: Arc::new(TagAllocator::new()),
            write_bytes,
            config,
            attachment: Arc::new(Mutex::new(None)),
            local_addr: None,
        }
    }

    /// The bound local address, for a listening channel created with an
    /// ephemeral port (`:0`).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Send a frame, allocating a tag automatically when `tag == 0` (spec
    /// §4.3 `send_frame`). Resolves once the bytes are fully flushed to the
    /// stream, or with a terminal error. Suspends while the write queue is
    /// at capacity (spec §4.3 Backpressure).
    pub async fn send_frame(
        &self,
        frame_type: u32,
        tag: u32,
        payload: Bytes,
    ) -> Result<(), EngineError> {
        if frame_type == frame::END_OF_STREAM {
            return Err(EngineError::InvalidFrame(
                "applications must not send the END_OF_STREAM sentinel frame type; use cancel() instead".into(),
            ));
        }

        let tag = if tag == 0 { self.tag_allocator.allocate() } else { tag };
        let payload_len = payload.len() as u32;
        frame::check_payload_size(payload_len, self.config.payload_ceiling)?;

        let reserve = (HEADER_SIZE + payload.len()).min(self.config.write_queue_bytes.max(HEADER_SIZE)) as u32;
        let permit = Arc::clone(&self.write_bytes)
            .acquire_many_owned(reserve)
            .await
            .map_err(|_| EngineError::Cancelled)?;

        let (respond_tx, respond_rx) = oneshot::channel();
        let header = FrameHeader::new(frame_type, tag, payload_len);
        let command =
            SendCommand { header, payload, byte_permit: permit, respond: Some(respond_tx) };

        self.commands.send(command).await.map_err(|_| EngineError::Cancelled)?;
        respond_rx.await.unwrap_or(Err(EngineError::Cancelled))
    }

    /// Abortive close (spec §4.3 `close`): in-flight reads are abandoned,
    /// pending writes fail with `Cancelled`, and `on_end(None)` is delivered
    /// exactly once. Immediate and non-blocking to the caller.
    pub fn close(&self) {
        let _ = self.control.send(ControlSignal::Close);
    }

    /// Graceful close (spec §4.3 `cancel`): the write queue drains, an
    /// `END_OF_STREAM` sentinel is enqueued, and the stream is half-closed
    /// for writing. Reading continues until the peer also closes.
    pub fn cancel(&self) {
        let _ = self.control.send(ControlSignal::Cancel);
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ChannelState::Listening
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Attach an arbitrary, opaque value to this channel.
    pub fn set_attachment<T: Any + Send + Sync>(&self, value: T) {
        *self.attachment.lock().unwrap() = Some(Box::new(value));
    }

    /// Borrow the channel's attachment, if one is set and of type `T`.
    pub fn with_attachment<T: Any + Send + Sync, R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let guard = self.attachment.lock().unwrap();
        f(guard.as_ref().and_then(|b| b.downcast_ref::<T>()))
    }
}

async fn run_connected(
    stream: Stream,
    consumer: Arc<dyn ChannelConsumer>,
    config: ChannelConfig,
    mut commands: mpsc::Receiver<SendCommand>,
    mut control_rx: watch::Receiver<ControlSignal>,
    state_tx: watch::Sender<ChannelState>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    // Persistent across loop iterations so that a `read_header` call dropped
    // mid-poll by `select!` never loses bytes already pulled off the wire.
    let mut read_buf = BytesMut::with_capacity(config.read_buffer_size);

    loop {
        tokio::select! {
            biased;

            changed = control_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let signal = *control_rx.borrow();
                match signal {
                    ControlSignal::Close => {
                        drain_pending_as_cancelled(&mut commands);
                        let _ = state_tx.send(ChannelState::Closed);
                        consumer.on_end(None);
                        return;
                    }
                    ControlSignal::Cancel => {
                        let _ = state_tx.send(ChannelState::Cancelling);
                        if let Err(e) = drain_and_close_writer(&mut commands, &mut writer).await {
                            let _ = state_tx.send(ChannelState::Closed);
                            consumer.on_end(Some(e));
                            return;
                        }
                        // Keep looping: the read half keeps running until the peer closes.
                    }
                    ControlSignal::Idle => {}
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(SendCommand { header, payload, byte_permit, respond }) => {
                        // Only an abortive `close` may interrupt a write already in
                        // flight — `cancel` is graceful and must let it finish (spec
                        // §4.3 `cancel`), so this only races against a `Close`
                        // transition specifically, not against `changed()` in general.
                        let write_completed: bool;
                        tokio::select! {
                            biased;

                            _ = control_rx.wait_for(|signal| *signal == ControlSignal::Close) => {
                                drop(byte_permit);
                                if let Some(respond) = respond {
                                    let _ = respond.send(Err(EngineError::Cancelled));
                                }
                                drain_pending_as_cancelled(&mut commands);
                                let _ = state_tx.send(ChannelState::Closed);
                                consumer.on_end(None);
                                return;
                            }

                            result = frame::write_frame(&mut writer, header, &payload) => {
                                let result = result.map_err(EngineError::from);
                                drop(byte_permit);
                                if let Some(respond) = respond {
                                    let _ = respond.send(result.clone());
                                }
                                if let Err(e) = result {
                                    let _ = state_tx.send(ChannelState::Closed);
                                    consumer.on_end(Some(e));
                                    return;
                                }
                                write_completed = true;
                            }
                        }
                        // A `cancel()` that arrived while the write above was in
                        // flight didn't interrupt it; honor it now that the write
                        // has completed normally.
                        if write_completed && *control_rx.borrow() == ControlSignal::Cancel {
                            let _ = state_tx.send(ChannelState::Cancelling);
                            if let Err(e) = drain_and_close_writer(&mut commands, &mut writer).await {
                                let _ = state_tx.send(ChannelState::Closed);
                                consumer.on_end(Some(e));
                                return;
                            }
                        }
                    }
                    None => {
                        let _ = state_tx.send(ChannelState::Closed);
                        consumer.on_end(None);
                        return;
                    }
                }
            }

            header = frame::read_header(&mut reader, &mut read_buf) => {
                match header {
                    Ok(None) => {
                        let _ = state_tx.send(ChannelState::Closed);
                        consumer.on_end(None);
                        return;
                    }
                    Ok(Some(header)) if header.is_end_of_stream() => {
                        let _ = state_tx.send(ChannelState::Closed);
                        consumer.on_end(None);
                        return;
                    }
                    Ok(Some(header)) => {
                        if let Err(e) = frame::check_payload_size(header.payload_size, config.payload_ceiling) {
                            let _ = state_tx.send(ChannelState::Closed);
                            consumer.on_end(Some(EngineError::from(e)));
                            return;
                        }
                        if header.payload_size == 0 {
                            consumer.on_frame(header.frame_type, header.tag, Bytes::new());
                            continue;
                        }
                        if consumer.should_accept(header.frame_type, header.tag, header.payload_size) {
                            match frame::read_payload(&mut reader, &mut read_buf, header.payload_size).await {
                                Ok(payload) => consumer.on_frame(header.frame_type, header.tag, payload),
                                Err(e) => {
                                    let _ = state_tx.send(ChannelState::Closed);
                                    consumer.on_end(Some(EngineError::from(e)));
                                    return;
                                }
                            }
                        } else if let Err(e) = frame::discard_payload(&mut reader, &mut read_buf, header.payload_size).await {
                            let _ = state_tx.send(ChannelState::Closed);
                            consumer.on_end(Some(EngineError::from(e)));
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = state_tx.send(ChannelState::Closed);
                        consumer.on_end(Some(EngineError::from(e)));
                        return;
                    }
                }
            }
        }
    }
}

fn drain_pending_as_cancelled(commands: &mut mpsc::Receiver<SendCommand>) {
    while let Ok(cmd) = commands.try_recv() {
        if let Some(respond) = cmd.respond {
            let _ = respond.send(Err(EngineError::Cancelled));
        }
    }
}

/// Flush any sends already queued, then write the `END_OF_STREAM` sentinel
/// and half-close the write side (spec §4.3 `cancel`).
async fn drain_and_close_writer<W>(
    commands: &mut mpsc::Receiver<SendCommand>,
    writer: &mut W,
) -> Result<(), EngineError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Ok(cmd) = commands.try_recv() {
        let result = frame::write_frame(writer, cmd.header, &cmd.payload).await.map_err(EngineError::from);
        drop(cmd.byte_permit);
        if let Some(respond) = cmd.respond {
            let _ = respond.send(result.clone());
        }
        result?;
    }
    frame::write_frame(writer, FrameHeader::end_of_stream(), b"").await?;
    writer.shutdown().await.map_err(EngineError::from)
}
