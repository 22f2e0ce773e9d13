// ABOUTME: Shared, process-wide client for the host's USB-multiplexing daemon
// ABOUTME: Lazily starts monitoring on first use and replays the device table to new subscribers

use super::device::{DeviceEvent, DeviceRecord};
use super::messages::{ConnectRequest, ListenRequest, NotificationEnvelope, ResultReply};
use super::{wire, UmcError};
use crate::transport::Stream;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Where the daemon's control socket lives. Overridable so tests can point
/// the hub at a fake daemon instead of the real platform one.
#[derive(Debug, Clone)]
pub enum SocketTarget {
    #[cfg(unix)]
    Unix(std::path::PathBuf),
    Tcp(SocketAddr),
}

impl Default for SocketTarget {
    fn default() -> Self {
        #[cfg(unix)]
        {
            SocketTarget::Unix(std::path::PathBuf::from("/var/run/usbmuxd"))
        }
        #[cfg(not(unix))]
        {
            SocketTarget::Tcp(([127, 0, 0, 1], 27015).into())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Idle,
    Started,
}

struct HubInner {
    target: SocketTarget,
    devices: Mutex<HashMap<u32, DeviceRecord>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DeviceEvent>>>,
    monitor_state: tokio::sync::Mutex<MonitorState>,
}

/// The USB multiplexing client's public entry point (spec §4.4, §6).
///
/// A `Hub` is a cheap, `Clone`-able handle onto shared state; [`Hub::shared`]
/// hands out the same process-wide instance every time, matching the
/// original's `+sharedHub` (lazily started, alive for the process lifetime).
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

static SHARED: OnceLock<Hub> = OnceLock::new();

impl Hub {
    pub fn new(target: SocketTarget) -> Self {
        Self {
            inner: Arc::new(HubInner {
                target,
                devices: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                monitor_state: tokio::sync::Mutex::new(MonitorState::Idle),
            }),
        }
    }

    /// The process-wide shared hub, constructed lazily on first access.
    pub fn shared() -> Hub {
        SHARED.get_or_init(|| Hub::new(SocketTarget::default())).clone()
    }

    /// Open the daemon's control socket, send `Listen`, and spawn the
    /// background task that delivers `Attached`/`Detached` notifications.
    /// Idempotent: a second call while already monitoring is a no-op.
    pub async fn start_monitoring(&self) -> Result<(), UmcError> {
        let mut state = self.inner.monitor_state.lock().await;
        if *state == MonitorState::Started {
            return Ok(());
        }

        let mut stream = Self::connect_daemon(&self.inner.target).await?;
        wire::write_packet(&mut stream, 1, &ListenRequest::new()).await?;
        let (_, reply): (u32, ResultReply) = wire::read_packet(&mut stream).await?;
        if reply.number.unwrap_or(-1) != 0 {
            return Err(UmcError::InvalidCommand(format!(
                "Listen failed with Number={:?}",
                reply.number
            )));
        }

        debug!("usb-mux monitor socket listening");
        *state = MonitorState::Started;
        drop(state);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(Self::monitor_loop(inner, stream));
        Ok(())
    }

    /// Subscribe to attach/detach events. The currently-known device table
    /// is replayed as `Attached` events to the new subscriber before any
    /// live events — the original's "Also posted for each device that is
    /// already attached when the PTUSBHub starts listening".
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let devices = self.inner.devices.lock().unwrap();
            for record in devices.values() {
                let _ = tx.send(DeviceEvent::Attached(record.clone()));
            }
        }
        self.inner.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Open a TCP-like stream to `port` on `device_id` (spec §4.4 `Connect`).
    /// Opens a fresh control socket dedicated to this request; once the
    /// daemon replies `Number=0` the same socket becomes the data stream.
    pub async fn connect_to_device_port(
        &self,
        device_id: u32,
        port: u16,
    ) -> Result<Stream, UmcError> {
        let mut stream = Self::connect_daemon(&self.inner.target).await?;
        wire::write_packet(&mut stream, 1, &ConnectRequest::new(device_id, port)).await?;
        let (_, reply): (u32, ResultReply) = wire::read_packet(&mut stream).await?;
        match reply.number {
            Some(0) => Ok(stream),
            Some(2) => Err(UmcError::BadDevice),
            Some(3) => Err(UmcError::ConnectionRefused),
            other => Err(UmcError::InvalidCommand(format!("Connect failed with Number={:?}", other))),
        }
    }

    /// Currently-known devices, keyed by device id.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.inner.devices.lock().unwrap().values().cloned().collect()
    }

    async fn connect_daemon(target: &SocketTarget) -> Result<Stream, UmcError> {
        match target {
            #[cfg(unix)]
            SocketTarget::Unix(path) => Ok(Stream::from(UnixStream::connect(path).await?)),
            SocketTarget::Tcp(addr) => Ok(Stream::from(TcpStream::connect(addr).await?)),
        }
    }

    async fn monitor_loop(inner: Arc<HubInner>, mut stream: Stream) {
        loop {
            let (_, envelope): (u32, NotificationEnvelope) =
                match wire::read_packet(&mut stream).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "usb-mux monitor socket error, stopping monitoring");
                        *inner.monitor_state.lock().await = MonitorState::Idle;
                        return;
                    }
                };

            match envelope.message_type.as_str() {
                "Attached" => {
                    let (Some(device_id), Some(properties)) = (envelope.device_id, envelope.properties)
                    else {
                        warn!("Attached notification missing DeviceID/Properties");
                        continue;
                    };
                    let record = DeviceRecord { device_id, properties };
                    inner.devices.lock().unwrap().insert(device_id, record.clone());
                    Self::broadcast(&inner, DeviceEvent::Attached(record));
                }
                "Detached" => {
                    let Some(device_id) = envelope.device_id else {
                        warn!("Detached notification missing DeviceID");
                        continue;
                    };
                    inner.devices.lock().unwrap().remove(&device_id);
                    Self::broadcast(&inner, DeviceEvent::Detached { device_id });
                }
                "Result" => {
                    // A stray reply on the monitor socket; nothing is awaiting it.
                }
                other => {
                    warn!(message_type = other, "unrecognized usb-mux notification, ignoring");
                }
            }
        }
    }

    fn broadcast(inner: &HubInner, event: DeviceEvent) {
        let mut subs = inner.subscribers.lock().unwrap();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::device::DeviceProperties;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn fake_daemon_accepting_connect(number: i64) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = [0u8; wire::HEADER_SIZE];
            socket.read_exact(&mut head).await.unwrap();
            let total_size = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
            let mut body = vec![0u8; total_size - wire::HEADER_SIZE];
            socket.read_exact(&mut body).await.unwrap();

            let mut reply_body = Vec::new();
            plist::to_writer_xml(&mut reply_body, &ResultReply { number: Some(number) }).unwrap();
            let mut reply = Vec::new();
            reply.extend_from_slice(&((wire::HEADER_SIZE + reply_body.len()) as u32).to_le_bytes());
            reply.extend_from_slice(&0u32.to_le_bytes());
            reply.extend_from_slice(&wire::PACKET_TYPE_PLIST.to_le_bytes());
            reply.extend_from_slice(&1u32.to_le_bytes());
            reply.extend_from_slice(&reply_body);
            socket.write_all(&reply).await.unwrap();
            // Keep the socket open so it can be handed off as the data stream.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        });
        addr
    }

    #[tokio::test]
    async fn connect_to_device_port_succeeds_on_result_zero() {
        let addr = fake_daemon_accepting_connect(0).await;
        let hub = Hub::new(SocketTarget::Tcp(addr));
        hub.connect_to_device_port(3, 80).await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_device_port_maps_bad_device() {
        let addr = fake_daemon_accepting_connect(2).await;
        let hub = Hub::new(SocketTarget::Tcp(addr));
        let err = hub.connect_to_device_port(3, 80).await.unwrap_err();
        assert!(matches!(err, UmcError::BadDevice));
    }

    #[tokio::test]
    async fn connect_to_device_port_maps_connection_refused() {
        let addr = fake_daemon_accepting_connect(3).await;
        let hub = Hub::new(SocketTarget::Tcp(addr));
        let err = hub.connect_to_device_port(3, 80).await.unwrap_err();
        assert!(matches!(err, UmcError::ConnectionRefused));
    }

    #[tokio::test]
    async fn subscribe_replays_current_devices() {
        let hub = Hub::new(SocketTarget::default());
        let record = DeviceRecord {
            device_id: 3,
            properties: DeviceProperties {
                serial_number: "abc".to_string(),
                product_id: 1,
                location_id: 2,
                connection_speed: 480_000_000,
                connection_type: "USB".to_string(),
            },
        };
        hub.inner.devices.lock().unwrap().insert(3, record.clone());

        let mut rx = hub.subscribe();
        let event = rx.recv().await.unwrap();
        assert_eq!(event, DeviceEvent::Attached(record));
    }
}
