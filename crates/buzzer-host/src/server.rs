//! Buzzer host server.
//!
//! This module provides the TCP listener that buzzers connect to:
//! - Handshake (version byte, then id byte)
//! - Event broadcast for every byte a buzzer sends
//! - Mode commands queued through the [`DeviceRegistry`]

use std::net::SocketAddr;
use std::time::Duration;

use buzzer_protocol::{decode_device_byte, DeviceMessage, ModuleId, PROTOCOL_VERSION};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::registry::{DeviceHandle, DeviceRegistry};

/// Port buzzers connect to.
pub const DEFAULT_PORT: u16 = 9753;

/// Mode commands queued per buzzer before senders wait.
const COMMAND_QUEUE: usize = 16;

/// Events buffered per subscriber.
const EVENT_CAPACITY: usize = 256;

/// Errors that can occur on the host side.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected handshake byte 0x{0:02X}")]
    Handshake(u8),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Device {0} is not connected")]
    NotConnected(ModuleId),
}

/// Configuration for the buzzer host.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Time a new connection has to complete the handshake.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Something a buzzer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A buzzer completed its handshake.
    Joined {
        id: ModuleId,
        version: u8,
        addr: SocketAddr,
    },
    /// The button was pressed.
    Press { id: ModuleId },
    /// Liveness beacon.
    Heartbeat { id: ModuleId },
    /// The buzzer did not understand something we sent.
    ErrorReport { id: ModuleId },
    /// The buzzer sent a byte that is not a device message.
    Unknown { id: ModuleId, byte: u8 },
    /// The connection closed.
    Left { id: ModuleId },
}

impl HostEvent {
    pub fn id(&self) -> ModuleId {
        match self {
            HostEvent::Joined { id, .. }
            | HostEvent::Press { id }
            | HostEvent::Heartbeat { id }
            | HostEvent::ErrorReport { id }
            | HostEvent::Unknown { id, .. }
            | HostEvent::Left { id } => *id,
        }
    }

    /// Classify a byte received from buzzer `id` after its handshake.
    pub fn from_byte(id: ModuleId, byte: u8) -> Self {
        match decode_device_byte(byte) {
            Ok(DeviceMessage::Press) => HostEvent::Press { id },
            Ok(DeviceMessage::Heartbeat) => HostEvent::Heartbeat { id },
            Ok(DeviceMessage::BadMessage) => HostEvent::ErrorReport { id },
            Ok(DeviceMessage::Version(_) | DeviceMessage::Id(_)) | Err(_) => {
                HostEvent::Unknown { id, byte }
            }
        }
    }
}

/// The buzzer host server.
pub struct BuzzerServer {
    config: ServerConfig,
    registry: DeviceRegistry,
    event_tx: broadcast::Sender<HostEvent>,
}

impl BuzzerServer {
    pub fn new(config: ServerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            registry: DeviceRegistry::new(),
            event_tx,
        }
    }

    /// Receive every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.event_tx.subscribe()
    }

    /// Registry of connected buzzers, for sending commands.
    pub fn registry(&self) -> DeviceRegistry {
        self.registry.clone()
    }

    /// Bind the configured address and serve forever.
    pub async fn run(self) -> Result<(), HostError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve buzzers on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HostError> {
        info!("Buzzer host listening on {}", listener.local_addr()?);

        let mut next_conn: u64 = 0;
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    next_conn += 1;
                    let conn = next_conn;
                    let registry = self.registry.clone();
                    let events = self.event_tx.clone();
                    let handshake_timeout = self.config.handshake_timeout;

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(
                            stream,
                            addr,
                            conn,
                            registry,
                            events,
                            handshake_timeout,
                        )
                        .await
                        {
                            warn!("Connection from {} closed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Read the version and id announce.
async fn handshake(
    stream: &mut TcpStream,
    limit: Duration,
) -> Result<(u8, ModuleId), HostError> {
    let mut hello = [0u8; 2];
    tokio::time::timeout(limit, stream.read_exact(&mut hello))
        .await
        .map_err(|_| HostError::HandshakeTimeout)??;

    let version = match decode_device_byte(hello[0]) {
        Ok(DeviceMessage::Version(version)) => version,
        _ => return Err(HostError::Handshake(hello[0])),
    };
    let id = match decode_device_byte(hello[1]) {
        Ok(DeviceMessage::Id(id)) => id,
        _ => return Err(HostError::Handshake(hello[1])),
    };

    if version != PROTOCOL_VERSION {
        warn!(
            "Device {} speaks version {}, expected {}",
            id, version, PROTOCOL_VERSION
        );
    }
    Ok((version, id))
}

/// Handle a single buzzer connection.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    conn: u64,
    registry: DeviceRegistry,
    events: broadcast::Sender<HostEvent>,
    handshake_timeout: Duration,
) -> Result<(), HostError> {
    debug!("New connection from {}", addr);
    stream.set_nodelay(true)?;

    let (version, id) = handshake(&mut stream, handshake_timeout).await?;

    let (tx, mut rx) = mpsc::channel(COMMAND_QUEUE);
    if registry
        .insert(DeviceHandle::new(id, addr, version, conn, tx))
        .await
        .is_some()
    {
        warn!("Device {} reconnected, dropping previous connection", id);
    }
    info!("Device {} joined from {} (version {})", id, addr, version);
    let _ = events.send(HostEvent::Joined { id, version, addr });

    let result = run_session(&mut stream, id, &mut rx, &events).await;

    registry.remove(id, conn).await;
    info!("Device {} left", id);
    let _ = events.send(HostEvent::Left { id });
    result
}

/// Relay bytes both ways until either side gives up.
async fn run_session(
    stream: &mut TcpStream,
    id: ModuleId,
    commands: &mut mpsc::Receiver<u8>,
    events: &broadcast::Sender<HostEvent>,
) -> Result<(), HostError> {
    let (mut reader, mut writer) = stream.split();
    let mut buf = [0u8; 64];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                for &byte in &buf[..n] {
                    let event = HostEvent::from_byte(id, byte);
                    match &event {
                        HostEvent::Press { .. } => info!("Device {} pressed", id),
                        HostEvent::Heartbeat { .. } => debug!("Heartbeat from {}", id),
                        HostEvent::ErrorReport { .. } => warn!("Device {} rejected a command", id),
                        HostEvent::Unknown { byte, .. } => {
                            warn!("Unknown byte 0x{:02X} from {}", byte, id)
                        }
                        _ => {}
                    }
                    let _ = events.send(event);
                }
            }
            command = commands.recv() => match command {
                Some(byte) => {
                    debug!("Sending 0x{:02X} to {}", byte, id);
                    writer.write_all(&[byte]).await?;
                }
                // Every handle dropped: replaced by a newer connection.
                None => return Ok(()),
            },
        }
    }
}
