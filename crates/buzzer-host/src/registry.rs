//! Connected buzzers, keyed by module id.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use buzzer_protocol::{HostCommand, Mode, ModuleId};
use tokio::sync::{mpsc, RwLock};

use crate::server::HostError;

/// Handle for sending commands to one connected buzzer.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    id: ModuleId,
    addr: SocketAddr,
    version: u8,
    /// Connection serial, so a stale connection cannot remove its successor.
    conn: u64,
    tx: mpsc::Sender<u8>,
}

impl DeviceHandle {
    pub(crate) fn new(
        id: ModuleId,
        addr: SocketAddr,
        version: u8,
        conn: u64,
        tx: mpsc::Sender<u8>,
    ) -> Self {
        Self {
            id,
            addr,
            version,
            conn,
            tx,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Protocol version announced in the handshake.
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a mode command for the buzzer.
    pub async fn set_mode(&self, mode: Mode) -> Result<(), HostError> {
        self.tx
            .send(HostCommand::Mode(mode).encode())
            .await
            .map_err(|_| HostError::NotConnected(self.id))
    }
}

/// Shared map of connected buzzers.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<ModuleId, DeviceHandle>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: ModuleId) -> Option<DeviceHandle> {
        self.devices.read().await.get(&id).cloned()
    }

    /// Ids of all connected buzzers, in order.
    pub async fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<_> = self.devices.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    pub async fn set_mode(&self, id: ModuleId, mode: Mode) -> Result<(), HostError> {
        let handle = self.get(id).await.ok_or(HostError::NotConnected(id))?;
        handle.set_mode(mode).await
    }

    /// Send `mode` to every buzzer. Returns how many accepted it.
    pub async fn set_mode_all(&self, mode: Mode) -> usize {
        let handles: Vec<_> = self.devices.read().await.values().cloned().collect();
        let mut sent = 0;
        for handle in handles {
            if handle.set_mode(mode).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Register a buzzer, returning the connection it replaced.
    pub(crate) async fn insert(&self, handle: DeviceHandle) -> Option<DeviceHandle> {
        self.devices.write().await.insert(handle.id, handle)
    }

    /// Remove a buzzer if it is still registered by connection `conn`.
    pub(crate) async fn remove(&self, id: ModuleId, conn: u64) -> bool {
        let mut devices = self.devices.write().await;
        if devices.get(&id).is_some_and(|h| h.conn == conn) {
            devices.remove(&id);
            true
        } else {
            false
        }
    }
}
