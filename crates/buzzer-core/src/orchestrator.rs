//! Orchestration loop.
//!
//! Sequences one connection cycle at a time:
//!
//! ```text
//! enter_connecting ─▶ network.connect ─▶ host connect + handshake
//!                          │ fail              │ fail
//!                          ▼                   ▼
//!                    NetworkFailed      HostUnreachable     (back off)
//!
//! enter_connected ─▶ receive_loop ─▶ SessionEnded           (retry now)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::{HostClient, SessionEnd};
use crate::device::DeviceController;
use crate::hal::{IdSource, OutputLine};
use crate::network::{Association, ConnectionManager};
use crate::tasks::Shutdown;
use crate::transport::Connector;

/// Default wait after a cycle that never reached a session.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// How a single connection cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The network could not be brought up.
    NetworkFailed,
    /// The host refused the connection or the handshake failed.
    HostUnreachable,
    /// A session was established and later ended.
    SessionEnded(SessionEnd),
}

impl CycleOutcome {
    /// Delay before the next cycle, if any.
    pub fn backoff(self, delay: Duration) -> Option<Duration> {
        match self {
            CycleOutcome::NetworkFailed | CycleOutcome::HostUnreachable => Some(delay),
            CycleOutcome::SessionEnded(_) => None,
        }
    }
}

/// Drives the device through connect, session and reconnect.
pub struct Orchestrator<A, C: Connector, L, I> {
    network: ConnectionManager<A>,
    connector: C,
    client: Arc<HostClient<C::Transport>>,
    device: DeviceController<L>,
    id_source: I,
    reconnect_delay: Duration,
}

impl<A, C, L, I> Orchestrator<A, C, L, I>
where
    A: Association,
    C: Connector,
    L: OutputLine,
    I: IdSource,
{
    pub fn new(
        network: ConnectionManager<A>,
        connector: C,
        client: Arc<HostClient<C::Transport>>,
        device: DeviceController<L>,
        id_source: I,
    ) -> Self {
        Self {
            network,
            connector,
            client,
            device,
            id_source,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn device(&self) -> &DeviceController<L> {
        &self.device
    }

    pub fn client(&self) -> &Arc<HostClient<C::Transport>> {
        &self.client
    }

    pub fn network(&self) -> &ConnectionManager<A> {
        &self.network
    }

    /// Run one connection cycle to completion.
    pub fn run_once(&mut self) -> CycleOutcome {
        self.cycle(None)
    }

    fn cycle(&mut self, shutdown: Option<&Shutdown>) -> CycleOutcome {
        self.device.enter_connecting();

        if let Err(e) = self.network.connect() {
            warn!("Network unavailable: {}", e);
            return CycleOutcome::NetworkFailed;
        }

        let link = match self.connector.connect() {
            Ok(link) => link,
            Err(e) => {
                warn!("Host unreachable: {}", e);
                return CycleOutcome::HostUnreachable;
            }
        };

        let id = self.id_source.read_id();
        if let Err(e) = self.client.open_session(link, id) {
            warn!("{}", e);
            return CycleOutcome::HostUnreachable;
        }

        // A close racing the handshake found no session to wake.
        if shutdown.is_some_and(Shutdown::is_triggered) {
            self.client.close();
            return CycleOutcome::SessionEnded(SessionEnd::Closed);
        }

        if self.device.enter_connected().is_err() {
            // Unreachable after enter_connecting; drop the session regardless.
            self.client.close();
            return CycleOutcome::SessionEnded(SessionEnd::NoSession);
        }

        CycleOutcome::SessionEnded(self.client.receive_loop(&mut self.device))
    }

    /// Run cycles until `shutdown` is triggered.
    pub fn run(&mut self, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            let outcome = self.cycle(Some(shutdown));
            if let Some(delay) = outcome.backoff(self.reconnect_delay) {
                info!("Retrying in {:?}", delay);
                if !shutdown.sleep(delay) {
                    break;
                }
            }
        }

        self.client.close();
        self.device.enter_connecting();
        info!("Orchestrator stopped");
    }
}
