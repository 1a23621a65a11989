//! Host protocol client.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────────────────────┐
//! poll thread ───────▶│ send_press()                 │
//! heartbeat thread ──▶│ send_heartbeat()             │──▶ Session ──▶ host
//! orchestrator ──────▶│ open_session / receive_loop  │◀──
//!                     └──────────────────────────────┘
//! ```
//!
//! The current session sits in a slot behind a `Mutex`. The lock is only
//! held to clone or swap the `Arc`, never across I/O. Each session carries
//! its own alive flag: the first failed send or read clears it and shuts the
//! stream, after which every send fails without touching the socket.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use buzzer_protocol::{
    decode_host_byte, DeviceMessage, HostCommand, ModuleId, PROTOCOL_VERSION,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{ModeSink, PressSink};
use crate::tasks::Shutdown;
use crate::transport::Transport;

/// Errors from the session send path.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No session open")]
    NoSession,

    #[error("Session closed")]
    Closed,

    #[error("Send failed: {0}")]
    Io(#[from] io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(#[source] io::Error),
}

/// Why a receive loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The host closed the stream.
    PeerClosed,
    /// A read failed.
    Io(io::ErrorKind),
    /// The session was torn down locally, by a failed send or `close`.
    Closed,
    /// There was no session to read from.
    NoSession,
}

struct Session<T> {
    link: T,
    alive: AtomicBool,
}

impl<T: Transport> Session<T> {
    fn new(link: T) -> Self {
        Self {
            link,
            alive: AtomicBool::new(true),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn send(&self, byte: u8) -> Result<(), SessionError> {
        if !self.is_alive() {
            return Err(SessionError::Closed);
        }
        self.link.send_byte(byte).map_err(|e| {
            self.kill();
            SessionError::Io(e)
        })
    }

    /// Mark dead and shut the stream. Only the first call closes.
    fn kill(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            self.link.close();
        }
    }
}

/// Client side of the host protocol.
pub struct HostClient<T> {
    slot: Mutex<Option<Arc<Session<T>>>>,
}

impl<T: Transport> HostClient<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<Arc<Session<T>>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Empty the slot if it still holds `session`.
    fn clear(&self, session: &Arc<Session<T>>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)) {
            *slot = None;
        }
    }

    /// Start a session on `link` by announcing the version and module id.
    ///
    /// On failure the stream is closed and no session is published.
    pub fn open_session(&self, link: T, id: ModuleId) -> Result<(), SessionError> {
        let session = Arc::new(Session::new(link));

        for message in [DeviceMessage::Version(PROTOCOL_VERSION), DeviceMessage::Id(id)] {
            session.send(message.encode()).map_err(|e| {
                session.kill();
                match e {
                    SessionError::Io(e) => SessionError::Handshake(e),
                    other => other,
                }
            })?;
        }

        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session);
        if let Some(previous) = previous {
            previous.kill();
        }

        info!("Session open as module {} ({})", id.get(), id);
        Ok(())
    }

    /// Send one message on the current session.
    pub fn send(&self, message: DeviceMessage) -> Result<(), SessionError> {
        let session = self.current().ok_or(SessionError::NoSession)?;
        let result = session.send(message.encode());
        if result.is_err() {
            self.clear(&session);
        }
        result
    }

    /// Best-effort press report. Returns `false` if it was dropped.
    pub fn send_press(&self) -> bool {
        match self.send(DeviceMessage::Press) {
            Ok(()) => {
                info!("Button press sent");
                true
            }
            Err(e) => {
                debug!("Press not sent: {}", e);
                false
            }
        }
    }

    /// Best-effort liveness beacon.
    pub fn send_heartbeat(&self) -> bool {
        match self.send(DeviceMessage::Heartbeat) {
            Ok(()) => true,
            Err(e) => {
                debug!("Heartbeat not sent: {}", e);
                false
            }
        }
    }

    /// Send a heartbeat every `period` until shutdown.
    pub fn run_heartbeat(&self, period: Duration, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            self.send_heartbeat();
            if !shutdown.sleep(period) {
                break;
            }
        }
    }

    /// Read host commands until the session ends.
    ///
    /// Mode commands go to `sink`. Anything else gets an error reply and
    /// the session carries on.
    pub fn receive_loop<S: ModeSink>(&self, sink: &mut S) -> SessionEnd {
        let Some(session) = self.current() else {
            return SessionEnd::NoSession;
        };

        let end = loop {
            let received = session.link.recv_byte();
            if !session.is_alive() {
                break SessionEnd::Closed;
            }

            let byte = match received {
                Ok(Some(byte)) => byte,
                Ok(None) => break SessionEnd::PeerClosed,
                Err(e) => break SessionEnd::Io(e.kind()),
            };

            match decode_host_byte(byte) {
                Ok(HostCommand::Mode(mode)) => {
                    debug!("Mode led={} audio={}", mode.led, mode.audio);
                    sink.apply_mode(mode);
                }
                Err(e) => {
                    warn!("{}, replying with error", e);
                    if session.send(DeviceMessage::BadMessage.encode()).is_err() {
                        break SessionEnd::Closed;
                    }
                }
            }
        };

        session.kill();
        self.clear(&session);
        info!("Session ended: {:?}", end);
        end
    }

    /// Whether a live session is open.
    pub fn is_connected(&self) -> bool {
        self.current().is_some_and(|s| s.is_alive())
    }

    /// Tear down the current session, waking a blocked receive loop.
    pub fn close(&self) {
        let session = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.kill();
        }
    }
}

impl<T: Transport> Default for HostClient<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> PressSink for HostClient<T> {
    fn press(&self) -> bool {
        self.send_press()
    }
}
