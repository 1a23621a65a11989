//! Device connectivity state machine.
//!
//! The state is an explicit enum with a single transition function, so a
//! combination like "active but disconnected" cannot be represented.
//! [`StateCell`] publishes the current state to other contexts as a single
//! atomic byte.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use buzzer_protocol::Mode;
use thiserror::Error;

/// Connectivity with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    /// Not talking to the host. Initial state and the state between sessions.
    #[default]
    Disconnected,
    /// Session open, no mode command received yet.
    ConnectedIdle,
    /// Session open and the host has set the outputs.
    Active(Mode),
}

impl ConnectivityState {
    /// Whether button presses are forwarded to the host.
    pub fn reports_presses(self) -> bool {
        !matches!(self, ConnectivityState::Disconnected)
    }

    /// Outputs requested by the host, if any.
    pub fn mode(self) -> Option<Mode> {
        match self {
            ConnectivityState::Active(mode) => Some(mode),
            _ => None,
        }
    }

    /// Apply an event, returning the next state.
    pub fn next(self, event: DeviceEvent) -> Result<Self, TransitionError> {
        use ConnectivityState::*;

        match (self, event) {
            (_, DeviceEvent::Connecting) => Ok(Disconnected),
            (Disconnected, DeviceEvent::Connected) => Ok(ConnectedIdle),
            (ConnectedIdle | Active(_), DeviceEvent::Mode(mode)) => Ok(Active(mode)),
            (from, event) => Err(TransitionError::Rejected { from, event }),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            ConnectivityState::Disconnected => 0,
            ConnectivityState::ConnectedIdle => 1,
            ConnectivityState::Active(mode) => 2 | (mode.bits() << 2),
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            1 => ConnectivityState::ConnectedIdle,
            2 => ConnectivityState::Active(Mode::from_bits(bits >> 2)),
            _ => ConnectivityState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectivityState::ConnectedIdle => write!(f, "CONNECTED_IDLE"),
            ConnectivityState::Active(mode) => {
                write!(f, "ACTIVE(led={}, audio={})", mode.led, mode.audio)
            }
        }
    }
}

/// Events that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A connection attempt is starting.
    Connecting,
    /// A host session was opened.
    Connected,
    /// The host sent a mode command.
    Mode(Mode),
}

/// A transition that the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Event {event:?} not allowed in state {from}")]
    Rejected {
        from: ConnectivityState,
        event: DeviceEvent,
    },
}

/// Lock-free holder for the current state.
///
/// Written only by the orchestration context, read by the button poll.
pub struct StateCell(AtomicU8);

impl StateCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    #[inline]
    pub fn load(&self) -> ConnectivityState {
        ConnectivityState::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: ConnectivityState) {
        self.0.store(state.to_bits(), Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
