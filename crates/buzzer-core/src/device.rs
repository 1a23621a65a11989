//! Device state machine driver.
//!
//! [`DeviceController`] runs in the orchestration context and is the only
//! place transitions happen. [`ButtonMonitor`] runs in the button poll
//! context and only reads the published state.

use std::sync::Arc;

use buzzer_protocol::Mode;
use tracing::{debug, info, warn};

use crate::hal::OutputLine;
use crate::state::{ConnectivityState, DeviceEvent, StateCell, TransitionError};
use crate::tick::TickSignals;

/// Shared state, built once at startup and handed to every context.
pub struct DeviceSignals {
    /// Signals consumed by the tick context.
    pub tick: Arc<TickSignals>,
    /// Published connectivity state.
    pub state: StateCell,
}

impl DeviceSignals {
    pub fn new(playback_ticks: u32) -> Self {
        Self {
            tick: Arc::new(TickSignals::new(playback_ticks)),
            state: StateCell::new(),
        }
    }
}

/// Receives mode commands decoded from the host.
pub trait ModeSink {
    fn apply_mode(&mut self, mode: Mode);
}

/// Receives button press events.
pub trait PressSink: Send + Sync {
    /// Forward a press. Returns `false` if it was dropped.
    fn press(&self) -> bool;
}

impl<P: PressSink + ?Sized> PressSink for Arc<P> {
    fn press(&self) -> bool {
        (**self).press()
    }
}

/// Owns the state machine and the button LED.
pub struct DeviceController<L> {
    signals: Arc<DeviceSignals>,
    button_led: L,
    state: ConnectivityState,
}

impl<L: OutputLine> DeviceController<L> {
    pub fn new(signals: Arc<DeviceSignals>, button_led: L) -> Self {
        signals.state.store(ConnectivityState::Disconnected);
        Self {
            signals,
            button_led,
            state: ConnectivityState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Indicate a connection attempt: flash the status LED, outputs off.
    pub fn enter_connecting(&mut self) {
        // Always allowed.
        let _ = self.transition(DeviceEvent::Connecting);
    }

    /// Indicate an open session: status LED solid, outputs off.
    pub fn enter_connected(&mut self) -> Result<(), TransitionError> {
        self.transition(DeviceEvent::Connected)
    }

    /// Set the outputs requested by the host.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), TransitionError> {
        self.transition(DeviceEvent::Mode(mode))
    }

    fn transition(&mut self, event: DeviceEvent) -> Result<(), TransitionError> {
        let next = self.state.next(event).map_err(|e| {
            warn!("{}", e);
            e
        })?;

        let tick = &self.signals.tick;
        match event {
            DeviceEvent::Connecting => {
                tick.status.set_flashing(true);
                self.button_led.set_level(false);
                tick.playback.request_stop();
            }
            DeviceEvent::Connected => {
                tick.status.set_flashing(false);
                self.button_led.set_level(false);
                tick.playback.request_stop();
            }
            DeviceEvent::Mode(mode) => {
                self.button_led.set_level(mode.led);
                if mode.audio {
                    tick.playback.request_start();
                } else {
                    tick.playback.request_stop();
                }
                tick.status.set_flashing(false);
            }
        }

        if next != self.state {
            info!("State {} -> {}", self.state, next);
        }
        self.state = next;
        self.signals.state.store(next);
        Ok(())
    }
}

impl<L: OutputLine> ModeSink for DeviceController<L> {
    fn apply_mode(&mut self, mode: Mode) {
        // Rejection is already logged by the transition.
        let _ = self.set_mode(mode);
    }
}

/// Button edge detection, run from the poll context.
pub struct ButtonMonitor<P, D> {
    signals: Arc<DeviceSignals>,
    sink: P,
    debug_led: D,
    was_pressed: bool,
}

impl<P: PressSink, D: OutputLine> ButtonMonitor<P, D> {
    pub fn new(signals: Arc<DeviceSignals>, sink: P, debug_led: D) -> Self {
        Self {
            signals,
            sink,
            debug_led,
            was_pressed: false,
        }
    }

    /// Process one sample of the button.
    ///
    /// Returns `true` if a press was forwarded to the sink.
    pub fn on_sample(&mut self, pressed: bool) -> bool {
        let new_press = pressed && !self.was_pressed;
        self.was_pressed = pressed;

        // Mirror the raw button on the board LED.
        self.debug_led.set_level(pressed);

        if !new_press || !self.signals.state.load().reports_presses() {
            return false;
        }

        let sent = self.sink.press();
        if !sent {
            debug!("Button press dropped, no live session");
        }
        sent
    }
}
