//! Tick signaling core.
//!
//! # Architecture
//!
//! ```text
//! any context            TickSignals                 tick context (1 kHz)
//! ───────────            ───────────                 ────────────────────
//! request_start() ─────▶ start flag ──┐
//! request_stop()  ─────▶ stop flag  ──┼──────────▶ TickHandler::on_tick()
//! set_flashing()  ─────▶ flashing   ──┘              ├─ transducer square wave
//!                                                    └─ status LED every N ticks
//! ```
//!
//! Requests are sticky booleans consumed by the tick. Only the tick writes
//! the playback counter, so there is never a multi-step update racing with
//! another context. A burst of requests before the next tick collapses to
//! one.
//!
//! Nothing in this module blocks, allocates, locks or logs on the tick path.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::hal::OutputLine;

/// Default playback length in ticks (one second at 1 kHz).
pub const DEFAULT_PLAYBACK_TICKS: u32 = 1000;

/// Default number of fast ticks per status tick (125 ms at 1 kHz).
pub const DEFAULT_STATUS_DIVIDER: u32 = 125;

/// Transducer playback driven from the tick.
///
/// The output toggles on every tick, giving a square wave with a half period
/// of one tick for `duration` ticks.
pub struct AudioPlayback {
    /// Pending start request.
    start: AtomicBool,
    /// Pending stop request.
    stop: AtomicBool,
    /// Ticks left to play; 0 means idle. Written only by `on_tick`.
    count: AtomicU32,
    /// Ticks played per start.
    duration: u32,
}

impl AudioPlayback {
    pub const fn new(duration: u32) -> Self {
        Self {
            start: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            count: AtomicU32::new(0),
            duration,
        }
    }

    /// Ask the tick to start playback. Ignored if already playing.
    #[inline]
    pub fn request_start(&self) {
        self.start.store(true, Ordering::Release);
    }

    /// Ask the tick to stop playback. Wins over a pending start.
    #[inline]
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Advance playback by one tick.
    ///
    /// Returns the level to drive the transducer to, or `None` when idle
    /// (the output was already driven low by the last playing tick).
    ///
    /// # Timing
    ///
    /// O(1): two swaps, one load, one store.
    #[inline]
    pub fn on_tick(&self) -> Option<bool> {
        let stop = self.stop.swap(false, Ordering::AcqRel);
        let start = self.start.swap(false, Ordering::AcqRel);
        let mut count = self.count.load(Ordering::Relaxed);

        // 1 turns the output off on this tick and then idles.
        if stop {
            count = 1;
        }

        // Starting never restarts a pattern in progress.
        if start && count == 0 {
            count = self.duration;
        }

        if count == 0 {
            return None;
        }

        count -= 1;
        self.count.store(count, Ordering::Release);
        Some(count & 1 == 1)
    }

    /// Ticks left in the current pattern.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.remaining() > 0
    }

    /// Ticks played per start.
    pub fn duration(&self) -> u32 {
        self.duration
    }
}

impl Default for AudioPlayback {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYBACK_TICKS)
    }
}

/// Status LED pattern driven from the status tick.
pub struct StatusIndicator {
    /// Flash (connecting) or hold solid (connected).
    flashing: AtomicBool,
    /// Current LED phase. Written only by `on_status_tick`.
    phase: AtomicBool,
}

impl StatusIndicator {
    /// Starts flashing, matching the initial disconnected state.
    pub const fn new() -> Self {
        Self {
            flashing: AtomicBool::new(true),
            phase: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn set_flashing(&self, flashing: bool) {
        self.flashing.store(flashing, Ordering::Release);
    }

    #[inline]
    pub fn is_flashing(&self) -> bool {
        self.flashing.load(Ordering::Acquire)
    }

    /// Advance the pattern; returns the level to drive the LED to.
    #[inline]
    pub fn on_status_tick(&self) -> bool {
        let phase = if self.is_flashing() {
            !self.phase.load(Ordering::Relaxed)
        } else {
            true
        };
        self.phase.store(phase, Ordering::Relaxed);
        phase
    }
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

/// Signals shared between the tick context and everyone else.
#[derive(Default)]
pub struct TickSignals {
    pub playback: AudioPlayback,
    pub status: StatusIndicator,
}

impl TickSignals {
    pub const fn new(playback_ticks: u32) -> Self {
        Self {
            playback: AudioPlayback::new(playback_ticks),
            status: StatusIndicator::new(),
        }
    }
}

/// The handler run on every fast tick.
///
/// Owns the two outputs driven from the tick context: the transducer and
/// the status LED. Runs the status tick itself so the ratio between the
/// two cannot drift.
pub struct TickHandler<A, S> {
    signals: Arc<TickSignals>,
    transducer: A,
    status_led: S,
    divider: u32,
    divide_count: u32,
}

impl<A: OutputLine, S: OutputLine> TickHandler<A, S> {
    /// # Arguments
    ///
    /// * `divider` - Fast ticks per status tick (clamped to at least 1)
    pub fn new(signals: Arc<TickSignals>, transducer: A, status_led: S, divider: u32) -> Self {
        Self {
            signals,
            transducer,
            status_led,
            divider: divider.max(1),
            divide_count: 0,
        }
    }

    /// Run one fast tick. Returns `true` if the status tick ran too.
    ///
    /// # Timing
    ///
    /// Worst case: two playback swaps, one counter store, two pin writes
    /// and one status update. No loops, no allocation, no locks.
    #[inline]
    pub fn on_tick(&mut self) -> bool {
        if let Some(level) = self.signals.playback.on_tick() {
            self.transducer.set_level(level);
        }

        self.divide_count += 1;
        if self.divide_count < self.divider {
            return false;
        }

        self.divide_count = 0;
        let level = self.signals.status.on_status_tick();
        self.status_led.set_level(level);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::LevelCell;

    #[test]
    fn test_idle_playback_drives_nothing() {
        let playback = AudioPlayback::new(10);
        for _ in 0..5 {
            assert_eq!(playback.on_tick(), None);
        }
        assert!(!playback.is_playing());
    }

    #[test]
    fn test_square_wave_follows_counter() {
        let duration = 10;
        let playback = AudioPlayback::new(duration);
        playback.request_start();

        for _ in 0..duration {
            let level = playback.on_tick().expect("playing");
            let counter = playback.remaining();
            assert_eq!(level, (duration - counter) % 2 == 1);
        }

        assert_eq!(playback.remaining(), 0);
        assert_eq!(playback.on_tick(), None);
    }

    #[test]
    fn test_last_playing_tick_is_low() {
        let playback = AudioPlayback::new(4);
        playback.request_start();
        let levels: Vec<_> = (0..4).map(|_| playback.on_tick().unwrap()).collect();
        assert_eq!(levels, vec![true, false, true, false]);
    }

    #[test]
    fn test_start_while_playing_does_not_restart() {
        let playback = AudioPlayback::new(100);
        playback.request_start();
        for _ in 0..30 {
            playback.on_tick();
        }
        assert_eq!(playback.remaining(), 70);

        playback.request_start();
        playback.on_tick();
        assert_eq!(playback.remaining(), 69);

        // The request was consumed, not left pending.
        for _ in 0..69 {
            playback.on_tick();
        }
        assert_eq!(playback.on_tick(), None);
    }

    #[test]
    fn test_stop_forces_output_low_on_next_tick() {
        let playback = AudioPlayback::new(100);
        playback.request_start();
        for _ in 0..11 {
            playback.on_tick();
        }
        assert!(playback.remaining() > 1);

        playback.request_stop();
        assert_eq!(playback.on_tick(), Some(false));
        assert_eq!(playback.remaining(), 0);
        assert_eq!(playback.on_tick(), None);
    }

    #[test]
    fn test_stop_wins_over_pending_start() {
        let playback = AudioPlayback::new(100);
        playback.request_start();
        playback.request_stop();

        assert_eq!(playback.on_tick(), Some(false));
        assert_eq!(playback.on_tick(), None);
    }

    #[test]
    fn test_repeated_requests_collapse() {
        let playback = AudioPlayback::new(6);
        for _ in 0..5 {
            playback.request_start();
        }
        for _ in 0..6 {
            assert!(playback.on_tick().is_some());
        }
        assert_eq!(playback.on_tick(), None);
    }

    #[test]
    fn test_status_flashing_toggles_every_status_tick() {
        let status = StatusIndicator::new();
        let levels: Vec<_> = (0..4).map(|_| status.on_status_tick()).collect();
        assert_eq!(levels, vec![true, false, true, false]);
    }

    #[test]
    fn test_status_solid_holds_on() {
        let status = StatusIndicator::new();
        status.set_flashing(false);
        for _ in 0..4 {
            assert!(status.on_status_tick());
        }
    }

    #[test]
    fn test_status_tick_fires_once_per_divider() {
        let signals = Arc::new(TickSignals::new(DEFAULT_PLAYBACK_TICKS));
        let status_led = LevelCell::new(false);
        let mut handler = TickHandler::new(
            signals,
            LevelCell::new(false),
            status_led.clone(),
            DEFAULT_STATUS_DIVIDER,
        );

        for round in 0..3 {
            let fired = (0..DEFAULT_STATUS_DIVIDER)
                .filter(|_| handler.on_tick())
                .count();
            assert_eq!(fired, 1, "round {}", round);
        }
    }

    #[test]
    fn test_handler_drives_outputs() {
        let signals = Arc::new(TickSignals::new(4));
        let transducer = LevelCell::new(false);
        let status_led = LevelCell::new(false);
        let mut handler =
            TickHandler::new(signals.clone(), transducer.clone(), status_led.clone(), 2);

        signals.playback.request_start();
        handler.on_tick();
        assert!(transducer.get());
        assert!(!status_led.get());

        handler.on_tick();
        assert!(!transducer.get());
        assert!(status_led.get());

        signals.status.set_flashing(false);
        for _ in 0..6 {
            handler.on_tick();
            assert!(!transducer.get() || signals.playback.is_playing());
        }
        assert!(status_led.get());
    }
}
