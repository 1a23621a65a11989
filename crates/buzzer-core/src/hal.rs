//! Hardware seams.
//!
//! The core never touches pins directly. Each platform supplies
//! implementations of these traits:
//! - ESP32: `PinDriver` adapters in `buzzer-esp32`
//! - Linux: [`LevelCell`] lines observed by the simulator
//!
//! Every line is owned by exactly one execution context, so the traits take
//! `&mut self` / `&self` without any synchronisation of their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use buzzer_protocol::ModuleId;

/// A digital output driven by the core.
pub trait OutputLine: Send {
    /// Drive the line high (`true`) or low (`false`).
    fn set_level(&mut self, high: bool);
}

/// A digital input sampled by the core.
pub trait InputLine: Send {
    /// Raw electrical level, `true` when high.
    fn is_high(&self) -> bool;
}

impl<T: OutputLine + ?Sized> OutputLine for Box<T> {
    fn set_level(&mut self, high: bool) {
        (**self).set_level(high)
    }
}

impl<T: InputLine + ?Sized> InputLine for Box<T> {
    fn is_high(&self) -> bool {
        (**self).is_high()
    }
}

/// Read the module id from the id pins, most significant pin first.
///
/// The pins are pulled up, so an unconnected pin reads as `1`.
pub fn read_module_id<P: InputLine>(pins: &[P]) -> ModuleId {
    ModuleId::from_levels(pins.iter().map(InputLine::is_high))
}

/// Where the module id comes from, read once per session.
pub trait IdSource {
    fn read_id(&self) -> ModuleId;
}

/// Id pins, most significant first.
impl<P: InputLine> IdSource for Vec<P> {
    fn read_id(&self) -> ModuleId {
        read_module_id(self)
    }
}

/// A fixed id, for boards without id pins and for the simulator.
impl IdSource for ModuleId {
    fn read_id(&self) -> ModuleId {
        *self
    }
}

/// Button sampled as active-low: pressed when the line reads low.
pub fn button_pressed<P: InputLine + ?Sized>(pin: &P) -> bool {
    !pin.is_high()
}

/// A line backed by a shared atomic level.
///
/// Clones observe the same level, which lets a simulator or a test hold one
/// end while the core drives (or samples) the other.
#[derive(Debug, Clone, Default)]
pub struct LevelCell(Arc<AtomicBool>);

impl LevelCell {
    pub fn new(high: bool) -> Self {
        Self(Arc::new(AtomicBool::new(high)))
    }

    /// Current level.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Force the level (used to simulate an input).
    pub fn set(&self, high: bool) {
        self.0.store(high, Ordering::Release);
    }
}

impl OutputLine for LevelCell {
    fn set_level(&mut self, high: bool) {
        self.set(high);
    }
}

impl InputLine for LevelCell {
    fn is_high(&self) -> bool {
        self.get()
    }
}
