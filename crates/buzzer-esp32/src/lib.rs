//! ESP32-specific components for the buzzer.
//!
//! This crate adapts the ESP32 peripherals to the seams of `buzzer-core`:
//! - WiFi association with event-driven retries
//! - GPIO pin drivers for the board's buttons, LEDs and id pins
//! - The 1 kHz hardware timer running the tick handler
//!
//! # Example
//!
//! ```ignore
//! use buzzer_esp32::{gpio::BoardPins, timer::start_tick, wifi::EspAssociation};
//!
//! let pins = BoardPins::take(peripherals.pins)?;
//! let wifi = EspAssociation::new(peripherals.modem, sysloop, Some(nvs), "ssid", "pass")?;
//! let _timer = start_tick(peripherals.timer00, 1000, handler)?;
//! ```

pub mod gpio;
pub mod timer;
pub mod wifi;
