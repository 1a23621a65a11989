//! # buzzer-protocol
//!
//! Single-byte protocol spoken between a buzzer and its host.
//!
//! This crate defines the opcodes, message types and the byte codec.
//! It has no I/O and is shared by the device core and the host tools.

pub mod codec;
pub mod messages;

pub use codec::{decode_device_byte, decode_host_byte, is_mode_byte, CodecError};
pub use messages::*;
