//! Byte codec for the buzzer protocol.
//!
//! The device only ever needs [`decode_host_byte`]; the host side uses
//! [`decode_device_byte`] to classify what a buzzer sends.

use crate::messages::{opcode, DeviceMessage, HostCommand, Mode, ModuleId};
use thiserror::Error;

/// Errors that can occur while decoding a wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The device received a byte that is not a host command.
    #[error("Unrecognised host byte 0x{0:02X}")]
    Unrecognised(u8),

    /// The host received a byte that is not a device message.
    #[error("Unknown device byte 0x{0:02X}")]
    UnknownDeviceByte(u8),

    /// A module id does not fit in the seven id bits.
    #[error("Module id {0} out of range (max {})", ModuleId::MAX)]
    ModuleIdOutOfRange(u8),
}

impl TryFrom<u8> for ModuleId {
    type Error = CodecError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        ModuleId::new(raw).ok_or(CodecError::ModuleIdOutOfRange(raw))
    }
}

/// Decode a byte received by the device.
pub fn decode_host_byte(byte: u8) -> Result<HostCommand, CodecError> {
    if is_mode_byte(byte) {
        Ok(HostCommand::Mode(Mode::from_bits(byte)))
    } else {
        Err(CodecError::Unrecognised(byte))
    }
}

/// Decode a byte received by the host.
pub fn decode_device_byte(byte: u8) -> Result<DeviceMessage, CodecError> {
    match byte {
        b if b < opcode::MODE_PREFIX => Ok(DeviceMessage::Version(b)),
        b if b & opcode::ID_PREFIX == opcode::ID_PREFIX => {
            Ok(DeviceMessage::Id(ModuleId::masked(b)))
        }
        opcode::PRESS => Ok(DeviceMessage::Press),
        opcode::HEARTBEAT => Ok(DeviceMessage::Heartbeat),
        opcode::ERR_BAD_MSG => Ok(DeviceMessage::BadMessage),
        b => Err(CodecError::UnknownDeviceByte(b)),
    }
}

/// Check if a byte is a mode command without decoding it.
pub fn is_mode_byte(byte: u8) -> bool {
    byte & opcode::MODE_MASK == opcode::MODE_PREFIX
}
