//! Protocol message types for the buzzer link.
//!
//! Every message is a single byte:
//! - Device → Host: Version, Id, Press, Heartbeat, BadMessage
//! - Host → Device: Mode
//!
//! There is no framing; a TCP stream carries one message per byte.

/// Protocol version announced at the start of every session.
pub const PROTOCOL_VERSION: u8 = 0x04;

/// Opcode values on the wire.
pub mod opcode {
    /// Version announce (device → host).
    pub const VERSION: u8 = super::PROTOCOL_VERSION;
    /// Mode command prefix (host → device).
    pub const MODE_PREFIX: u8 = 0x20;
    /// Bits that must match [`MODE_PREFIX`] for a byte to be a mode command.
    pub const MODE_MASK: u8 = 0xFC;
    /// Mode bit: button LED on.
    pub const MODE_LED: u8 = 0x01;
    /// Mode bit: audio on.
    pub const MODE_AUDIO: u8 = 0x02;
    /// Button press event (device → host).
    pub const PRESS: u8 = 0x30;
    /// Liveness beacon (device → host).
    pub const HEARTBEAT: u8 = 0x31;
    /// Reply to an unrecognised byte (device → host).
    pub const ERR_BAD_MSG: u8 = 0x7F;
    /// Id announce prefix (device → host).
    pub const ID_PREFIX: u8 = 0x80;
    /// Bits of an id announce carrying the module id.
    pub const ID_MASK: u8 = 0x7F;
}

/// Module identity, wired on the board's id pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u8);

impl ModuleId {
    /// Largest id that fits in an id announce.
    pub const MAX: u8 = opcode::ID_MASK;

    /// Create an id, returning `None` if it does not fit in the id announce.
    pub const fn new(raw: u8) -> Option<Self> {
        if raw > Self::MAX {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Create an id from the low seven bits of `raw`.
    pub const fn masked(raw: u8) -> Self {
        Self(raw & Self::MAX)
    }

    /// Build an id from pin levels, most significant pin first.
    ///
    /// Only the last seven levels count; earlier ones are shifted past the
    /// top bit and dropped.
    pub fn from_levels<I>(levels: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let raw = levels
            .into_iter()
            .fold(0u8, |id, high| (id << 1) | u8::from(high));
        Self::masked(raw)
    }

    /// Raw id value.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Team index (bits 4-6) used by the host to group buzzers.
    pub const fn team(self) -> u8 {
        (self.0 >> 4) & 0x07
    }

    /// Position within the team (bits 0-3).
    pub const fn seat(self) -> u8 {
        self.0 & 0x0F
    }
}

impl core::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        const TEAM_LETTERS: [&str; 8] = ["B", "G", "R", "Y", "x", "x", "x", "x"];
        write!(f, "{}{}", TEAM_LETTERS[self.team() as usize], self.seat())
    }
}

/// Output activation requested by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Mode {
    /// Button illumination LED.
    pub led: bool,
    /// Audio transducer pattern.
    pub audio: bool,
}

impl Mode {
    /// Both outputs off.
    pub const OFF: Mode = Mode {
        led: false,
        audio: false,
    };

    pub const fn new(led: bool, audio: bool) -> Self {
        Self { led, audio }
    }

    /// Decode the low mode bits (prefix already checked).
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            led: bits & opcode::MODE_LED != 0,
            audio: bits & opcode::MODE_AUDIO != 0,
        }
    }

    /// Low mode bits, without the prefix.
    pub const fn bits(self) -> u8 {
        let mut bits = 0;
        if self.led {
            bits |= opcode::MODE_LED;
        }
        if self.audio {
            bits |= opcode::MODE_AUDIO;
        }
        bits
    }
}

/// Messages sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Protocol version announce, first byte of every session.
    Version(u8),
    /// Module id announce, second byte of every session.
    Id(ModuleId),
    /// The button was pressed.
    Press,
    /// Liveness beacon.
    Heartbeat,
    /// The device received a byte it did not understand.
    BadMessage,
}

impl DeviceMessage {
    /// Wire byte for this message.
    pub const fn encode(self) -> u8 {
        match self {
            DeviceMessage::Version(version) => version,
            DeviceMessage::Id(id) => opcode::ID_PREFIX | id.get(),
            DeviceMessage::Press => opcode::PRESS,
            DeviceMessage::Heartbeat => opcode::HEARTBEAT,
            DeviceMessage::BadMessage => opcode::ERR_BAD_MSG,
        }
    }
}

/// Commands sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Set which outputs are active.
    Mode(Mode),
}

impl HostCommand {
    /// Wire byte for this command.
    pub const fn encode(self) -> u8 {
        match self {
            HostCommand::Mode(mode) => opcode::MODE_PREFIX | mode.bits(),
        }
    }
}
