//! Control-word codec and the per-word [`Command`] handed to device handlers.
//!
//! A control word is a 64-bit value laid out as:
//!
//! ```text
//! 63      56 55      48 47                                   0
//! +---------+----------+--------------------------------------+
//! | device  | command  |               payload                |
//! +---------+----------+--------------------------------------+
//! ```
//!
//! Every 64-bit value is a valid encoding. Responses keep the device and
//! command fields of the request and replace only the payload.

use std::fmt;

/// Bit position of the device-id field.
pub const DEVICE_SHIFT: u32 = 56;

/// Bit position of the command-id field.
pub const COMMAND_SHIFT: u32 = 48;

/// Width in bits of the payload field.
pub const PAYLOAD_BITS: u32 = 48;

/// Mask selecting the payload field.
pub const PAYLOAD_MASK: u64 = (1 << PAYLOAD_BITS) - 1;

/// Mask selecting the device and command fields.
pub const HEADER_MASK: u64 = !PAYLOAD_MASK;

/// Number of addressable devices (`device` is 8 bits wide).
pub const MAX_DEVICES: usize = 256;

/// Number of addressable commands per device (`cmd` is 8 bits wide).
pub const MAX_COMMANDS: usize = 256;

/// Bit-field view over one 64-bit control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ControlWord(u64);

impl ControlWord {
    /// Wraps a raw control word.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Packs `device`, `cmd` and the low 48 bits of `payload` into a word.
    #[must_use]
    pub const fn encode(device: u8, cmd: u8, payload: u64) -> Self {
        Self(
            ((device as u64) << DEVICE_SHIFT)
                | ((cmd as u64) << COMMAND_SHIFT)
                | (payload & PAYLOAD_MASK),
        )
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Device id, bits 63..56.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn device(self) -> u8 {
        (self.0 >> DEVICE_SHIFT) as u8
    }

    /// Command id, bits 55..48.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn cmd(self) -> u8 {
        (self.0 >> COMMAND_SHIFT) as u8
    }

    /// Payload, bits 47..0.
    #[must_use]
    pub const fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    /// Builds the response word for this request carrying `value`.
    ///
    /// Device and command fields are preserved; the payload becomes
    /// `value mod 2^48`.
    #[must_use]
    pub const fn respond(self, value: u64) -> Self {
        Self((self.0 & HEADER_MASK) | (value & PAYLOAD_MASK))
    }
}

impl From<u64> for ControlWord {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<ControlWord> for u64 {
    fn from(word: ControlWord) -> Self {
        word.0
    }
}

impl fmt::Display for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dev={:#04x} cmd={:#04x} payload={:#014x}",
            self.device(),
            self.cmd(),
            self.payload()
        )
    }
}

/// Completion callback receiving the encoded response word.
pub type Responder = Box<dyn FnOnce(u64)>;

/// One incoming control word together with its completion callback.
///
/// A `Command` is consumed by [`Command::respond`], so it completes at most
/// once. Dropping a command without responding leaves the request unanswered.
pub struct Command {
    word: ControlWord,
    responder: Responder,
}

impl Command {
    /// Creates a command for `word` that hands its response to `responder`.
    #[must_use]
    pub fn new(word: impl Into<ControlWord>, responder: impl FnOnce(u64) + 'static) -> Self {
        Self {
            word: word.into(),
            responder: Box::new(responder),
        }
    }

    /// The request word.
    #[must_use]
    pub const fn word(&self) -> ControlWord {
        self.word
    }

    /// Target device id.
    #[must_use]
    pub const fn device(&self) -> u8 {
        self.word.device()
    }

    /// Command index within the target device.
    #[must_use]
    pub const fn cmd(&self) -> u8 {
        self.word.cmd()
    }

    /// Request payload (48 bits).
    #[must_use]
    pub const fn payload(&self) -> u64 {
        self.word.payload()
    }

    /// Completes the command, passing the re-encoded response word to the
    /// completion callback.
    pub fn respond(self, value: u64) {
        let response = self.word.respond(value);
        (self.responder)(response.raw());
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("word", &self.word)
            .finish_non_exhaustive()
    }
}
