use crate::error::{ProtocolError, Result};

/// A SeedLink packet sequence number.
///
/// Servers assign these per station, modulo 2^24. The frame header carries
/// exactly six uppercase hex digits; commands (`DATA`, `FETCH`) use an
/// unpadded hex form.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(u32);

impl SequenceNumber {
    /// Maximum sequence value (24 bits).
    pub const MAX: u32 = 0xFF_FFFF;

    /// Wraps the value into the 24-bit range.
    pub fn new(value: u32) -> Self {
        Self(value & Self::MAX)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// The following sequence number, modulo 2^24.
    pub fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX)
    }

    /// Parse the 6-hex-digit frame header form (e.g. `"00001A"`).
    pub fn from_frame_hex(hex: &str) -> Result<Self> {
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidSequence(format!(
                "frame sequence must be 6 hex digits, got {hex:?}"
            )));
        }
        let value = u32::from_str_radix(hex, 16)
            .map_err(|_| ProtocolError::InvalidSequence(format!("invalid hex: {hex:?}")))?;
        Ok(Self(value))
    }

    /// Parse the unpadded hex form used in command arguments (e.g. `"AC"`).
    pub fn from_command_hex(hex: &str) -> Result<Self> {
        if hex.is_empty() || hex.len() > 6 {
            return Err(ProtocolError::InvalidSequence(format!(
                "command sequence out of range: {hex:?}"
            )));
        }
        let value = u32::from_str_radix(hex, 16)
            .map_err(|_| ProtocolError::InvalidSequence(format!("invalid hex: {hex:?}")))?;
        Ok(Self(value))
    }

    /// Six uppercase hex digits, as carried in the frame header.
    pub fn to_frame_hex(self) -> String {
        format!("{:06X}", self.0)
    }

    /// Unpadded uppercase hex, as sent in command arguments.
    pub fn to_command_hex(self) -> String {
        format!("{:X}", self.0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
