use crate::error::{ProtocolError, Result};
use crate::sequence::SequenceNumber;

/// SeedLink data frame signature.
pub const SIGNATURE: &[u8; 2] = b"SL";
/// SeedLink INFO frame signature.
pub const INFO_SIGNATURE: &[u8; 6] = b"SLINFO";
/// Size of the SeedLink frame header preceding each miniSEED record.
pub const HEADER_LEN: usize = 8;

/// The parsed 8-byte SeedLink frame header.
///
/// Either `SL` + six uppercase hex digits (a data frame carrying a 24-bit
/// sequence number), or `SLINFO` + reserved byte + terminator byte, where a
/// `'*'` terminator means further INFO records follow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlHeader {
    Data { sequence: SequenceNumber },
    Info { more: bool },
}

impl SlHeader {
    /// Parse a frame header from the first 8 bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        }

        if &buf[..INFO_SIGNATURE.len()] == INFO_SIGNATURE {
            return Ok(Self::Info {
                more: buf[HEADER_LEN - 1] == b'*',
            });
        }

        if &buf[..SIGNATURE.len()] != SIGNATURE {
            return Err(ProtocolError::InvalidSignature {
                actual: [buf[0], buf[1]],
            });
        }

        let hex = std::str::from_utf8(&buf[2..HEADER_LEN]).map_err(|_| {
            ProtocolError::InvalidSequence("sequence bytes are not valid UTF-8".into())
        })?;
        let sequence = SequenceNumber::from_frame_hex(hex)?;

        Ok(Self::Data { sequence })
    }

    /// Serialize back to the 8-byte wire form.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        match self {
            Self::Data { sequence } => {
                header[..2].copy_from_slice(SIGNATURE);
                header[2..].copy_from_slice(sequence.to_frame_hex().as_bytes());
            }
            Self::Info { more } => {
                header[..6].copy_from_slice(INFO_SIGNATURE);
                header[6] = b' ';
                header[7] = if more { b'*' } else { b' ' };
            }
        }
        header
    }

    pub fn is_info(self) -> bool {
        matches!(self, Self::Info { .. })
    }

    /// Sequence number for data frames; INFO frames carry none.
    pub fn sequence(self) -> Option<SequenceNumber> {
        match self {
            Self::Data { sequence } => Some(sequence),
            Self::Info { .. } => None,
        }
    }
}
