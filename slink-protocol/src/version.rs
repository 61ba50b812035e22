use crate::error::{ProtocolError, Result};

/// SeedLink protocol version as advertised in the HELLO banner (e.g. `v3.1`).
///
/// Command availability is gated on the negotiated version, so this keeps
/// the numeric major/minor rather than an enum of known releases.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// Sentinel: no version parsed yet.
    pub const UNKNOWN: Self = Self { major: 0, minor: 0 };

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse a version token such as `"v3.1"` or `"3.1"`.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.strip_prefix(['v', 'V']).unwrap_or(token);
        let (major, minor) = match token.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (token, "0"),
        };
        let major: u8 = major
            .parse()
            .map_err(|_| ProtocolError::InvalidResponse(format!("bad version token {token:?}")))?;
        // Trailing non-digits are tolerated ("3.1beta" advertises 3.1)
        let minor_digits: String = minor.chars().take_while(|c| c.is_ascii_digit()).collect();
        let minor: u8 = minor_digits
            .parse()
            .map_err(|_| ProtocolError::InvalidResponse(format!("bad version token {token:?}")))?;
        Ok(Self { major, minor })
    }

    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }

    /// True if this version is at least `other`.
    pub fn at_least(self, other: Self) -> bool {
        (self.major, self.minor) >= (other.major, other.minor)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
