use crate::error::{ProtocolError, Result};
use crate::version::ProtocolVersion;

/// A single-line command response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error,
}

impl Response {
    /// Parse a single-line response: `OK` or `ERROR`.
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line.eq_ignore_ascii_case("OK") {
            return Ok(Self::Ok);
        }

        // Some servers append a reason after ERROR
        if line.len() >= 5 && line[..5].eq_ignore_ascii_case("ERROR") {
            return Ok(Self::Error);
        }

        Err(ProtocolError::InvalidResponse(format!(
            "unrecognized response: {line:?}"
        )))
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ok => b"OK\r\n".to_vec(),
            Self::Error => b"ERROR\r\n".to_vec(),
        }
    }
}

/// The two-line `HELLO` reply.
///
/// Line 1: `"SeedLink v3.1 SL-test"` — software token, version token,
/// remainder is the server id. Line 2: the site/organization description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelloReply {
    /// Server software name (e.g. `"SeedLink"`).
    pub software: String,
    /// Protocol version parsed from the `v3.x` token.
    pub version: ProtocolVersion,
    /// Remainder of the first line after the version token.
    pub server_id: String,
    /// Second line verbatim.
    pub site: String,
}

impl HelloReply {
    pub fn parse(line1: &str, line2: &str) -> Result<Self> {
        let line1 = line1.trim_end_matches('\n').trim_end_matches('\r');
        let line2 = line2.trim_end_matches('\n').trim_end_matches('\r');

        if line1.is_empty() {
            return Err(ProtocolError::InvalidResponse(
                "empty HELLO banner".to_owned(),
            ));
        }

        let mut parts = line1.split_whitespace();
        let software = parts.next().unwrap_or("").to_owned();

        // Scan for the first "v<digit>..." token; everything after it is the
        // server id. Servers that advertise no version still get UNKNOWN.
        let mut version = ProtocolVersion::UNKNOWN;
        let mut server_id = String::new();
        let mut rest: Vec<&str> = Vec::new();
        for token in parts {
            if version == ProtocolVersion::UNKNOWN
                && token.len() >= 2
                && (token.starts_with('v') || token.starts_with('V'))
                && token.as_bytes()[1].is_ascii_digit()
            {
                version = ProtocolVersion::parse(token)?;
            } else {
                rest.push(token);
            }
        }
        if !rest.is_empty() {
            server_id = rest.join(" ");
        }

        Ok(Self {
            software,
            version,
            server_id,
            site: line2.to_owned(),
        })
    }
}
