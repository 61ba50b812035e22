use crate::error::{ProtocolError, Result};

/// Detail level for an `INFO` request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InfoLevel {
    /// Server identification; also used as the keepalive probe.
    Id,
    /// Server capability list.
    Capabilities,
    /// Station list.
    Stations,
    /// Stream list.
    Streams,
    /// Gap information.
    Gaps,
    /// Connection list.
    Connections,
    /// Everything the server will disclose.
    All,
}

impl InfoLevel {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ID" => Ok(Self::Id),
            "CAPABILITIES" => Ok(Self::Capabilities),
            "STATIONS" => Ok(Self::Stations),
            "STREAMS" => Ok(Self::Streams),
            "GAPS" => Ok(Self::Gaps),
            "CONNECTIONS" => Ok(Self::Connections),
            "ALL" => Ok(Self::All),
            _ => Err(ProtocolError::InvalidInfoLevel(s.to_owned())),
        }
    }

    /// Wire representation (uppercase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Capabilities => "CAPABILITIES",
            Self::Stations => "STATIONS",
            Self::Streams => "STREAMS",
            Self::Gaps => "GAPS",
            Self::Connections => "CONNECTIONS",
            Self::All => "ALL",
        }
    }
}

impl std::fmt::Display for InfoLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
