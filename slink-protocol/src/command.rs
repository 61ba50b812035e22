use crate::error::{ProtocolError, Result};
use crate::info::InfoLevel;
use crate::sequence::SequenceNumber;
use crate::version::ProtocolVersion;

/// A SeedLink session command.
///
/// Commands are CRLF-terminated ASCII lines. Sequence arguments use the
/// unpadded uppercase hex form (`DATA AC 2024,01,01,00,00,00`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Hello,
    Station {
        station: String,
        network: String,
    },
    Select {
        pattern: String,
    },
    /// Stream in real time, optionally resuming after `sequence`.
    Data {
        sequence: Option<SequenceNumber>,
        timestamp: Option<String>,
    },
    /// Like `Data`, but the server closes once buffered data is drained.
    Fetch {
        sequence: Option<SequenceNumber>,
        timestamp: Option<String>,
    },
    /// Request an explicit time window.
    Time {
        start: String,
        end: Option<String>,
    },
    End,
    Info {
        level: InfoLevel,
    },
    Batch,
    Bye,
}

impl Command {
    /// Parse a command from a text line (the trailing `\r\n` is tolerated).
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let mut parts = line.split_whitespace();
        let keyword = parts
            .next()
            .ok_or_else(|| ProtocolError::InvalidCommand("empty command".into()))?;

        match keyword.to_uppercase().as_str() {
            "HELLO" => {
                reject_extra_args(&mut parts, "HELLO")?;
                Ok(Self::Hello)
            }
            "STATION" => {
                let station = parts.next().ok_or_else(|| {
                    ProtocolError::InvalidCommand("STATION requires a station code".into())
                })?;
                let network = parts.next().ok_or_else(|| {
                    ProtocolError::InvalidCommand("STATION requires a network code".into())
                })?;
                reject_extra_args(&mut parts, "STATION")?;
                Ok(Self::Station {
                    station: station.to_owned(),
                    network: network.to_owned(),
                })
            }
            "SELECT" => {
                let pattern = parts.next().ok_or_else(|| {
                    ProtocolError::InvalidCommand("SELECT requires a pattern".into())
                })?;
                reject_extra_args(&mut parts, "SELECT")?;
                Ok(Self::Select {
                    pattern: pattern.to_owned(),
                })
            }
            "DATA" => {
                let (sequence, timestamp) = parse_resume_args(&mut parts, "DATA")?;
                Ok(Self::Data {
                    sequence,
                    timestamp,
                })
            }
            "FETCH" => {
                let (sequence, timestamp) = parse_resume_args(&mut parts, "FETCH")?;
                Ok(Self::Fetch {
                    sequence,
                    timestamp,
                })
            }
            "TIME" => {
                let start = parts
                    .next()
                    .ok_or_else(|| {
                        ProtocolError::InvalidCommand("TIME requires a start time".into())
                    })?
                    .to_owned();
                let end = parts.next().map(|s| s.to_owned());
                reject_extra_args(&mut parts, "TIME")?;
                Ok(Self::Time { start, end })
            }
            "END" => {
                reject_extra_args(&mut parts, "END")?;
                Ok(Self::End)
            }
            "INFO" => {
                let level_str = parts.next().ok_or_else(|| {
                    ProtocolError::InvalidCommand("INFO requires a level".into())
                })?;
                reject_extra_args(&mut parts, "INFO")?;
                let level = InfoLevel::parse(level_str)?;
                Ok(Self::Info { level })
            }
            "BATCH" => {
                reject_extra_args(&mut parts, "BATCH")?;
                Ok(Self::Batch)
            }
            "BYE" => {
                reject_extra_args(&mut parts, "BYE")?;
                Ok(Self::Bye)
            }
            _ => Err(ProtocolError::InvalidCommand(format!(
                "unknown command: {keyword:?}"
            ))),
        }
    }

    /// Serialize to wire bytes (CRLF-terminated).
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}\r\n", self.format_line()).into_bytes()
    }

    /// Minimum protocol version this command needs, if it is gated at all.
    pub fn requires(&self) -> Option<ProtocolVersion> {
        match self {
            Self::Batch => Some(ProtocolVersion::new(3, 1)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Station { .. } => "STATION",
            Self::Select { .. } => "SELECT",
            Self::Data { .. } => "DATA",
            Self::Fetch { .. } => "FETCH",
            Self::Time { .. } => "TIME",
            Self::End => "END",
            Self::Info { .. } => "INFO",
            Self::Batch => "BATCH",
            Self::Bye => "BYE",
        }
    }

    fn format_line(&self) -> String {
        match self {
            Self::Hello => "HELLO".into(),
            Self::Station { station, network } => format!("STATION {station} {network}"),
            Self::Select { pattern } => format!("SELECT {pattern}"),
            Self::Data {
                sequence,
                timestamp,
            } => format_resume("DATA", *sequence, timestamp.as_deref()),
            Self::Fetch {
                sequence,
                timestamp,
            } => format_resume("FETCH", *sequence, timestamp.as_deref()),
            Self::Time { start, end } => match end {
                Some(end) => format!("TIME {start} {end}"),
                None => format!("TIME {start}"),
            },
            Self::End => "END".into(),
            Self::Info { level } => format!("INFO {}", level.as_str()),
            Self::Batch => "BATCH".into(),
            Self::Bye => "BYE".into(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_line())
    }
}

fn format_resume(keyword: &str, sequence: Option<SequenceNumber>, timestamp: Option<&str>) -> String {
    let mut line = keyword.to_owned();
    if let Some(seq) = sequence {
        line.push(' ');
        line.push_str(&seq.to_command_hex());
        // A timestamp is only meaningful together with a sequence
        if let Some(ts) = timestamp {
            line.push(' ');
            line.push_str(ts);
        }
    }
    line
}

fn parse_resume_args(
    parts: &mut std::str::SplitWhitespace<'_>,
    command: &str,
) -> Result<(Option<SequenceNumber>, Option<String>)> {
    let sequence = parts
        .next()
        .map(SequenceNumber::from_command_hex)
        .transpose()?;
    let timestamp = parts.next().map(|s| s.to_owned());
    reject_extra_args(parts, command)?;
    Ok((sequence, timestamp))
}

fn reject_extra_args(parts: &mut std::str::SplitWhitespace<'_>, command: &str) -> Result<()> {
    if parts.next().is_some() {
        Err(ProtocolError::InvalidCommand(format!(
            "{command}: unexpected extra arguments"
        )))
    } else {
        Ok(())
    }
}
