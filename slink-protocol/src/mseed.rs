//! miniSEED 2 fixed-header and blockette access.
//!
//! Field layout follows the 48-byte fixed section of the data header.
//! Multi-byte integers arrive in either byte order; a bogus start-time year
//! or day flags a swapped record and every numeric field is read
//! accordingly.

use crate::error::{ProtocolError, Result};
use crate::time::{doy_to_md, format_timestamp, is_valid_year_day};

/// Size of the miniSEED 2 fixed data header.
pub const FSDH_LEN: usize = 48;
/// Blockette chains never extend past this offset in practice.
const MAX_HEADER_LEN: usize = 128;

/// SEED binary time (10 bytes at offset 20).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Btime {
    pub year: u16,
    /// Day of year, 1-based.
    pub day: u16,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    /// Fractional seconds in units of 0.0001 s.
    pub fract: u16,
}

impl Btime {
    /// Month and day-of-month for this start time.
    pub fn month_day(&self) -> Result<(u8, u8)> {
        doy_to_md(self.year, self.day)
    }

    /// Render the canonical `YYYY,MM,DD,hh,mm,ss` timestamp.
    pub fn to_timestamp(&self) -> Result<String> {
        let (month, day) = self.month_day()?;
        Ok(format_timestamp(
            self.year, month, day, self.hour, self.min, self.sec,
        ))
    }
}

/// The fixed section of a miniSEED 2 data header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fsdh {
    /// Six ASCII digits of the record sequence number.
    pub sequence: String,
    /// Data quality indicator: `D`, `R`, `Q` or `M`.
    pub quality: char,
    /// Station code, trailing spaces trimmed.
    pub station: String,
    /// Location identifier, trailing spaces trimmed (often empty).
    pub location: String,
    /// Channel code, trailing spaces trimmed.
    pub channel: String,
    /// Network code, trailing spaces trimmed.
    pub network: String,
    pub start_time: Btime,
    pub num_samples: u16,
    pub samprate_fact: i16,
    pub samprate_mult: i16,
    pub act_flags: u8,
    pub io_flags: u8,
    pub dq_flags: u8,
    pub num_blockettes: u8,
    /// Time correction in units of 0.0001 s.
    pub time_correction: i32,
    pub begin_data: u16,
    pub begin_blockette: u16,
    /// True when the record arrived in the non-big-endian byte order.
    pub swapped: bool,
}

impl Fsdh {
    /// Parse the 48-byte fixed header at the start of `record`.
    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() < FSDH_LEN {
            return Err(ProtocolError::RecordTooShort {
                expected: FSDH_LEN,
                actual: record.len(),
            });
        }

        let swapped = !is_valid_year_day(read_u16(record, 20, false), read_u16(record, 22, false));

        let start_time = Btime {
            year: read_u16(record, 20, swapped),
            day: read_u16(record, 22, swapped),
            hour: record[24],
            min: record[25],
            sec: record[26],
            fract: read_u16(record, 28, swapped),
        };

        Ok(Self {
            sequence: ascii_field(&record[0..6]),
            quality: record[6] as char,
            station: ascii_field(&record[8..13]),
            location: ascii_field(&record[13..15]),
            channel: ascii_field(&record[15..18]),
            network: ascii_field(&record[18..20]),
            start_time,
            num_samples: read_u16(record, 30, swapped),
            samprate_fact: read_u16(record, 32, swapped) as i16,
            samprate_mult: read_u16(record, 34, swapped) as i16,
            act_flags: record[36],
            io_flags: record[37],
            dq_flags: record[38],
            num_blockettes: record[39],
            time_correction: read_u32(record, 40, swapped) as i32,
            begin_data: read_u16(record, 44, swapped),
            begin_blockette: read_u16(record, 46, swapped),
            swapped,
        })
    }

    /// Start time rendered as `YYYY,MM,DD,hh,mm,ss`.
    pub fn start_time_string(&self) -> Result<String> {
        self.start_time.to_timestamp()
    }

    /// Source name in the `NET_STA_LOC_CHAN` convention.
    pub fn srcname(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.network, self.station, self.location, self.channel
        )
    }

    /// Nominal sample rate in Hz from the factor/multiplier pair.
    pub fn nominal_samprate(&self) -> f64 {
        let fact = self.samprate_fact as f64;
        let mult = self.samprate_mult as f64;

        let mut rate = if self.samprate_fact > 0 {
            fact
        } else if self.samprate_fact < 0 {
            -1.0 / fact
        } else {
            return 0.0;
        };

        if self.samprate_mult > 0 {
            rate *= mult;
        } else if self.samprate_mult < 0 {
            rate /= -mult;
        }

        rate
    }
}

/// Blockette 100: actual sample rate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Blkt100 {
    pub sample_rate: f32,
}

/// Blockette 1000: encoding, word order and record length.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Blkt1000 {
    pub encoding: u8,
    pub word_order: u8,
    /// Record length as a power-of-two exponent.
    pub rec_len: u8,
}

impl Blkt1000 {
    pub fn record_size(&self) -> usize {
        1usize << self.rec_len
    }
}

/// Blockette 1001: timing quality and microsecond correction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Blkt1001 {
    pub timing_quality: u8,
    pub usec: i8,
    pub frame_count: u8,
}

/// The well-known blockettes of a record, collected in one chain walk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blockettes {
    pub b100: Option<Blkt100>,
    pub b1000: Option<Blkt1000>,
    pub b1001: Option<Blkt1001>,
}

impl Blockettes {
    /// Walk the blockette chain of `record`, collecting known types.
    pub fn scan(record: &[u8]) -> Result<Self> {
        let fsdh = Fsdh::parse(record)?;
        let swapped = fsdh.swapped;

        let mut found = Self::default();
        let mut offset = fsdh.begin_blockette as usize;

        while offset != 0 && offset > 47 && offset <= MAX_HEADER_LEN {
            if offset + 4 > record.len() {
                break;
            }

            let blkt_type = read_u16(record, offset, swapped);
            let next = read_u16(record, offset + 2, swapped) as usize;

            match blkt_type {
                100 if offset + 12 <= record.len() => {
                    found.b100 = Some(Blkt100 {
                        sample_rate: read_f32(record, offset + 4, swapped),
                    });
                }
                1000 if offset + 8 <= record.len() => {
                    found.b1000 = Some(Blkt1000 {
                        encoding: record[offset + 4],
                        word_order: record[offset + 5],
                        rec_len: record[offset + 6],
                    });
                }
                1001 if offset + 8 <= record.len() => {
                    found.b1001 = Some(Blkt1001 {
                        timing_quality: record[offset + 4],
                        usec: record[offset + 5] as i8,
                        frame_count: record[offset + 7],
                    });
                }
                _ => {}
            }

            if next != 0 && (next < 4 || next - 4 <= offset) {
                return Err(ProtocolError::InvalidBlocketteChain { offset, next });
            }

            offset = next;
        }

        Ok(found)
    }
}

/// Coarse classification of a miniSEED 2 record's content.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketType {
    /// Waveform data.
    Data,
    /// Event detection record (blockette 200-299).
    Detection,
    /// Calibration record (blockette 300-399).
    Calibration,
    /// Timing exception record (blockette 500-599).
    Timing,
    /// Log/message record (sample rate factor 0 with samples).
    Message,
    /// Opaque data record (blockette 2000, no samples).
    Opaque,
}

/// Classify a record by its marker blockettes, the way `slinktool` reports
/// packet types.
pub fn packet_type(record: &[u8]) -> Result<PacketType> {
    let fsdh = Fsdh::parse(record)?;
    let swapped = fsdh.swapped;

    let mut has_b2000 = false;
    let mut offset = fsdh.begin_blockette as usize;

    while offset != 0 && offset > 47 && offset <= MAX_HEADER_LEN {
        if offset + 4 > record.len() {
            break;
        }

        let blkt_type = read_u16(record, offset, swapped);
        let next = read_u16(record, offset + 2, swapped) as usize;

        match blkt_type {
            200..=299 => return Ok(PacketType::Detection),
            300..=399 => return Ok(PacketType::Calibration),
            500..=599 => return Ok(PacketType::Timing),
            2000 => has_b2000 = true,
            _ => {}
        }

        if next != 0 && (next < 4 || next - 4 <= offset) {
            return Err(ProtocolError::InvalidBlocketteChain { offset, next });
        }

        offset = next;
    }

    if fsdh.samprate_fact == 0 {
        if fsdh.num_samples != 0 {
            return Ok(PacketType::Message);
        }
        if has_b2000 {
            return Ok(PacketType::Opaque);
        }
    }

    Ok(PacketType::Data)
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches([' ', '\0'])
        .to_owned()
}

fn read_u16(buf: &[u8], offset: usize, swapped: bool) -> u16 {
    let bytes = [buf[offset], buf[offset + 1]];
    if swapped {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    }
}

fn read_u32(buf: &[u8], offset: usize, swapped: bool) -> u32 {
    let bytes = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
    if swapped {
        u32::from_le_bytes(bytes)
    } else {
        u32::from_be_bytes(bytes)
    }
}

fn read_f32(buf: &[u8], offset: usize, swapped: bool) -> f32 {
    f32::from_bits(read_u32(buf, offset, swapped))
}
