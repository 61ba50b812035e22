//! Civil time helpers for miniSEED start times and SeedLink timestamps.

use crate::error::{ProtocolError, Result};

/// Sanity range for a miniSEED start-time year/day pair; values outside it
/// indicate the record arrived in the opposite byte order.
pub fn is_valid_year_day(year: u16, day: u16) -> bool {
    (1900..=2050).contains(&year) && (1..=366).contains(&day)
}

pub fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Convert a day-of-year (1-based) to a month and day-of-month.
pub fn doy_to_md(year: u16, doy: u16) -> Result<(u8, u8)> {
    let leap = is_leap_year(year);
    if doy == 0 || doy > if leap { 366 } else { 365 } {
        return Err(ProtocolError::InvalidTime(format!(
            "day-of-year {doy} out of range for {year}"
        )));
    }

    let months = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];

    let mut remaining = doy;
    for (idx, &len) in months.iter().enumerate() {
        if remaining <= len {
            return Ok((idx as u8 + 1, remaining as u8));
        }
        remaining -= len;
    }
    unreachable!("day-of-year bounded above");
}

/// Render the canonical SeedLink timestamp, `YYYY,MM,DD,hh,mm,ss`.
pub fn format_timestamp(year: u16, month: u8, day: u8, hour: u8, min: u8, sec: u8) -> String {
    format!("{year:04},{month:02},{day:02},{hour:02},{min:02},{sec:02}")
}

/// Parse and validate a `YYYY,MM,DD,hh,mm,ss` timestamp.
///
/// Returns the six components. Used to reject malformed state-file lines;
/// timestamps handed to the server are otherwise passed through verbatim.
pub fn parse_timestamp(s: &str) -> Result<(u16, u8, u8, u8, u8, u8)> {
    let bad = || ProtocolError::InvalidTime(format!("bad timestamp {s:?}"));

    let fields: Vec<&str> = s.split(',').collect();
    if fields.len() != 6 {
        return Err(bad());
    }

    let year: u16 = fields[0].parse().map_err(|_| bad())?;
    let month: u8 = fields[1].parse().map_err(|_| bad())?;
    let day: u8 = fields[2].parse().map_err(|_| bad())?;
    let hour: u8 = fields[3].parse().map_err(|_| bad())?;
    let min: u8 = fields[4].parse().map_err(|_| bad())?;
    let sec: u8 = fields[5].parse().map_err(|_| bad())?;

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || min > 59 || sec > 61 {
        return Err(bad());
    }

    Ok((year, month, day, hour, min, sec))
}
