//! miniSEED 2/3 record boundary detection.
//!
//! SeedLink frames carry no length field; the record length is recovered
//! from the miniSEED payload itself. For miniSEED 3 the fixed header states
//! the length outright. For miniSEED 2 the length comes from a blockette
//! 1000 when one is present, otherwise from scanning for the start of the
//! next record at 64-byte offsets.

use crate::error::{ProtocolError, Result};
use crate::time::is_valid_year_day;

/// Minimum supported miniSEED record size.
pub const MIN_RECLEN: usize = 48;
/// Maximum supported miniSEED record size.
pub const MAX_RECLEN: usize = 4096;
/// Most common miniSEED 2 record size on SeedLink.
pub const DEFAULT_RECLEN: usize = 512;

/// Length of the miniSEED 3 fixed header.
const MS3_FIXED_LEN: usize = 40;
/// Offset of the first blockette offset field in a miniSEED 2 header.
const MS2_BLOCKETTE_OFFSET: usize = 46;
/// Offsets of year and day-of-year in a miniSEED 2 header.
const MS2_YEAR_OFFSET: usize = 20;
const MS2_DAY_OFFSET: usize = 22;

/// Major format version of a detected record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MseedVersion {
    V2,
    V3,
}

/// Outcome of probing a buffer for a miniSEED record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Detection {
    /// A record starts at offset zero with the given total length.
    Record {
        version: MseedVersion,
        length: usize,
    },
    /// The buffer starts with a recognized record whose length cannot be
    /// determined from the bytes on hand.
    Incomplete,
}

/// Probe `buf` for a miniSEED record starting at offset zero.
///
/// Callers must supply at least [`MIN_RECLEN`] bytes. Returns an error when
/// the bytes are not miniSEED at all or the blockette chain is corrupt.
pub fn detect(buf: &[u8]) -> Result<Detection> {
    if buf.len() < MIN_RECLEN {
        return Err(ProtocolError::RecordTooShort {
            expected: MIN_RECLEN,
            actual: buf.len(),
        });
    }

    if is_mseed3_header(buf) {
        let sid_len = buf[33] as usize;
        let extra_len = u16::from_le_bytes([buf[34], buf[35]]) as usize;
        let data_len = u32::from_le_bytes([buf[36], buf[37], buf[38], buf[39]]) as usize;
        return Ok(Detection::Record {
            version: MseedVersion::V3,
            length: MS3_FIXED_LEN + sid_len + extra_len + data_len,
        });
    }

    if is_mseed2_header(buf) {
        return detect_mseed2(buf);
    }

    Err(ProtocolError::NotMiniseed)
}

/// miniSEED 3 starts `'M'`, `'S'`, format version 3.
fn is_mseed3_header(buf: &[u8]) -> bool {
    buf.len() >= MS3_FIXED_LEN && buf[0] == b'M' && buf[1] == b'S' && buf[2] == 3
}

/// miniSEED 2 starts with a six-digit ASCII sequence number, a data quality
/// indicator and a space.
fn is_mseed2_header(buf: &[u8]) -> bool {
    buf.len() >= MIN_RECLEN
        && buf[..6].iter().all(u8::is_ascii_digit)
        && matches!(buf[6], b'D' | b'R' | b'Q' | b'M' | b' ')
        && buf[7] == b' '
}

fn detect_mseed2(buf: &[u8]) -> Result<Detection> {
    // The wire may be either byte order; a bogus year/day means the record
    // was written in the opposite order to big-endian.
    let swapped = !is_valid_year_day(
        read_u16(buf, MS2_YEAR_OFFSET, false),
        read_u16(buf, MS2_DAY_OFFSET, false),
    );

    // Walk the blockette chain looking for a 1000 blockette
    let mut blkt_offset = read_u16(buf, MS2_BLOCKETTE_OFFSET, swapped) as usize;

    while blkt_offset != 0 && blkt_offset > 47 {
        if blkt_offset + 4 > buf.len() {
            // Chain continues past the bytes on hand
            break;
        }

        let blkt_type = read_u16(buf, blkt_offset, swapped);
        let next_blkt = read_u16(buf, blkt_offset + 2, swapped) as usize;

        if blkt_type == 1000 && blkt_offset + 8 <= buf.len() {
            let exponent = buf[blkt_offset + 6];
            if exponent >= 32 {
                return Err(ProtocolError::NotMiniseed);
            }
            return Ok(Detection::Record {
                version: MseedVersion::V2,
                length: 1usize << exponent,
            });
        }

        // An offset that does not advance would loop forever
        if next_blkt != 0 && (next_blkt < 4 || next_blkt - 4 <= blkt_offset) {
            return Err(ProtocolError::InvalidBlocketteChain {
                offset: blkt_offset,
                next: next_blkt,
            });
        }

        blkt_offset = next_blkt;
    }

    // No blockette 1000: the start of the next record implies the length
    let mut offset = 64;
    while offset + MIN_RECLEN <= buf.len() {
        if is_mseed2_header(&buf[offset..]) {
            return Ok(Detection::Record {
                version: MseedVersion::V2,
                length: offset,
            });
        }
        offset += 64;
    }

    Ok(Detection::Incomplete)
}

fn read_u16(buf: &[u8], offset: usize, swapped: bool) -> u16 {
    let bytes = [buf[offset], buf[offset + 1]];
    if swapped {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal miniSEED 2 header with a sane big-endian start time.
    fn ms2_header(len: usize) -> Vec<u8> {
        let mut rec = vec![0u8; len];
        rec[..6].copy_from_slice(b"000001");
        rec[6] = b'D';
        rec[7] = b' ';
        rec[8..13].copy_from_slice(b"WLF  ");
        rec[15..18].copy_from_slice(b"BHZ");
        rec[18..20].copy_from_slice(b"GE");
        rec[MS2_YEAR_OFFSET..MS2_YEAR_OFFSET + 2].copy_from_slice(&2024u16.to_be_bytes());
        rec[MS2_DAY_OFFSET..MS2_DAY_OFFSET + 2].copy_from_slice(&1u16.to_be_bytes());
        rec
    }

    /// Append a blockette 1000 at offset 48 declaring `1 << exponent` bytes.
    fn with_blockette_1000(mut rec: Vec<u8>, exponent: u8) -> Vec<u8> {
        rec[MS2_BLOCKETTE_OFFSET..MS2_BLOCKETTE_OFFSET + 2].copy_from_slice(&48u16.to_be_bytes());
        rec[48..50].copy_from_slice(&1000u16.to_be_bytes());
        rec[50..52].copy_from_slice(&0u16.to_be_bytes());
        rec[52] = 10; // Steim-1 encoding
        rec[53] = 1;
        rec[54] = exponent;
        rec
    }

    fn ms3_header(sid_len: u8, extra_len: u16, data_len: u32) -> Vec<u8> {
        let total = MS3_FIXED_LEN + sid_len as usize + extra_len as usize + data_len as usize;
        let mut rec = vec![0u8; total.max(MIN_RECLEN)];
        rec[0] = b'M';
        rec[1] = b'S';
        rec[2] = 3;
        rec[33] = sid_len;
        rec[34..36].copy_from_slice(&extra_len.to_le_bytes());
        rec[36..40].copy_from_slice(&data_len.to_le_bytes());
        rec
    }

    #[test]
    fn v2_with_blockette_1000() {
        let rec = with_blockette_1000(ms2_header(512), 9);
        assert_eq!(
            detect(&rec).unwrap(),
            Detection::Record {
                version: MseedVersion::V2,
                length: 512,
            }
        );
    }

    #[test]
    fn v2_blockette_on_prefix_only() {
        // The blockette 1000 sits inside the first 56 bytes, so the length
        // is known long before the record is complete
        let rec = with_blockette_1000(ms2_header(512), 9);
        assert_eq!(
            detect(&rec[..56]).unwrap(),
            Detection::Record {
                version: MseedVersion::V2,
                length: 512,
            }
        );
    }

    #[test]
    fn v2_swapped_byte_order() {
        let mut rec = with_blockette_1000(ms2_header(512), 9);
        // Rewrite the multi-byte fields little-endian
        rec[MS2_YEAR_OFFSET..MS2_YEAR_OFFSET + 2].copy_from_slice(&2024u16.to_le_bytes());
        rec[MS2_DAY_OFFSET..MS2_DAY_OFFSET + 2].copy_from_slice(&1u16.to_le_bytes());
        rec[MS2_BLOCKETTE_OFFSET..MS2_BLOCKETTE_OFFSET + 2].copy_from_slice(&48u16.to_le_bytes());
        rec[48..50].copy_from_slice(&1000u16.to_le_bytes());
        rec[50..52].copy_from_slice(&0u16.to_le_bytes());
        assert_eq!(
            detect(&rec).unwrap(),
            Detection::Record {
                version: MseedVersion::V2,
                length: 512,
            }
        );
    }

    #[test]
    fn v2_next_header_scan() {
        // No blockette 1000; a new record header at byte 256 implies the length
        let mut buf = ms2_header(320);
        let next = ms2_header(64);
        buf[256..256 + 64].copy_from_slice(&next[..64]);
        assert_eq!(
            detect(&buf).unwrap(),
            Detection::Record {
                version: MseedVersion::V2,
                length: 256,
            }
        );
    }

    #[test]
    fn v2_incomplete_when_buffer_exhausted() {
        // Recognized v2, no blockette 1000, no next header in sight
        let rec = ms2_header(200);
        assert_eq!(detect(&rec).unwrap(), Detection::Incomplete);
    }

    #[test]
    fn v2_prefix_never_wrong_length() {
        // Every prefix of a detectable record either reports the full
        // length or asks for more bytes
        let rec = with_blockette_1000(ms2_header(512), 9);
        for k in MIN_RECLEN..=rec.len() {
            match detect(&rec[..k]).unwrap() {
                Detection::Record { length, .. } => assert_eq!(length, 512, "prefix {k}"),
                Detection::Incomplete => assert!(k < 56, "prefix {k} should know the length"),
            }
        }
    }

    #[test]
    fn v2_non_advancing_blockette_chain() {
        let mut rec = with_blockette_1000(ms2_header(512), 9);
        rec[48..50].copy_from_slice(&999u16.to_be_bytes()); // not a 1000
        rec[50..52].copy_from_slice(&48u16.to_be_bytes()); // points at itself
        let err = detect(&rec).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidBlocketteChain { .. }));
    }

    #[test]
    fn v3_header_length() {
        let rec = ms3_header(11, 0, 400);
        assert_eq!(
            detect(&rec).unwrap(),
            Detection::Record {
                version: MseedVersion::V3,
                length: 40 + 11 + 400,
            }
        );
    }

    #[test]
    fn v3_with_extra_headers() {
        let rec = ms3_header(8, 30, 256);
        assert_eq!(
            detect(&rec).unwrap(),
            Detection::Record {
                version: MseedVersion::V3,
                length: 40 + 8 + 30 + 256,
            }
        );
    }

    #[test]
    fn not_miniseed() {
        let buf = vec![0xAAu8; 64];
        assert!(matches!(
            detect(&buf).unwrap_err(),
            ProtocolError::NotMiniseed
        ));
    }

    #[test]
    fn ascii_garbage_not_miniseed() {
        let mut buf = vec![b'X'; 64];
        buf[..6].copy_from_slice(b"ABCDEF"); // letters, not digits
        assert!(detect(&buf).is_err());
    }

    #[test]
    fn buffer_too_short() {
        let err = detect(&[0u8; 47]).unwrap_err();
        assert!(matches!(err, ProtocolError::RecordTooShort { .. }));
    }

    #[test]
    fn absurd_record_length_exponent_rejected() {
        let rec = with_blockette_1000(ms2_header(512), 40);
        assert!(detect(&rec).is_err());
    }
}
