//! Saving and recovering resume state across restarts.
//!
//! The state file is plain text, one line per subscription:
//! `NET STA HEXSEQ TIMESTAMP`, with a 6-digit uppercase hex sequence and
//! the canonical `YYYY,MM,DD,hh,mm,ss` timestamp (`-` when none is known).
//! Lines starting with `#` are comments.

use std::io::Write;
use std::path::Path;

use slink_protocol::SequenceNumber;
use slink_protocol::time::parse_timestamp;
use tracing::{debug, warn};

use crate::error::Result;
use crate::streams::StreamRegistry;

/// Write the registry's resume state to `path`.
///
/// The file is replaced atomically (write to `<path>.tmp`, then rename).
/// Entries that never received a packet are skipped. Returns the number of
/// lines written.
pub(crate) fn save(registry: &StreamRegistry, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_owned(),
    });

    let mut file = std::fs::File::create(&tmp_path)?;
    let mut written = 0;

    for entry in registry.entries() {
        let Some(seqnum) = entry.seqnum else {
            continue;
        };
        let timestamp = entry.timestamp.as_deref().unwrap_or("-");
        writeln!(
            file,
            "{} {} {} {}",
            entry.net,
            entry.sta,
            seqnum.to_frame_hex(),
            timestamp
        )?;
        written += 1;
    }

    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), entries = written, "state saved");
    Ok(written)
}

/// Apply resume state from `path` to already-subscribed entries.
///
/// Values are applied to entries matching exactly on net and station;
/// unmatched and malformed lines are ignored. A missing file is not an
/// error. Returns the number of entries updated.
pub(crate) fn recover(registry: &mut StreamRegistry, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no state file to recover");
            return Ok(0);
        }
        Err(err) => return Err(err.into()),
    };

    let mut applied = 0;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [net, sta, hexseq, timestamp] = fields.as_slice() else {
            warn!(line, "malformed state line, ignoring");
            continue;
        };

        let Ok(seqnum) = SequenceNumber::from_frame_hex(hexseq) else {
            warn!(line, "bad sequence in state line, ignoring");
            continue;
        };

        let timestamp = if *timestamp == "-" {
            None
        } else if parse_timestamp(timestamp).is_ok() {
            Some(*timestamp)
        } else {
            warn!(line, "bad timestamp in state line, ignoring");
            continue;
        };

        if registry.apply_state(net, sta, seqnum, timestamp) {
            applied += 1;
        }
    }

    debug!(path = %path.display(), entries = applied, "state recovered");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "slink-state-{tag}-{}-{:?}.dat",
            std::process::id(),
            std::thread::current().id()
        ))
    }

    fn registry_with_entries() -> StreamRegistry {
        let mut registry = StreamRegistry::new();
        registry.add_stream("GE", "WLF", Some("BH?.D"), None, None).unwrap();
        registry.add_stream("IU", "ANMO", None, None, None).unwrap();
        registry
    }

    #[test]
    fn save_recover_roundtrip() {
        let path = temp_path("roundtrip");

        let mut registry = registry_with_entries();
        registry.update(
            "GE",
            "WLF",
            SequenceNumber::new(0xAB),
            Some("2024,01,01,00,00,00"),
        );
        registry.update("IU", "ANMO", SequenceNumber::new(0x10), None);

        assert_eq!(save(&registry, &path).unwrap(), 2);

        let mut fresh = registry_with_entries();
        assert_eq!(recover(&mut fresh, &path).unwrap(), 2);
        std::fs::remove_file(&path).ok();

        assert_eq!(fresh.entries()[0].seqnum, Some(SequenceNumber::new(0xAB)));
        assert_eq!(
            fresh.entries()[0].timestamp.as_deref(),
            Some("2024,01,01,00,00,00")
        );
        assert_eq!(fresh.entries()[1].seqnum, Some(SequenceNumber::new(0x10)));
        assert_eq!(fresh.entries()[1].timestamp, None);
    }

    #[test]
    fn save_skips_untracked_entries() {
        let path = temp_path("untracked");
        let registry = registry_with_entries();

        assert_eq!(save(&registry, &path).unwrap(), 0);
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(contents.is_empty());
    }

    #[test]
    fn recover_missing_file_is_ok() {
        let mut registry = registry_with_entries();
        let applied = recover(&mut registry, temp_path("missing")).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(registry.entries()[0].seqnum, None);
    }

    #[test]
    fn recover_ignores_comments_and_garbage() {
        let path = temp_path("garbage");
        std::fs::write(
            &path,
            "# saved state\n\
             GE WLF 0000AB 2024,01,01,00,00,00\n\
             not a state line\n\
             IU ANMO XYZZYX 2024,01,01,00,00,00\n\
             IU ANMO 000010 31,12,2024\n",
        )
        .unwrap();

        let mut registry = registry_with_entries();
        let applied = recover(&mut registry, &path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(applied, 1);
        assert_eq!(registry.entries()[0].seqnum, Some(SequenceNumber::new(0xAB)));
        assert_eq!(registry.entries()[1].seqnum, None);
    }

    #[test]
    fn recover_ignores_unsubscribed_streams() {
        let path = temp_path("unsubscribed");
        std::fs::write(&path, "NL HGN 000001 -\n").unwrap();

        let mut registry = registry_with_entries();
        let applied = recover(&mut registry, &path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(applied, 0);
    }

    #[test]
    fn save_is_atomic_replace() {
        let path = temp_path("atomic");
        std::fs::write(&path, "stale contents\n").unwrap();

        let mut registry = registry_with_entries();
        registry.update("GE", "WLF", SequenceNumber::new(1), None);
        save(&registry, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(contents, "GE WLF 000001 -\n");
    }
}
