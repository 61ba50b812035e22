//! The ordered table of stream subscriptions.
//!
//! Each entry tracks the sequence number and start time of the last record
//! delivered for it; reconnect negotiation resumes from exactly this state.

use std::path::Path;

use slink_protocol::SequenceNumber;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::glob::glob_match;

/// Network code marking the single uni-station entry.
pub const UNI_NETWORK: &str = "XX";
/// Station code marking the single uni-station entry.
pub const UNI_STATION: &str = "UNI";

/// One stream subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    /// Network code, possibly wildcarded (e.g. `"GE"`, `"G?"`).
    pub net: String,
    /// Station code, possibly wildcarded (e.g. `"WLF"`, `"*"`).
    pub sta: String,
    /// Space-separated SeedLink selectors (e.g. `"BH?.D"`), if any.
    pub selectors: Option<String>,
    /// Sequence of the last delivered record; `None` means "start at next".
    pub seqnum: Option<SequenceNumber>,
    /// Start time of the last delivered record, `YYYY,MM,DD,hh,mm,ss`.
    pub timestamp: Option<String>,
}

impl StreamEntry {
    /// True for the placeholder entry of a uni-station session.
    pub fn is_uni(&self) -> bool {
        self.net == UNI_NETWORK && self.sta == UNI_STATION
    }
}

/// The ordered list of subscriptions for one session.
///
/// Uni-station and multi-station modes are mutually exclusive: the registry
/// holds either exactly one `XX`/`UNI` entry or any number of real ones.
#[derive(Clone, Debug, Default)]
pub struct StreamRegistry {
    entries: Vec<StreamEntry>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// True when the registry holds the single uni-station entry.
    pub fn is_uni(&self) -> bool {
        matches!(self.entries.as_slice(), [entry] if entry.is_uni())
    }

    /// Append a multi-station subscription.
    ///
    /// No duplicate checking is done; the server resolves overlaps.
    pub fn add_stream(
        &mut self,
        net: &str,
        sta: &str,
        selectors: Option<&str>,
        seqnum: Option<SequenceNumber>,
        timestamp: Option<&str>,
    ) -> Result<()> {
        if self.is_uni() {
            return Err(ClientError::Config(
                "uni-station mode already configured".to_owned(),
            ));
        }

        self.entries.push(StreamEntry {
            net: net.to_owned(),
            sta: sta.to_owned(),
            selectors: selectors.map(|s| s.to_owned()),
            seqnum,
            timestamp: timestamp.map(|t| t.to_owned()),
        });

        Ok(())
    }

    /// Configure the single uni-station entry, overwriting a previous one.
    pub fn set_uni_params(
        &mut self,
        selectors: Option<&str>,
        seqnum: Option<SequenceNumber>,
        timestamp: Option<&str>,
    ) -> Result<()> {
        if !self.entries.is_empty() && !self.is_uni() {
            return Err(ClientError::Config(
                "multi-station mode already configured".to_owned(),
            ));
        }

        let entry = StreamEntry {
            net: UNI_NETWORK.to_owned(),
            sta: UNI_STATION.to_owned(),
            selectors: selectors.map(|s| s.to_owned()),
            seqnum,
            timestamp: timestamp.map(|t| t.to_owned()),
        };

        self.entries.clear();
        self.entries.push(entry);

        Ok(())
    }

    /// Record a delivered packet against the table.
    ///
    /// Updates the uni entry, or every entry whose network and station
    /// patterns glob-match the record's codes. Returns whether any entry
    /// matched; wildcarded subscriptions advance in lock-step so reconnect
    /// resumes from the last delivered record.
    pub fn update(
        &mut self,
        net: &str,
        sta: &str,
        seqnum: SequenceNumber,
        timestamp: Option<&str>,
    ) -> bool {
        if self.is_uni() {
            let entry = &mut self.entries[0];
            entry.seqnum = Some(seqnum);
            entry.timestamp = timestamp.map(|t| t.to_owned());
            return true;
        }

        let mut updates = 0;
        for entry in &mut self.entries {
            if glob_match(net, &entry.net) && glob_match(sta, &entry.sta) {
                entry.seqnum = Some(seqnum);
                entry.timestamp = timestamp.map(|t| t.to_owned());
                updates += 1;
            }
        }

        if updates == 0 {
            debug!(net, sta, "received data for an unsubscribed stream");
        }

        updates > 0
    }

    /// Apply recovered state to an entry matching exactly on net and station.
    pub(crate) fn apply_state(
        &mut self,
        net: &str,
        sta: &str,
        seqnum: SequenceNumber,
        timestamp: Option<&str>,
    ) -> bool {
        let mut applied = false;
        for entry in &mut self.entries {
            if entry.net == net && entry.sta == sta {
                entry.seqnum = Some(seqnum);
                entry.timestamp = timestamp.map(|t| t.to_owned());
                applied = true;
            }
        }
        applied
    }

    /// Add subscriptions from a comma-separated stream list such as
    /// `"GE_WLF:BH?.D,IU_ANMO"`. Items without selectors fall back to
    /// `default_selectors`. Returns the number of entries added.
    pub fn parse_streamlist(
        &mut self,
        streamlist: &str,
        default_selectors: Option<&str>,
    ) -> Result<usize> {
        let mut added = 0;

        for item in streamlist.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }

            let (stream, selectors) = match item.split_once(':') {
                Some((stream, selectors)) => (stream, Some(selectors)),
                None => (item, default_selectors),
            };

            let Some((net, sta)) = stream.split_once('_') else {
                return Err(ClientError::Config(format!(
                    "stream {stream:?} is not in NET_STA form"
                )));
            };
            if net.is_empty() || sta.is_empty() {
                return Err(ClientError::Config(format!(
                    "stream {stream:?} is not in NET_STA form"
                )));
            }

            self.add_stream(net, sta, selectors, None, None)?;
            added += 1;
        }

        Ok(added)
    }

    /// Add subscriptions from a stream-list file with one `NET STA
    /// [selectors]` per line; `#` lines are comments. Returns the number of
    /// entries added.
    pub fn read_streamlist(
        &mut self,
        path: impl AsRef<Path>,
        default_selectors: Option<&str>,
    ) -> Result<usize> {
        let contents = std::fs::read_to_string(path)?;
        let mut added = 0;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(net), Some(sta)) = (fields.next(), fields.next()) else {
                return Err(ClientError::Config(format!(
                    "stream-list line {line:?} needs NET and STA"
                )));
            };

            let selectors: Vec<&str> = fields.collect();
            let selectors = if selectors.is_empty() {
                default_selectors.map(|s| s.to_owned())
            } else {
                Some(selectors.join(" "))
            };

            self.add_stream(net, sta, selectors.as_deref(), None, None)?;
            added += 1;
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_query() {
        let mut registry = StreamRegistry::new();
        registry
            .add_stream("GE", "WLF", Some("BH?.D"), None, None)
            .unwrap();
        registry.add_stream("IU", "ANMO", None, None, None).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_uni());
        assert_eq!(registry.entries()[0].net, "GE");
        assert_eq!(registry.entries()[0].selectors.as_deref(), Some("BH?.D"));
    }

    #[test]
    fn uni_excludes_multi() {
        let mut registry = StreamRegistry::new();
        registry.set_uni_params(Some("BHZ"), None, None).unwrap();
        assert!(registry.is_uni());

        let err = registry.add_stream("GE", "WLF", None, None, None).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn multi_excludes_uni() {
        let mut registry = StreamRegistry::new();
        registry.add_stream("GE", "WLF", None, None, None).unwrap();

        let err = registry.set_uni_params(None, None, None).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn uni_params_overwrite() {
        let mut registry = StreamRegistry::new();
        registry.set_uni_params(Some("BHZ"), None, None).unwrap();
        registry
            .set_uni_params(Some("LHZ"), Some(SequenceNumber::new(5)), None)
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries()[0].selectors.as_deref(), Some("LHZ"));
        assert_eq!(registry.entries()[0].seqnum, Some(SequenceNumber::new(5)));
    }

    #[test]
    fn update_exact_match() {
        let mut registry = StreamRegistry::new();
        registry.add_stream("GE", "WLF", None, None, None).unwrap();

        let matched = registry.update(
            "GE",
            "WLF",
            SequenceNumber::new(0xAB),
            Some("2024,01,01,00,00,00"),
        );
        assert!(matched);
        assert_eq!(registry.entries()[0].seqnum, Some(SequenceNumber::new(0xAB)));
        assert_eq!(
            registry.entries()[0].timestamp.as_deref(),
            Some("2024,01,01,00,00,00")
        );
    }

    #[test]
    fn update_all_wildcard_matches() {
        let mut registry = StreamRegistry::new();
        registry.add_stream("GE", "*", None, None, None).unwrap();
        registry.add_stream("G?", "WLF", None, None, None).unwrap();
        registry.add_stream("IU", "ANMO", None, None, None).unwrap();

        let matched = registry.update("GE", "WLF", SequenceNumber::new(7), None);
        assert!(matched);
        assert_eq!(registry.entries()[0].seqnum, Some(SequenceNumber::new(7)));
        assert_eq!(registry.entries()[1].seqnum, Some(SequenceNumber::new(7)));
        assert_eq!(registry.entries()[2].seqnum, None);
    }

    #[test]
    fn update_no_match() {
        let mut registry = StreamRegistry::new();
        registry.add_stream("IU", "ANMO", None, None, None).unwrap();

        let matched = registry.update("GE", "WLF", SequenceNumber::new(1), None);
        assert!(!matched);
        assert_eq!(registry.entries()[0].seqnum, None);
    }

    #[test]
    fn update_uni_entry() {
        let mut registry = StreamRegistry::new();
        registry.set_uni_params(None, None, None).unwrap();

        // The uni entry matches whatever the server sends
        let matched = registry.update(
            "GE",
            "WLF",
            SequenceNumber::new(3),
            Some("2024,06,01,12,00,00"),
        );
        assert!(matched);
        assert_eq!(registry.entries()[0].seqnum, Some(SequenceNumber::new(3)));
        assert_eq!(
            registry.entries()[0].timestamp.as_deref(),
            Some("2024,06,01,12,00,00")
        );
    }

    #[test]
    fn parse_streamlist_items() {
        let mut registry = StreamRegistry::new();
        let added = registry
            .parse_streamlist("GE_WLF:BH?.D,IU_ANMO, GE_STU", Some("LH?"))
            .unwrap();
        assert_eq!(added, 3);
        assert_eq!(registry.entries()[0].selectors.as_deref(), Some("BH?.D"));
        assert_eq!(registry.entries()[1].selectors.as_deref(), Some("LH?"));
        assert_eq!(registry.entries()[2].net, "GE");
        assert_eq!(registry.entries()[2].sta, "STU");
    }

    #[test]
    fn parse_streamlist_rejects_bad_item() {
        let mut registry = StreamRegistry::new();
        assert!(registry.parse_streamlist("GEWLF", None).is_err());
        assert!(registry.parse_streamlist("_WLF", None).is_err());
    }

    #[test]
    fn read_streamlist_file() {
        let path = std::env::temp_dir().join(format!(
            "slink-streamlist-{}-{:?}.txt",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, "# stations\nGE WLF BH?.D LH?.D\nIU ANMO\n\n").unwrap();

        let mut registry = StreamRegistry::new();
        let added = registry.read_streamlist(&path, Some("BHZ")).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(added, 2);
        assert_eq!(
            registry.entries()[0].selectors.as_deref(),
            Some("BH?.D LH?.D")
        );
        assert_eq!(registry.entries()[1].selectors.as_deref(), Some("BHZ"));
    }
}
