//! Versioned peer records and the merge relation that orders them.

use serde::{Deserialize, Serialize};

/// Metadata a peer advertises about itself.
///
/// The payload travels as one unit: whichever [`PeerRecord`] wins the
/// version race supplies the whole struct.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Human-readable peer name.
    pub name: String,
}

impl PeerInfo {
    /// Info carrying just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Versioned unit of gossip for a single peer, keyed by advertised address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Advertised `host:port` endpoint; primary key across the cluster.
    pub addr: String,
    /// Monotonically non-decreasing counter, bumped on every mutation
    /// at the record's originating peer.
    pub version: u64,
    /// Tombstone flag. A deleted record keeps gossiping so the eviction
    /// reaches peers that still hold a stale live copy.
    pub deleted: bool,
    /// Advertised metadata, last-writer-wins alongside `version`.
    pub info: PeerInfo,
}

impl PeerRecord {
    /// Fresh live record for a newly observed address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            version: 0,
            deleted: false,
            info: PeerInfo::default(),
        }
    }

    /// Whether `self` wins against `held` for the same address.
    ///
    /// Strictly-greater version wins; a tie keeps the held record, which
    /// makes re-merging an already-seen record a no-op.
    pub fn supersedes(&self, held: &PeerRecord) -> bool {
        self.version > held.version
    }

    /// Last-writer-wins merge of two records for the same address.
    ///
    /// Commutative and idempotent for records with distinct versions,
    /// so concurrent exchanges may apply it in any interleaving.
    pub fn merge(held: PeerRecord, incoming: PeerRecord) -> PeerRecord {
        if incoming.supersedes(&held) {
            incoming
        } else {
            held
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(addr: &str, version: u64, name: &str) -> PeerRecord {
        PeerRecord {
            addr: addr.to_string(),
            version,
            deleted: false,
            info: PeerInfo::named(name),
        }
    }

    #[test]
    fn test_higher_version_wins() {
        let old = record("10.0.0.1:7000", 1, "old");
        let new = record("10.0.0.1:7000", 2, "new");

        let merged = PeerRecord::merge(old.clone(), new.clone());
        assert_eq!(merged, new);

        // Order of arguments must not matter when versions differ.
        let merged = PeerRecord::merge(new.clone(), old);
        assert_eq!(merged, new);
    }

    #[test]
    fn test_tie_keeps_held() {
        let held = record("10.0.0.1:7000", 3, "held");
        let incoming = record("10.0.0.1:7000", 3, "incoming");

        let merged = PeerRecord::merge(held.clone(), incoming);
        assert_eq!(merged, held);
    }

    #[test]
    fn test_merge_idempotent() {
        let held = record("10.0.0.1:7000", 2, "a");
        let incoming = record("10.0.0.1:7000", 5, "b");

        let once = PeerRecord::merge(held, incoming.clone());
        let twice = PeerRecord::merge(once.clone(), incoming);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_tombstone_shadows_stale_live() {
        let live = record("10.0.0.1:7000", 1, "alive");
        let mut tombstone = record("10.0.0.1:7000", 2, "alive");
        tombstone.deleted = true;

        let merged = PeerRecord::merge(live, tombstone.clone());
        assert_eq!(merged, tombstone);
    }
}
