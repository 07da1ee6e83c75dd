//! Membership table: the single synchronization point of a peer.
//!
//! Holds every record this peer has ever learned, the open outbound
//! connections, and the round-robin partner ring. All three collections
//! mutate under one writer lock so no reader observes them out of sync.
//! Network I/O never happens under the lock; callers dial first and
//! register after.

use hearsay_core::{PeerInfo, PeerRecord};
use hearsay_net::Connection;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Thread-safe membership state for one peer.
pub struct MembershipTable {
    self_addr: String,
    state: RwLock<TableState>,
}

struct TableState {
    /// Every record ever learned, tombstones included. Always contains
    /// the self record.
    records: HashMap<String, PeerRecord>,
    /// Open outbound connections. Never contains `self_addr`; a key here
    /// was live when it was registered.
    connections: HashMap<String, Arc<Connection>>,
    /// Round-robin rotation over the keys of `connections`.
    partner_order: VecDeque<String>,
}

impl MembershipTable {
    /// Table for a peer advertising `self_addr`.
    pub fn new(self_addr: impl Into<String>) -> Self {
        let self_addr = self_addr.into();
        let mut records = HashMap::new();
        records.insert(self_addr.clone(), PeerRecord::new(self_addr.clone()));

        Self {
            self_addr,
            state: RwLock::new(TableState {
                records,
                connections: HashMap::new(),
                partner_order: VecDeque::new(),
            }),
        }
    }

    /// This peer's advertised address.
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Register a validated connection for `addr`, making it eligible on
    /// the very next tick. Returns `false` without touching the table if
    /// the address is our own, already connected, or tombstoned; the
    /// caller owns (and closes) the redundant connection in that case.
    pub fn add_seed(&self, addr: &str, conn: Arc<Connection>) -> bool {
        if addr == self.self_addr {
            return false;
        }

        let mut state = self.state.write();
        if state.connections.contains_key(addr) {
            return false;
        }
        if state.records.get(addr).is_some_and(|r| r.deleted) {
            return false;
        }

        state
            .records
            .entry(addr.to_string())
            .or_insert_with(|| PeerRecord::new(addr));
        state.connections.insert(addr.to_string(), conn);
        state.partner_order.push_front(addr.to_string());
        true
    }

    /// Evict a partner: close and drop its connection and tombstone its
    /// record. The version bump makes the tombstone outrank any stale
    /// live copy still circulating.
    pub fn delete_seed(&self, addr: &str) {
        let mut state = self.state.write();
        if let Some(conn) = state.connections.remove(addr) {
            conn.close();
        }
        state.partner_order.retain(|a| a != addr);
        if let Some(record) = state.records.get_mut(addr) {
            record.deleted = true;
            record.version += 1;
        }
    }

    /// Replace the advertised self metadata and bump the self version.
    pub fn update_self_info(&self, info: PeerInfo) {
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(&self.self_addr)
            .expect("self record always present");
        record.info = info;
        record.version += 1;
    }

    /// Merge one remote record. Returns whether the address was already
    /// known, which the caller uses to detect newly learned peers.
    ///
    /// A record for our own address never replaces the local one: we are
    /// authoritative for it. If the incoming copy outranks ours (a remote
    /// tombstoned us after a failed send), we keep the live payload and
    /// re-version above the incoming record so the refutation wins
    /// cluster-wide.
    pub fn upsert(&self, incoming: PeerRecord) -> bool {
        let mut state = self.state.write();

        if incoming.addr == self.self_addr {
            let record = state
                .records
                .get_mut(&self.self_addr)
                .expect("self record always present");
            if incoming.supersedes(record) {
                record.version = incoming.version + 1;
            }
            return true;
        }

        match state.records.get_mut(&incoming.addr) {
            Some(held) => {
                if incoming.supersedes(held) {
                    *held = incoming;
                }
                true
            }
            None => {
                state.records.insert(incoming.addr.clone(), incoming);
                false
            }
        }
    }

    /// Live membership view for API consumers. Tombstones are hidden;
    /// self is always present.
    pub fn members(&self) -> HashMap<String, PeerInfo> {
        let state = self.state.read();
        state
            .records
            .values()
            .filter(|record| !record.deleted)
            .map(|record| (record.addr.clone(), record.info.clone()))
            .collect()
    }

    /// Full record set for the wire, tombstones included so deletes keep
    /// propagating.
    pub fn wire_snapshot(&self) -> Vec<PeerRecord> {
        let state = self.state.read();
        state.records.values().cloned().collect()
    }

    /// Rotate the partner ring: the front partner moves to the back and
    /// is returned. Entries no longer backed by a connection are
    /// discarded on the way.
    pub fn pick_partner(&self) -> Option<(String, Arc<Connection>)> {
        let mut state = self.state.write();
        while let Some(addr) = state.partner_order.pop_front() {
            if let Some(conn) = state.connections.get(&addr).cloned() {
                state.partner_order.push_back(addr.clone());
                return Some((addr, conn));
            }
        }
        None
    }

    /// Close and drop every outbound connection. Records survive.
    pub fn close_all(&self) {
        let mut state = self.state.write();
        for conn in state.connections.values() {
            conn.close();
        }
        state.connections.clear();
        state.partner_order.clear();
    }

    /// Table counters.
    pub fn stats(&self) -> MembershipStats {
        let state = self.state.read();
        MembershipStats {
            records: state.records.len(),
            live: state.records.values().filter(|r| !r.deleted).count(),
            connections: state.connections.len(),
        }
    }
}

/// Membership statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipStats {
    /// All records, tombstones included
    pub records: usize,
    /// Non-tombstoned records
    pub live: usize,
    /// Open outbound connections
    pub connections: usize,
}
