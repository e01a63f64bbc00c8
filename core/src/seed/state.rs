//! Shared seed state: the committed peer list, and the in-flight
//! register/death proposals racing to reach quorum.

use std::collections::BTreeSet;
use std::collections::HashSet;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::identity::NodeId;
use crate::logfile::EventLog;
use crate::wire::Message;

/// A register or death proposal in flight, tallying votes as they arrive.
pub struct Proposal {
    /// Seeds that have voted yes so far (the proposer counts itself in
    /// immediately, per the Open Question decision in DESIGN.md).
    pub yes_votes: HashSet<NodeId>,
    pub no_votes: HashSet<NodeId>,
    pub opened_at: Instant,
    /// For death proposals only: the peers that reported the victim dead,
    /// kept so `DEAD_REPORT` duplicates from the same reporter don't count
    /// twice toward [`crate::config::MIN_DEATH_REPORTS`].
    pub reporters: HashSet<NodeId>,
}

impl Proposal {
    pub fn opened_by_self() -> Self {
        Self {
            yes_votes: HashSet::new(),
            no_votes: HashSet::new(),
            opened_at: Instant::now(),
            reporters: HashSet::new(),
        }
    }

    pub fn is_expired(&self, timeout: std::time::Duration) -> bool {
        self.opened_at.elapsed() >= timeout
    }
}

/// Outbound channel to a connected peer session, used to deliver the
/// eventual `REGISTER_ACK`/`REGISTER_NACK` once a register proposal
/// resolves asynchronously relative to the connection that opened it.
pub type PeerReplyTx = mpsc::UnboundedSender<Message>;

pub struct SeedState {
    pub self_id: NodeId,
    /// Canonical seed ordering as read from the configuration file.
    pub all_seeds: Vec<NodeId>,
    pub pl: RwLock<BTreeSet<NodeId>>,
    pub pending_registers: DashMap<NodeId, Proposal>,
    pub pending_deaths: DashMap<NodeId, Proposal>,
    /// Where to deliver the outcome of a register proposal this seed
    /// opened, keyed by the candidate peer.
    pub register_waiters: DashMap<NodeId, PeerReplyTx>,
    /// Every reporter connection currently waiting on `DEAD_CONFIRMED` for
    /// a given victim. Unlike registration, several peers can report the
    /// same victim concurrently, so this fans out rather than holding one
    /// sender.
    pub death_waiters: DashMap<NodeId, Vec<PeerReplyTx>>,
    /// Durable reply channel for every peer this seed has committed a
    /// `REGISTER` for, kept open past the ack so later `DEAD_CONFIRMED`
    /// pushes have somewhere to go. Entries are removed once the peer's
    /// connection closes.
    pub peer_links: DashMap<NodeId, PeerReplyTx>,
    pub event_log: EventLog,
}

impl SeedState {
    pub fn new(self_id: NodeId, all_seeds: Vec<NodeId>, event_log: EventLog) -> Self {
        Self {
            self_id,
            all_seeds,
            pl: RwLock::new(BTreeSet::new()),
            pending_registers: DashMap::new(),
            pending_deaths: DashMap::new(),
            register_waiters: DashMap::new(),
            death_waiters: DashMap::new(),
            peer_links: DashMap::new(),
            event_log,
        }
    }

    /// Number of peers currently registered (and reachable for pushes).
    pub fn peer_link_count(&self) -> usize {
        self.peer_links.len()
    }

    /// `⌊n/2⌋ + 1` over the full seed set, including self.
    pub fn quorum_threshold(&self) -> usize {
        self.all_seeds.len() / 2 + 1
    }

    pub fn snapshot_pl(&self) -> Vec<NodeId> {
        self.pl.read().iter().cloned().collect()
    }

    pub fn other_seeds(&self) -> Vec<NodeId> {
        self.all_seeds
            .iter()
            .filter(|s| **s != self.self_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_threshold_rounds_down_then_adds_one() {
        let seeds = vec![
            NodeId::new("a", 1),
            NodeId::new("b", 2),
            NodeId::new("c", 3),
        ];
        let log = EventLog::open(
            tempfile::tempdir().unwrap().path(),
            crate::identity::NodeKind::Seed,
            1,
        )
        .unwrap();
        let state = SeedState::new(NodeId::new("a", 1), seeds, log);
        assert_eq!(state.quorum_threshold(), 2);
    }

    #[test]
    fn quorum_threshold_for_even_seed_count() {
        let seeds = vec![
            NodeId::new("a", 1),
            NodeId::new("b", 2),
            NodeId::new("c", 3),
            NodeId::new("d", 4),
        ];
        let log = EventLog::open(
            tempfile::tempdir().unwrap().path(),
            crate::identity::NodeKind::Seed,
            1,
        )
        .unwrap();
        let state = SeedState::new(NodeId::new("a", 1), seeds, log);
        assert_eq!(state.quorum_threshold(), 3);
    }
}
