//! Shared peer state: the live neighbor set, gossip dedup cache, and the
//! bookkeeping suspicion needs to reach a peer-level quorum before
//! reporting a neighbor dead to the seeds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::identity::NodeId;
use crate::logfile::EventLog;
use crate::wire::Message;

/// How many of the most recent liveness cycles are kept to decide
/// three-strikes.
const LIVENESS_WINDOW: usize = 3;

pub struct Neighbor {
    pub tx: mpsc::Sender<Message>,
    /// Most recent outcomes, newest last. `false` = that cycle's combined
    /// TCP+ICMP probe failed.
    recent_outcomes: Mutex<VecDeque<bool>>,
    last_pong: Mutex<Option<Instant>>,
}

impl Neighbor {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            tx,
            recent_outcomes: Mutex::new(VecDeque::with_capacity(LIVENESS_WINDOW)),
            last_pong: Mutex::new(None),
        }
    }

    pub fn note_pong(&self) {
        *self.last_pong.lock() = Some(Instant::now());
    }

    /// Whether a `PONG` has arrived since `sent_at`.
    pub fn pong_since(&self, sent_at: Instant) -> bool {
        matches!(*self.last_pong.lock(), Some(at) if at >= sent_at)
    }

    /// Records one liveness cycle's outcome and reports whether this
    /// neighbor has now failed three cycles running.
    pub fn record_outcome(&self, alive: bool) -> bool {
        let mut window = self.recent_outcomes.lock();
        if window.len() == LIVENESS_WINDOW {
            window.pop_front();
        }
        window.push_back(alive);
        window.len() == LIVENESS_WINDOW && window.iter().all(|ok| !ok)
    }
}

/// An in-flight peer-quorum suspicion round against one victim.
pub struct SuspectRound {
    pub respondents: Vec<(NodeId, bool)>,
    pub requested_from: usize,
}

impl SuspectRound {
    pub fn new(requested_from: usize) -> Self {
        Self {
            respondents: Vec::new(),
            requested_from,
        }
    }

    /// `⌈respondents/2⌉ + 1`, never below [`crate::config::MIN_SUSPECT_RESPONDENTS`].
    pub fn dead_votes(&self) -> usize {
        self.respondents.iter().filter(|(_, alive)| !alive).count()
    }
}

pub struct PeerState {
    pub self_id: NodeId,
    pub all_seeds: Vec<NodeId>,
    pub neighbors: DashMap<NodeId, Arc<Neighbor>>,
    pub suspect_table: DashMap<NodeId, SuspectRound>,
    pub purged: DashMap<NodeId, ()>,
    pub ml: DashMap<[u8; 32], ()>,
    msg_counter: AtomicU8,
    pub event_log: EventLog,
}

impl PeerState {
    pub fn new(self_id: NodeId, all_seeds: Vec<NodeId>, event_log: EventLog) -> Self {
        Self {
            self_id,
            all_seeds,
            neighbors: DashMap::new(),
            suspect_table: DashMap::new(),
            purged: DashMap::new(),
            ml: DashMap::new(),
            msg_counter: AtomicU8::new(0),
            event_log,
        }
    }

    /// Returns the next originated-message sequence number, or `None` once
    /// [`crate::config::MAX_ORIGINATED_MESSAGES`] has been reached.
    pub fn next_msg_seq(&self, max: u8) -> Option<u8> {
        let seq = self.msg_counter.fetch_add(1, Ordering::SeqCst);
        if seq < max {
            Some(seq)
        } else {
            self.msg_counter.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }

    pub fn is_purged(&self, id: &NodeId) -> bool {
        self.purged.contains_key(id)
    }

    pub fn msg_counter(&self) -> u8 {
        self.msg_counter.load(Ordering::SeqCst)
    }

    pub fn neighbor_ids(&self) -> Vec<NodeId> {
        self.neighbors.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_trip_the_strike() {
        let (tx, _rx) = mpsc::channel(1);
        let n = Neighbor::new(tx);
        assert!(!n.record_outcome(false));
        assert!(!n.record_outcome(false));
        assert!(n.record_outcome(false));
    }

    #[test]
    fn a_success_resets_the_run() {
        let (tx, _rx) = mpsc::channel(1);
        let n = Neighbor::new(tx);
        assert!(!n.record_outcome(false));
        assert!(!n.record_outcome(false));
        assert!(!n.record_outcome(true));
        assert!(!n.record_outcome(false));
    }

    #[test]
    fn msg_seq_stops_at_the_max() {
        let log = EventLog::open(
            tempfile::tempdir().unwrap().path(),
            crate::identity::NodeKind::Peer,
            7000,
        )
        .unwrap();
        let state = PeerState::new(NodeId::new("h", 7000), vec![], log);
        for expected in 0..3 {
            assert_eq!(state.next_msg_seq(3), Some(expected));
        }
        assert_eq!(state.next_msg_seq(3), None);
    }
}
