//! Diagnostic NDJSON status lines, one object per line, appended to each
//! node's own event log. Purely an operator-facing tail target — nothing
//! in the protocol ever reads these back.

use chrono::Utc;
use serde::Serialize;

use crate::peer::PeerState;
use crate::seed::SeedState;

#[derive(Serialize)]
struct SeedStatus {
    ts: String,
    node: String,
    pl_size: usize,
    pending_registers: usize,
    pending_deaths: usize,
    registered_peers: usize,
}

/// Snapshots a seed's membership bookkeeping and appends it to the event
/// log as one NDJSON line.
pub fn emit_seed_snapshot(state: &SeedState) {
    let snapshot = SeedStatus {
        ts: Utc::now().to_rfc3339(),
        node: state.self_id.to_string(),
        pl_size: state.pl.read().len(),
        pending_registers: state.pending_registers.len(),
        pending_deaths: state.pending_deaths.len(),
        registered_peers: state.peer_link_count(),
    };
    match serde_json::to_string(&snapshot) {
        Ok(line) => state.event_log.raw_line(&line),
        Err(e) => tracing::warn!(error = %e, "failed to serialize seed status snapshot"),
    }
}

#[derive(Serialize)]
struct PeerStatus {
    ts: String,
    node: String,
    neighbors: usize,
    ml_size: usize,
    msg_counter: u8,
}

/// Snapshots a peer's overlay/gossip bookkeeping and appends it to the
/// event log as one NDJSON line.
pub fn emit_peer_snapshot(state: &PeerState) {
    let snapshot = PeerStatus {
        ts: Utc::now().to_rfc3339(),
        node: state.self_id.to_string(),
        neighbors: state.neighbors.len(),
        ml_size: state.ml.len(),
        msg_counter: state.msg_counter(),
    };
    match serde_json::to_string(&snapshot) {
        Ok(line) => state.event_log.raw_line(&line),
        Err(e) => tracing::warn!(error = %e, "failed to serialize peer status snapshot"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{NodeId, NodeKind};
    use crate::logfile::EventLog;

    #[test]
    fn seed_snapshot_is_one_valid_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path(), NodeKind::Seed, 6100).unwrap();
        let state = SeedState::new(NodeId::new("10.0.0.1", 6100), vec![NodeId::new("10.0.0.1", 6100)], log);

        emit_seed_snapshot(&state);

        let contents = std::fs::read_to_string(dir.path().join("outputfile_seed_6100.txt")).unwrap();
        let line = contents.lines().next().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(parsed["pl_size"], 0);
        assert_eq!(parsed["node"], "10.0.0.1:6100");
    }

    #[test]
    fn peer_snapshot_is_one_valid_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path(), NodeKind::Peer, 7100).unwrap();
        let state = PeerState::new(NodeId::new("10.0.0.1", 7100), vec![], log);

        emit_peer_snapshot(&state);

        let contents = std::fs::read_to_string(dir.path().join("outputfile_peer_7100.txt")).unwrap();
        let line = contents.lines().next().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(parsed["neighbors"], 0);
        assert_eq!(parsed["node"], "10.0.0.1:7100");
    }
}
