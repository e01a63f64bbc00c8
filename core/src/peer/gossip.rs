//! Gossip origination and dissemination.
//!
//! Every payload is a plain string, not nested JSON: `"<ts>:<host>:<seq>"`.
//! A SHA-256 digest of that string is the dedup key — the first peer to
//! see a given payload forwards it to every neighbor but the one it came
//! from; everyone after that drops it silently.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::config::MAX_ORIGINATED_MESSAGES;
use crate::identity::NodeId;
use crate::wire::{Gossip, Message};

use super::state::PeerState;

fn digest_of(payload: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.finalize().into()
}

/// Builds this cycle's payload: `ts` is seconds-since-epoch at microsecond
/// resolution.
fn build_payload(self_id: &NodeId, seq: u8) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let ts = now.as_secs() as f64 + now.subsec_micros() as f64 / 1_000_000.0;
    format!("{ts:.6}:{}:{seq}", self_id.host)
}

/// Originates one gossip message, if this peer hasn't already hit
/// [`MAX_ORIGINATED_MESSAGES`]. Returns `false` once exhausted, so the
/// caller's ticker can stop scheduling further attempts.
pub async fn originate(state: &Arc<PeerState>) -> bool {
    let seq = match state.next_msg_seq(MAX_ORIGINATED_MESSAGES) {
        Some(seq) => seq,
        None => return false,
    };

    let payload = build_payload(&state.self_id, seq);
    let digest = digest_of(&payload);
    state.ml.insert(digest, ());

    broadcast(state, None, payload).await;
    true
}

/// Handles an inbound `GOSSIP{payload}` from neighbor `from`: dedups
/// against `ML`, logs first-time receipt, and forwards to every neighbor
/// except the sender.
pub async fn handle_gossip(state: &Arc<PeerState>, from: &NodeId, payload: String) {
    let digest = digest_of(&payload);
    if state.ml.contains_key(&digest) {
        return;
    }
    state.ml.insert(digest, ());
    state.event_log.gossip_received_first_time(from, &payload);

    broadcast(state, Some(from), payload).await;
}

async fn broadcast(state: &Arc<PeerState>, except: Option<&NodeId>, payload: String) {
    for entry in state.neighbors.iter() {
        let neighbor_id = entry.key();
        if Some(neighbor_id) == except {
            continue;
        }
        let message = Message::Gossip(Gossip {
            payload: payload.clone(),
        });
        if entry.value().tx.try_send(message).is_err() {
            tracing::debug!(peer = %neighbor_id, "gossip send queue full, dropping for this neighbor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::EventLog;

    fn state() -> Arc<PeerState> {
        let log = EventLog::open(
            tempfile::tempdir().unwrap().path(),
            crate::identity::NodeKind::Peer,
            7000,
        )
        .unwrap();
        Arc::new(PeerState::new(NodeId::new("10.0.0.1", 7000), vec![], log))
    }

    #[tokio::test]
    async fn second_copy_of_the_same_payload_is_dropped() {
        let state = state();
        let from = NodeId::new("10.0.0.2", 7001);
        handle_gossip(&state, &from, "1.0:10.0.0.2:0".to_string()).await;
        assert_eq!(state.ml.len(), 1);
        handle_gossip(&state, &from, "1.0:10.0.0.2:0".to_string()).await;
        assert_eq!(state.ml.len(), 1);
    }

    #[tokio::test]
    async fn originate_stops_after_the_maximum() {
        let state = state();
        for _ in 0..MAX_ORIGINATED_MESSAGES {
            assert!(originate(&state).await);
        }
        assert!(!originate(&state).await);
    }

    #[test]
    fn payload_shape_matches_ts_host_seq() {
        let payload = build_payload(&NodeId::new("10.0.0.1", 7000), 3);
        let parts: Vec<_> = payload.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], "10.0.0.1");
        assert_eq!(parts[2], "3");
        assert!(parts[0].parse::<f64>().is_ok());
    }
}
