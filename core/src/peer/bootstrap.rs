//! Seed registration and preferential-attachment neighbor selection.
//!
//! This runs once at startup (and again, against a fresh union query,
//! whenever the neighbor count drops below [`crate::config::MIN_NEIGHBORS`]
//! — see `overlay.rs`).

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Pareto};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::{PARETO_ALPHA, PARETO_X_MIN};
use crate::identity::NodeId;
use crate::net::{dial_with_retry, NetError};
use crate::wire::{read_message, write_message, FrameError, Message, PlRequest, RegisterRequest};

use super::overlay;
use super::state::PeerState;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("registration was rejected by a seed")]
    Rejected,

    #[error("no seed in the configuration could be reached")]
    AllSeedsUnreachable,

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("seed closed the connection before responding")]
    SeedClosedEarly,
}

enum RegisterOutcome {
    Ack(Vec<NodeId>),
    Nack,
}

async fn register_with_seed(
    state: Arc<PeerState>,
    seed: NodeId,
) -> Result<RegisterOutcome, BootstrapError> {
    let mut stream = dial_with_retry(&seed).await?;
    write_message(
        &mut stream,
        &Message::RegisterRequest(RegisterRequest {
            peer_id: state.self_id.clone(),
        }),
    )
    .await?;

    loop {
        match read_message(&mut stream).await? {
            Some(Message::RegisterAck(ack)) => {
                tokio::spawn(listen_for_seed_pushes(state, stream));
                return Ok(RegisterOutcome::Ack(ack.pl));
            }
            Some(Message::RegisterNack(_)) => return Ok(RegisterOutcome::Nack),
            Some(_) => continue,
            None => return Err(BootstrapError::SeedClosedEarly),
        }
    }
}

/// Stays on the connection a seed acked our registration over, reacting to
/// whatever it pushes for as long as the seed keeps the link open.
/// Currently the only thing a seed pushes is `DEAD_CONFIRMED` for a victim
/// this peer may be holding as a neighbor.
async fn listen_for_seed_pushes(state: Arc<PeerState>, mut stream: TcpStream) {
    loop {
        match read_message(&mut stream).await {
            Ok(Some(Message::DeadConfirmed(m))) => {
                if state.neighbors.contains_key(&m.victim) && !state.is_purged(&m.victim) {
                    overlay::purge(&state, m.victim).await;
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return,
        }
    }
}

/// Registers with every configured seed concurrently. The first genuine
/// response — ack or nack — decides the outcome; seeds that are merely
/// unreachable don't count unless every single one is. Every seed that
/// acks keeps its connection open in the background for `DEAD_CONFIRMED`
/// pushes, regardless of which seed's response actually settles this call.
pub async fn register_with_seeds(state: &Arc<PeerState>) -> Result<(), BootstrapError> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(state.all_seeds.len().max(1));
    for seed in &state.all_seeds {
        let seed = seed.clone();
        let state = state.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = register_with_seed(state, seed).await;
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    let total = state.all_seeds.len();
    let mut unreachable = 0usize;
    while let Some(result) = rx.recv().await {
        match result {
            Ok(RegisterOutcome::Ack(_)) => return Ok(()),
            Ok(RegisterOutcome::Nack) => return Err(BootstrapError::Rejected),
            Err(_) => {
                unreachable += 1;
                if unreachable >= total {
                    return Err(BootstrapError::AllSeedsUnreachable);
                }
            }
        }
    }
    Err(BootstrapError::AllSeedsUnreachable)
}

async fn query_pl(seed: NodeId) -> Result<Vec<NodeId>, BootstrapError> {
    let mut stream = dial_with_retry(&seed).await?;
    write_message(&mut stream, &Message::PlRequest(PlRequest {})).await?;
    loop {
        match read_message(&mut stream).await? {
            Some(Message::PlResponse(r)) => return Ok(r.pl),
            Some(_) => continue,
            None => return Err(BootstrapError::SeedClosedEarly),
        }
    }
}

/// Queries every seed's peer list and folds the results into the union
/// peer list `U`, where each peer's count is how many seed lists it
/// appeared in — a proxy for node degree.
pub async fn union_peer_list(state: &PeerState) -> HashMap<NodeId, usize> {
    let mut handles = Vec::with_capacity(state.all_seeds.len());
    for seed in &state.all_seeds {
        handles.push(tokio::spawn(query_pl(seed.clone())));
    }

    let mut counts = HashMap::new();
    for handle in handles {
        if let Ok(Ok(pl)) = handle.await {
            for id in pl {
                if id != state.self_id {
                    *counts.entry(id).or_insert(0usize) += 1;
                }
            }
        }
    }
    counts
}

fn seeded_rng(self_id: &NodeId) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(self_id.socket_addr_string().as_bytes());
    let digest = hasher.finalize();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    ChaCha8Rng::seed_from_u64(u64::from_be_bytes(seed_bytes))
}

/// Draws `k = clamp(⌈Pareto(α, x_min)⌉, 1, |U|)` distinct neighbors from
/// `U`, sampled without replacement with probability proportional to
/// `1 + degree_estimate`.
pub fn sample_neighbors(self_id: &NodeId, union: &HashMap<NodeId, usize>) -> Vec<NodeId> {
    if union.is_empty() {
        return Vec::new();
    }

    let mut rng = seeded_rng(self_id);
    let candidates: Vec<&NodeId> = union.keys().collect();

    let pareto = Pareto::new(PARETO_X_MIN, PARETO_ALPHA).expect("valid Pareto parameters");
    let k = (pareto.sample(&mut rng).ceil() as usize).clamp(1, candidates.len());

    candidates
        .choose_multiple_weighted(&mut rng, k, |id| 1.0 + union[*id] as f64)
        .expect("weights are always positive")
        .map(|id| (*id).clone())
        .collect()
}

/// Dials `candidate` and completes the `HELLO` handshake, returning the
/// connected stream for the caller to hand to the overlay manager.
pub async fn dial_neighbor(candidate: &NodeId, self_id: &NodeId) -> Result<TcpStream, BootstrapError> {
    let mut stream = dial_with_retry(candidate).await?;
    write_message(
        &mut stream,
        &Message::Hello(crate::wire::Hello {
            self_id: self_id.clone(),
        }),
    )
    .await?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_is_deterministic_for_a_fixed_identity_and_union() {
        let self_id = NodeId::new("10.0.0.1", 6000);
        let mut union = HashMap::new();
        union.insert(NodeId::new("a", 1), 3);
        union.insert(NodeId::new("b", 2), 1);
        union.insert(NodeId::new("c", 3), 1);

        let first = sample_neighbors(&self_id, &union);
        let second = sample_neighbors(&self_id, &union);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn never_selects_more_than_the_union_size() {
        let self_id = NodeId::new("10.0.0.1", 6000);
        let mut union = HashMap::new();
        union.insert(NodeId::new("only-one", 1), 5);

        let chosen = sample_neighbors(&self_id, &union);
        assert_eq!(chosen.len(), 1);
    }

    #[test]
    fn empty_union_selects_nothing() {
        let self_id = NodeId::new("10.0.0.1", 6000);
        let chosen = sample_neighbors(&self_id, &HashMap::new());
        assert!(chosen.is_empty());
    }

    #[test]
    fn different_identities_can_sample_differently() {
        let mut union = HashMap::new();
        for i in 0..20u16 {
            union.insert(NodeId::new("host", 1000 + i), 1);
        }
        let a = sample_neighbors(&NodeId::new("a", 1), &union);
        let b = sample_neighbors(&NodeId::new("b", 2), &union);
        // Not a hard guarantee for any single draw, but with 20 candidates
        // identical output from two different seeds is exceedingly
        // unlikely and would indicate the seed isn't actually being used.
        assert!(a != b || a.len() == union.len());
    }
}
