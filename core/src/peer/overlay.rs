//! Neighbor connection lifecycle: dialing chosen neighbors, accepting
//! inbound `HELLO`s, tie-breaking duplicate links, and running the
//! per-neighbor read loop that fans out to gossip and suspicion handling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{split, AsyncRead, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::{MIN_NEIGHBORS, SEND_QUEUE_DEPTH};
use crate::identity::NodeId;
use crate::wire::{read_message, write_message, Message};

use super::bootstrap::{dial_neighbor, sample_neighbors, union_peer_list};
use super::gossip;
use super::state::{Neighbor, PeerState};
use super::suspicion;

/// Establishes the initial neighbor set chosen by preferential attachment
/// over the seed-reported union peer list.
pub async fn initial_neighbors(state: &Arc<PeerState>) {
    let union = union_peer_list(state).await;
    let chosen = sample_neighbors(&state.self_id, &union);
    tracing::info!(count = chosen.len(), "preferential attachment selected neighbors");
    for candidate in chosen {
        connect_neighbor(state.clone(), candidate).await;
    }
}

/// Re-runs bootstrap against a fresh union query. Called whenever the
/// neighbor count drops below [`MIN_NEIGHBORS`] (a purge, mainly).
pub async fn maybe_rebootstrap(state: &Arc<PeerState>) {
    if state.neighbors.len() >= MIN_NEIGHBORS {
        return;
    }
    tracing::info!("neighbor count below minimum, re-running preferential attachment");
    initial_neighbors(state).await;
}

/// Dials `candidate`, completes the handshake, and — if no link to it
/// already exists — adds it to `neighbors` and spawns its read loop. A
/// dial failure is treated as an immediate suspicion trigger.
async fn connect_neighbor(state: Arc<PeerState>, candidate: NodeId) {
    if state.neighbors.contains_key(&candidate) || state.is_purged(&candidate) {
        return;
    }
    match dial_neighbor(&candidate, &state.self_id).await {
        Ok(stream) => adopt_link(state, candidate, stream, true).await,
        Err(e) => {
            tracing::warn!(peer = %candidate, error = %e, "failed to dial candidate neighbor, suspecting");
            suspicion::suspect_immediately(&state, candidate).await;
        }
    }
}

/// Adds an established, handshake-complete connection to `neighbors` and
/// spawns its reader. `we_dialed` only matters for the tie-break: if both
/// sides raced to connect to each other, the link initiated by the lower
/// `(host,port)` wins.
pub async fn adopt_link(state: Arc<PeerState>, peer: NodeId, stream: TcpStream, we_dialed: bool) {
    if let Some(existing) = state.neighbors.get(&peer) {
        let keep_new = if we_dialed {
            state.self_id.precedes(&peer)
        } else {
            peer.precedes(&state.self_id)
        };
        if !keep_new {
            drop(existing);
            return;
        }
    }

    let (read_half, write_half) = split(stream);
    let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
    state.neighbors.insert(peer.clone(), Arc::new(Neighbor::new(tx)));
    tokio::spawn(drain_writer(peer.clone(), write_half, rx));
    tokio::spawn(neighbor_read_loop(state, peer, read_half));
}

async fn drain_writer(peer: NodeId, mut write_half: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    use tokio::io::AsyncWriteExt;
    while let Some(message) = rx.recv().await {
        if write_message(&mut write_half, &message).await.is_err() {
            tracing::debug!(%peer, "neighbor write failed, closing writer");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn neighbor_read_loop<R>(state: Arc<PeerState>, peer: NodeId, mut read_half: R)
where
    R: AsyncRead + Unpin,
{
    let mut violations = crate::wire::ViolationTracker::new();
    loop {
        match read_message(&mut read_half).await {
            Ok(Some(msg)) => dispatch(&state, &peer, msg).await,
            Ok(None) => {
                tracing::debug!(%peer, "neighbor closed connection");
                suspicion::on_broken_pipe(&state, peer.clone()).await;
                return;
            }
            Err(e) => {
                tracing::debug!(%peer, error = %e, "protocol violation on neighbor link");
                if violations.observe(&e) {
                    suspicion::on_broken_pipe(&state, peer.clone()).await;
                    return;
                }
            }
        }
    }
}

async fn dispatch(state: &Arc<PeerState>, from: &NodeId, msg: Message) {
    match msg {
        Message::Gossip(g) => gossip::handle_gossip(state, from, g.payload).await,
        Message::Ping(_) => {
            if let Some(n) = state.neighbors.get(from) {
                let _ = n.tx.send(Message::Pong(crate::wire::Pong {})).await;
            }
        }
        Message::Pong(_) => suspicion::on_pong(state, from),
        Message::SuspectRequest(m) => suspicion::handle_suspect_request(state, from, m).await,
        Message::SuspectResponse(m) => suspicion::handle_suspect_response(state, from, m).await,
        Message::Unknown(tag) => tracing::debug!(%tag, %from, "ignoring unknown message type from neighbor"),
        other => tracing::debug!(?other, %from, "unexpected message kind from neighbor"),
    }
}

/// Removes `victim` from the live overlay: closes its link, marks it
/// purged, and re-bootstraps if connectivity dropped too low.
pub fn purge<'a>(
    state: &'a Arc<PeerState>,
    victim: NodeId,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        state.neighbors.remove(&victim);
        state.suspect_table.remove(&victim);
        state.purged.insert(victim.clone(), ());
        state.event_log.dead_confirmed(&victim);
        maybe_rebootstrap(state).await;
    })
}

/// Accepts an inbound `HELLO` connection from a peer that chose this node
/// as a neighbor.
pub async fn accept_neighbor(state: Arc<PeerState>, mut stream: TcpStream) {
    match read_message(&mut stream).await {
        Ok(Some(Message::Hello(hello))) => {
            adopt_link(state, hello.self_id, stream, false).await;
        }
        Ok(Some(other)) => {
            tracing::debug!(?other, "expected HELLO on new peer connection, got something else");
        }
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "bad frame on new peer connection"),
    }
}
