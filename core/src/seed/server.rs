//! Seed accept loop.
//!
//! Every inbound TCP connection starts the same way: read the first frame.
//! If it's `HELLO`, the connection is another seed completing the mesh and
//! is handed to [`SeedLinks`] for the lifetime of the process. Anything
//! else is a peer making a one-off request — register, death report, or a
//! `PL_REQUEST` query — and gets a reply writer for just that connection.

use std::sync::Arc;

use tokio::io::{split, AsyncRead, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::identity::NodeId;
use crate::wire::{read_message, write_message, Hello, Message, PlResponse, ViolationTracker};

use super::membership::Membership;
use super::mesh::SeedLinks;
use super::state::SeedState;

pub async fn run(
    listener: TcpListener,
    state: Arc<SeedState>,
    links: Arc<SeedLinks>,
    membership: Arc<Membership>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("seed accept loop shutting down");
                    return;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(%addr, "accepted connection");
                        tokio::spawn(handle_connection(
                            stream,
                            state.clone(),
                            links.clone(),
                            membership.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

/// Announces this seed to another seed it just dialed, then hands the
/// link to [`SeedLinks`] and runs its read loop. Used for the outbound
/// half of mesh formation (`mesh::dial_mesh`).
pub async fn adopt_outbound_seed_link(
    stream: TcpStream,
    peer: crate::identity::NodeId,
    self_id: crate::identity::NodeId,
    links: Arc<SeedLinks>,
    membership: Arc<Membership>,
) {
    let (mut read_half, mut write_half) = split(stream);
    if write_message(&mut write_half, &Message::Hello(Hello { self_id })).await.is_err() {
        return;
    }
    links.register(peer.clone(), write_half);
    seed_link_loop(&mut read_half, membership).await;
    links.remove(&peer);
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<SeedState>,
    links: Arc<SeedLinks>,
    membership: Arc<Membership>,
) {
    let (mut read_half, write_half) = split(stream);

    let first = match read_message(&mut read_half).await {
        Ok(Some(msg)) => msg,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(error = %e, "bad frame on new connection, dropping");
            return;
        }
    };

    if let Message::Hello(hello) = first {
        links.register(hello.self_id.clone(), write_half);
        seed_link_loop(&mut read_half, membership).await;
        links.remove(&hello.self_id);
        return;
    }

    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(peer_writer_loop(write_half, rx));

    let mut registered_as = dispatch_peer_message(first, &state, &membership, &tx);

    let mut violations = ViolationTracker::new();
    loop {
        match read_message(&mut read_half).await {
            Ok(Some(msg)) => {
                if let Some(id) = dispatch_peer_message(msg, &state, &membership, &tx) {
                    registered_as = Some(id);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "protocol violation on peer session");
                if violations.observe(&e) {
                    tracing::debug!("dropping peer session after repeated violations");
                    break;
                }
            }
        }
    }

    if let Some(id) = registered_as {
        state.peer_links.remove(&id);
    }
}

async fn seed_link_loop<S>(read_half: &mut S, membership: Arc<Membership>)
where
    S: AsyncRead + Unpin,
{
    let mut violations = ViolationTracker::new();
    loop {
        match read_message(read_half).await {
            Ok(Some(msg)) => dispatch_seed_message(msg, &membership),
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "protocol violation on seed link");
                if violations.observe(&e) {
                    tracing::debug!("dropping seed link after repeated violations");
                    return;
                }
            }
        }
    }
}

async fn peer_writer_loop(mut write_half: WriteHalf<TcpStream>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if write_message(&mut write_half, &msg).await.is_err() {
            return;
        }
    }
}

fn dispatch_seed_message(msg: Message, membership: &Membership) {
    match msg {
        Message::RegisterProposal(m) => membership.handle_register_proposal(m),
        Message::RegisterVote(m) => membership.handle_register_vote(m),
        Message::RegisterCommit(m) => membership.handle_register_commit(m),
        Message::DeadProposal(m) => membership.handle_dead_proposal(m),
        Message::DeadVote(m) => membership.handle_dead_vote(m),
        Message::DeadConfirmed(m) => membership.handle_dead_confirmed(m),
        Message::Unknown(tag) => tracing::debug!(%tag, "ignoring unknown message type on seed link"),
        other => tracing::debug!(?other, "unexpected message kind on seed link"),
    }
}

/// Dispatches one message from a peer session. Returns the peer's id when
/// the message was a `REGISTER_REQUEST`, so the caller can remember it for
/// `peer_links` cleanup once the connection closes.
fn dispatch_peer_message(
    msg: Message,
    state: &Arc<SeedState>,
    membership: &Arc<Membership>,
    reply: &mpsc::UnboundedSender<Message>,
) -> Option<NodeId> {
    match msg {
        Message::RegisterRequest(m) => {
            state.register_waiters.insert(m.peer_id.clone(), reply.clone());
            membership.handle_register_request(m.peer_id.clone());
            Some(m.peer_id)
        }
        Message::DeadReport(m) => {
            state
                .death_waiters
                .entry(m.victim.clone())
                .or_default()
                .push(reply.clone());
            membership.handle_dead_report(m);
            None
        }
        Message::PlRequest(_) => {
            let _ = reply.send(Message::PlResponse(PlResponse {
                pl: state.snapshot_pl(),
            }));
            None
        }
        Message::Unknown(tag) => {
            tracing::debug!(%tag, "ignoring unknown message type from peer");
            None
        }
        other => {
            tracing::debug!(?other, "unexpected message kind from peer session");
            None
        }
    }
}
