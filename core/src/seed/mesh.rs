//! Full-mesh seed-to-seed links.
//!
//! Only the seed whose `(host, port)` precedes the other's dials; the other
//! accepts. Either way, once the connection exists both sides treat it as a
//! plain bidirectional stream — there's no separate "client" and "server"
//! role past the initial handshake; seeds form a full mesh of equals.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::SEND_QUEUE_DEPTH;
use crate::identity::NodeId;
use crate::net::dial_with_retry;
use crate::wire::{write_message, Message};

/// Registry of live outbound channels to other seeds. A writer task per
/// link drains its queue onto the socket, so a slow or wedged peer seed
/// can't block whoever is broadcasting.
#[derive(Default)]
pub struct SeedLinks {
    senders: DashMap<NodeId, mpsc::Sender<Message>>,
}

impl SeedLinks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawns the writer task for a newly established link and registers
    /// it under `peer`, replacing anything already registered (the newest
    /// connection always wins — there is only ever meant to be one).
    pub fn register<W>(self: &Arc<Self>, peer: NodeId, write_half: W)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        self.senders.insert(peer.clone(), tx);
        tokio::spawn(drain_writer(peer, write_half, rx));
    }

    pub fn send_to(&self, target: &NodeId, message: Message) {
        if let Some(tx) = self.senders.get(target) {
            if tx.try_send(message).is_err() {
                tracing::warn!(seed = %target, "seed link send queue full or closed, dropping message");
            }
        } else {
            tracing::warn!(seed = %target, "no live link to seed, dropping message");
        }
    }

    pub fn broadcast(&self, others: &[NodeId], message: Message) {
        for seed in others {
            self.send_to(seed, message.clone());
        }
    }

    pub fn remove(&self, peer: &NodeId) {
        self.senders.remove(peer);
    }
}

async fn drain_writer<W>(peer: NodeId, mut write_half: W, mut rx: mpsc::Receiver<Message>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = write_message(&mut write_half, &message).await {
            tracing::debug!(seed = %peer, error = %e, "seed link write failed, closing writer");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Establishes the outbound half of the mesh: dials every configured seed
/// whose id this node precedes. The accept loop (`server.rs`) picks up the
/// other half as inbound connections.
pub async fn dial_mesh(self_id: &NodeId, all_seeds: &[NodeId]) -> Vec<(NodeId, TcpStream)> {
    let mut links = Vec::new();
    for other in all_seeds {
        if other == self_id || !self_id.precedes(other) {
            continue;
        }
        match dial_with_retry(other).await {
            Ok(stream) => links.push((other.clone(), stream)),
            Err(e) => {
                tracing::warn!(seed = %other, error = %e, "failed to establish seed mesh link");
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_send_delivers_over_the_link() {
        let links = SeedLinks::new();
        let (client, server) = tokio::io::duplex(4096);
        let (_read_half, write_half) = tokio::io::split(client);
        let peer = NodeId::new("10.0.0.2", 6001);
        links.register(peer.clone(), write_half);

        links.send_to(&peer, Message::Ping(crate::wire::Ping {}));

        let mut server = server;
        let msg = crate::wire::read_message(&mut server).await.unwrap().unwrap();
        assert!(matches!(msg, Message::Ping(_)));
    }

    #[test]
    fn send_to_unknown_seed_does_not_panic() {
        let links = SeedLinks::new();
        links.send_to(&NodeId::new("nowhere", 1), Message::Ping(crate::wire::Ping {}));
    }
}
