//! Peer node: overlay construction via preferential attachment, gossip
//! dissemination, and two-tier failure detection.

mod bootstrap;
mod gossip;
mod overlay;
mod server;
mod state;
mod suspicion;

pub use bootstrap::BootstrapError;
pub use state::PeerState;

use std::sync::Arc;

use tokio::sync::{watch, Notify};

use crate::config::{GOSSIP_ORIGINATE_INTERVAL, STATUS_SNAPSHOT_INTERVAL};
use crate::identity::NodeId;
use crate::logfile::EventLog;
use crate::net::bind_listener;
use crate::status;

/// Registers with the configured seeds, builds the initial overlay, and
/// runs the accept loop, gossip ticker, ping sweep, and status ticker
/// until `shutdown` fires. `status_notify` is fired by the caller's
/// `SIGUSR1` handler to force an out-of-cycle NDJSON status snapshot.
pub async fn run(
    self_id: NodeId,
    all_seeds: Vec<NodeId>,
    event_log: EventLog,
    shutdown: watch::Receiver<bool>,
    status_notify: Arc<Notify>,
) -> Result<(), BootstrapError> {
    let addr: std::net::SocketAddr = self_id
        .socket_addr_string()
        .parse()
        .unwrap_or_else(|_| format!("0.0.0.0:{}", self_id.port).parse().unwrap());
    let listener = bind_listener(addr).map_err(BootstrapError::Net)?;

    let state = Arc::new(PeerState::new(self_id.clone(), all_seeds, event_log));

    bootstrap::register_with_seeds(&state).await?;
    overlay::initial_neighbors(&state).await;

    let gossip_state = state.clone();
    let mut gossip_shutdown = shutdown.clone();
    let gossip_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(GOSSIP_ORIGINATE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !gossip::originate(&gossip_state).await {
                        // Exhausted the origination budget; keep forwarding
                        // what others send, just stop minting new payloads.
                    }
                }
                _ = gossip_shutdown.changed() => {
                    if *gossip_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    let ping_task = tokio::spawn(suspicion::run_ping_sweep(state.clone(), shutdown.clone()));

    let status_state = state.clone();
    let mut status_shutdown = shutdown.clone();
    let status_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_SNAPSHOT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => status::emit_peer_snapshot(&status_state),
                _ = status_notify.notified() => status::emit_peer_snapshot(&status_state),
                _ = status_shutdown.changed() => {
                    if *status_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    server::run(listener, state.clone(), shutdown).await;

    gossip_task.abort();
    ping_task.abort();
    status_task.abort();
    state.event_log.shutdown();
    Ok(())
}
