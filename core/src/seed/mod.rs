//! Seed node: majority-vote membership consensus over a full mesh of
//! equals.

mod membership;
mod mesh;
mod server;
mod state;

pub use membership::Membership;
pub use mesh::SeedLinks;
pub use state::SeedState;

use std::sync::Arc;

use tokio::sync::{watch, Notify};

use crate::config::{PROPOSAL_REAP_INTERVAL, STATUS_SNAPSHOT_INTERVAL};
use crate::identity::NodeId;
use crate::logfile::EventLog;
use crate::net::bind_listener;
use crate::status;

/// Wires up state, mesh links, the accept loop, and the proposal reaper,
/// then runs until `shutdown` fires. `all_seeds` must include `self_id`.
/// `status_notify` is fired by the caller's `SIGUSR1` handler to force an
/// out-of-cycle NDJSON status snapshot.
pub async fn run(
    self_id: NodeId,
    all_seeds: Vec<NodeId>,
    event_log: EventLog,
    mut shutdown: watch::Receiver<bool>,
    status_notify: Arc<Notify>,
) -> Result<(), crate::net::NetError> {
    let addr: std::net::SocketAddr = self_id
        .socket_addr_string()
        .parse()
        .unwrap_or_else(|_| format!("0.0.0.0:{}", self_id.port).parse().unwrap());
    let listener = bind_listener(addr)?;

    let state = Arc::new(SeedState::new(self_id.clone(), all_seeds.clone(), event_log));
    let links = SeedLinks::new();
    let membership = Arc::new(Membership::new(state.clone(), links.clone()));

    for (peer, stream) in mesh::dial_mesh(&self_id, &all_seeds).await {
        tokio::spawn(server::adopt_outbound_seed_link(
            stream,
            peer,
            self_id.clone(),
            links.clone(),
            membership.clone(),
        ));
    }

    let reaper_membership = membership.clone();
    let mut reaper_shutdown = shutdown.clone();
    let reaper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROPOSAL_REAP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => reaper_membership.reap_expired(),
                _ = reaper_shutdown.changed() => {
                    if *reaper_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    let status_state = state.clone();
    let mut status_shutdown = shutdown.clone();
    let status_ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_SNAPSHOT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => status::emit_seed_snapshot(&status_state),
                _ = status_notify.notified() => status::emit_seed_snapshot(&status_state),
                _ = status_shutdown.changed() => {
                    if *status_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    server::run(listener, state.clone(), links, membership, shutdown.clone()).await;

    reaper.abort();
    status_ticker.abort();
    state.event_log.shutdown();
    Ok(())
}
