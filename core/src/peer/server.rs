//! Peer accept loop: every inbound connection is a candidate neighbor
//! completing a `HELLO` handshake.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use super::overlay;
use super::state::PeerState;

pub async fn run(listener: TcpListener, state: Arc<PeerState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("peer accept loop shutting down");
                    return;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(%addr, "accepted neighbor connection");
                        tokio::spawn(overlay::accept_neighbor(state.clone(), stream));
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}
