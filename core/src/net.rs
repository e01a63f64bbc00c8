//! # Transport Helpers
//!
//! Listener binding and the retrying dialer shared by seed mesh formation
//! and peer bootstrap. `tokio::net::TcpListener` doesn't expose
//! `SO_REUSEADDR`, so the listener is built through `socket2` and handed
//! back to tokio once it's configured and bound.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::{DIAL_BACKOFF, DIAL_MAX_ATTEMPTS};
use crate::identity::NodeId;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve {0}")]
    Resolve(NodeId),

    #[error("exhausted {attempts} connection attempts to {target}: {source}")]
    DialExhausted {
        target: NodeId,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Binds a TCP listener with `SO_REUSEADDR` set, so a node that crashes and
/// restarts on the same port doesn't have to wait out `TIME_WAIT`.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, NetError> {
    let domain = socket2::Domain::for_address(addr);
    let socket =
        socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))
            .map_err(|source| NetError::Bind { addr, source })?;
    socket
        .set_reuse_address(true)
        .map_err(|source| NetError::Bind { addr, source })?;
    socket
        .set_nonblocking(true)
        .map_err(|source| NetError::Bind { addr, source })?;
    socket
        .bind(&addr.into())
        .map_err(|source| NetError::Bind { addr, source })?;
    socket
        .listen(1024)
        .map_err(|source| NetError::Bind { addr, source })?;

    TcpListener::from_std(socket.into()).map_err(|source| NetError::Bind { addr, source })
}

/// Dials `target`, retrying up to [`DIAL_MAX_ATTEMPTS`] times with a fixed
/// [`DIAL_BACKOFF`] between attempts. This is the one retry policy every
/// seed-to-seed and peer-to-seed link uses at startup.
pub async fn dial_with_retry(target: &NodeId) -> Result<TcpStream, NetError> {
    let addr = crate::identity::resolve(target)
        .await
        .map_err(|_| NetError::Resolve(target.clone()))?;

    let mut last_err = None;
    for attempt in 1..=DIAL_MAX_ATTEMPTS {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(target = %target, attempt, error = %e, "dial attempt failed");
                last_err = Some(e);
                if attempt < DIAL_MAX_ATTEMPTS {
                    tokio::time::sleep(DIAL_BACKOFF).await;
                }
            }
        }
    }

    Err(NetError::DialExhausted {
        target: target.clone(),
        attempts: DIAL_MAX_ATTEMPTS,
        source: last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "no attempt was made")
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_listener_accepts_a_loopback_connection() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let local_addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await });
        let _client = TcpStream::connect(local_addr).await.unwrap();
        let (server_stream, _) = accept.await.unwrap().unwrap();
        assert!(server_stream.peer_addr().is_ok());
    }

    #[tokio::test]
    async fn dial_with_retry_fails_fast_on_an_unresolvable_host() {
        let target = NodeId::new("this-host-does-not-exist.invalid", 1);
        let result = dial_with_retry(&target).await;
        assert!(matches!(result, Err(NetError::Resolve(_))));
    }
}
