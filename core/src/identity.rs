//! # Node Identity
//!
//! Every participant in the overlay — seed or peer — is named by the triple
//! `(host, port, kind)`. `(host, port)` alone is the stable key used in
//! every map and message; `kind` only ever matters for local bookkeeping
//! (a seed never needs to ask "is this a seed or a peer?" about itself).

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Which of the two node kinds this identity names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Seed,
    Peer,
}

/// A stable `(host, port)` identity.
///
/// `host` is kept as the string the node was configured or dialed with
/// (not resolved to an IP) so that log lines and wire messages round-trip
/// byte-for-byte with what the config file and handshakes actually said.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub host: String,
    pub port: u16,
}

impl NodeId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Lexicographic `(host, port)` ordering. Used everywhere a tiebreak
    /// by lower `(host, port)` is needed — connection collisions,
    /// same-peer concurrent registration proposals.
    pub fn precedes(&self, other: &NodeId) -> bool {
        (&self.host, self.port) < (&other.host, other.port)
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.host, self.port).cmp(&(&other.host, other.port))
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Resolves a [`NodeId`] to a connectable address. Kept distinct from
/// `NodeId` itself because `host` may be a hostname, not a literal IP, and
/// resolution can fail independently of identity equality.
pub async fn resolve(id: &NodeId) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;
    lookup_host(id.socket_addr_string())
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("could not resolve {id}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiebreak_is_lexicographic_on_host_then_port() {
        let a = NodeId::new("10.0.0.1", 6001);
        let b = NodeId::new("10.0.0.1", 6002);
        let c = NodeId::new("10.0.0.2", 6000);

        assert!(a.precedes(&b));
        assert!(!b.precedes(&a));
        assert!(a.precedes(&c));
    }

    #[test]
    fn display_matches_host_colon_port() {
        let id = NodeId::new("127.0.0.1", 6001);
        assert_eq!(id.to_string(), "127.0.0.1:6001");
        assert_eq!(id.socket_addr_string(), "127.0.0.1:6001");
    }

    #[test]
    fn equal_ids_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(NodeId::new("h", 1));
        assert!(set.contains(&NodeId::new("h", 1)));
        assert!(!set.contains(&NodeId::new("h", 2)));
    }
}
