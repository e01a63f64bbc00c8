//! # Overlay Core
//!
//! Shared machinery for both node kinds in the gossip overlay network:
//!
//! - [`identity`] — the `(host, port)` naming scheme every message and map
//!   key is built on.
//! - [`wire`] — length-prefixed JSON framing and the closed set of
//!   messages exchanged over it.
//! - [`config`] — every timing and sizing constant the protocols rely on.
//! - [`config_file`] / [`logfile`] — the on-disk seed list and the
//!   append-only event log every node keeps.
//! - [`net`] — listener binding and the shared retrying dialer.
//! - [`seed`] — majority-vote membership consensus over a full mesh of
//!   seeds.
//! - [`peer`] — preferential-attachment overlay construction, gossip
//!   dissemination, and two-tier failure detection.
//! - [`status`] — periodic NDJSON diagnostic snapshots for both node kinds.
//!
//! Design philosophy: every piece of shared state lives behind the
//! smallest lock that covers it (`DashMap` per collection, `RwLock` around
//! the membership set) rather than one node-wide mutex, so a slow
//! operation on one peer's link never blocks bookkeeping for another.

pub mod config;
pub mod config_file;
pub mod identity;
pub mod logfile;
pub mod logging;
pub mod net;
pub mod peer;
pub mod seed;
pub mod status;
pub mod wire;
