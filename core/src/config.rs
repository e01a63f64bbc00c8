//! # Protocol Constants
//!
//! Every timing and sizing constant the membership, gossip, and suspicion
//! protocols rely on lives here. These are not tuning knobs — a seed and
//! a peer built from different values would still interoperate, but the
//! quiescence and timeout assumptions the rest of the network relies on
//! would no longer hold.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Membership consensus (seed side)
// ---------------------------------------------------------------------------

/// How long a seed holds a register/death proposal open waiting for votes
/// before discarding it and NACKing the originator.
pub const PROPOSAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Window within which at least two distinct `DEAD_REPORT`s for the same
/// victim must arrive before a seed starts a death proposal.
pub const DEATH_REPORT_WINDOW: Duration = Duration::from_secs(10);

/// Minimum number of distinct reporters required before a death proposal
/// is opened at all.
pub const MIN_DEATH_REPORTS: usize = 2;

/// How often the pending-proposal reaper sweeps for expired registers and
/// deaths.
pub const PROPOSAL_REAP_INTERVAL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Seed-link / peer-link transient I/O
// ---------------------------------------------------------------------------

/// Fixed backoff between dial attempts for a seed-to-seed or peer-to-seed
/// link.
pub const DIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Number of dial attempts before a link is declared unreachable for this
/// startup attempt.
pub const DIAL_MAX_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Gossip engine
// ---------------------------------------------------------------------------

/// Cadence at which a peer originates a new gossip message.
pub const GOSSIP_ORIGINATE_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum number of messages a single peer will originate over its
/// lifetime.
pub const MAX_ORIGINATED_MESSAGES: u8 = 10;

// ---------------------------------------------------------------------------
// Liveness & suspicion
// ---------------------------------------------------------------------------

/// Interval between liveness probes (TCP ping + ICMP echo) to each
/// neighbor.
pub const PING_INTERVAL: Duration = Duration::from_secs(13);

/// How long a neighbor has to answer a `PING` with `PONG`.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(4);

/// How long the OS `ping` utility is given to produce a reply.
pub const ICMP_TIMEOUT: Duration = Duration::from_secs(2);

/// Number of consecutive liveness failures (TCP+ICMP) before a neighbor is
/// moved to local-suspect, absent an instantaneous broken-pipe event.
pub const SUSPECT_STRIKE_THRESHOLD: u32 = 3;

/// How long a suspect respondent has to answer `SUSPECT_REQUEST`.
pub const SUSPECT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Minimum number of respondents required before a suspect quorum can be
/// declared at all, regardless of the computed threshold.
pub const MIN_SUSPECT_RESPONDENTS: usize = 2;

/// How long a peer waits for `DEAD_CONFIRMED` from any seed after emitting
/// a `DEAD_REPORT` before purging the victim locally anyway.
pub const SEED_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum neighbor count a peer tries to maintain; dropping below this
/// triggers a fresh preferential-attachment bootstrap round.
pub const MIN_NEIGHBORS: usize = 1;

// ---------------------------------------------------------------------------
// Preferential attachment
// ---------------------------------------------------------------------------

/// Shape parameter of the Pareto distribution used to draw the neighbor
/// fanout `k`. Pinned as a literal constant; see DESIGN.md for the choice
/// of value.
pub const PARETO_ALPHA: f64 = 1.5;

/// Scale parameter (`x_min`) of the same distribution.
pub const PARETO_X_MIN: f64 = 2.0;

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Hard cap on the length prefix of an inbound frame. A hostile or
/// corrupted length field is rejected outright rather than driving an
/// unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Outbound per-link queue depth. JSON overlay messages are small and
/// short-lived, so a depth in message counts rather than bytes gives a
/// small bounded queue that drops and suspects on overflow.
pub const SEND_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Protocol violations
// ---------------------------------------------------------------------------

/// A link is dropped once it has committed more than this many protocol
/// violations within `PROTOCOL_VIOLATION_WINDOW`.
pub const MAX_PROTOCOL_VIOLATIONS: u32 = 3;

pub const PROTOCOL_VIOLATION_WINDOW: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// How often the status ticker emits an NDJSON snapshot line, independent
/// of the `SIGUSR1`-triggered one-off snapshot.
pub const STATUS_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);
