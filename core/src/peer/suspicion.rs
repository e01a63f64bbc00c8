//! Two-tier failure detection: local three-strike suspicion, then a
//! peer-level quorum before escalating to the seeds.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::{
    ICMP_TIMEOUT, MIN_SUSPECT_RESPONDENTS, PING_INTERVAL, PONG_TIMEOUT, SEED_CONFIRM_TIMEOUT,
    SUSPECT_RESPONSE_TIMEOUT,
};
use crate::identity::NodeId;
use crate::net::dial_with_retry;
use crate::wire::{
    read_message, write_message, DeadReport, Message, Ping, SuspectRequest, SuspectResponse,
};

use super::overlay;
use super::state::{PeerState, SuspectRound};

/// Runs the periodic liveness sweep until `shutdown` fires.
pub async fn run_ping_sweep(state: Arc<PeerState>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(PING_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let targets: Vec<NodeId> = state
                    .neighbor_ids()
                    .into_iter()
                    .filter(|id| !state.suspect_table.contains_key(id))
                    .collect();
                for target in targets {
                    tokio::spawn(probe_neighbor(state.clone(), target));
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn probe_neighbor(state: Arc<PeerState>, target: NodeId) {
    let neighbor = match state.neighbors.get(&target) {
        Some(n) => n.value().clone(),
        None => return,
    };

    let sent_at = Instant::now();
    if neighbor.tx.send(Message::Ping(Ping {})).await.is_err() {
        on_broken_pipe(&state, target).await;
        return;
    }

    let (tcp_ok, icmp_ok) = tokio::join!(
        async {
            tokio::time::sleep(PONG_TIMEOUT).await;
            neighbor.pong_since(sent_at)
        },
        icmp_probe(&target.host)
    );

    if neighbor.record_outcome(tcp_ok && icmp_ok) {
        enter_local_suspect(&state, target).await;
    }
}

/// Shells out to the OS `ping` utility — one echo, bounded wait. ICMP is
/// treated as an external collaborator rather than something this process
/// implements itself with raw sockets.
async fn icmp_probe(host: &str) -> bool {
    let attempt = tokio::process::Command::new("ping")
        .args(["-c", "1", "-W", "2", host])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();

    matches!(
        tokio::time::timeout(ICMP_TIMEOUT, attempt).await,
        Ok(Ok(status)) if status.success()
    )
}

/// A single bounded connect attempt — deliberately not the startup
/// retrying dialer, since a liveness probe that retries for five seconds
/// defeats the point of a 2-second probe.
async fn tcp_connect_probe(target: &NodeId) -> bool {
    let addr = match crate::identity::resolve(target).await {
        Ok(addr) => addr,
        Err(_) => return false,
    };
    tokio::time::timeout(ICMP_TIMEOUT, TcpStream::connect(addr))
        .await
        .is_ok_and(|r| r.is_ok())
}

pub fn on_pong(state: &Arc<PeerState>, from: &NodeId) {
    if let Some(n) = state.neighbors.get(from) {
        n.note_pong();
    }
}

/// A neighbor's link closed or errored outright. This counts the same as
/// a three-strike failure: the neighbor is gone from `neighbors` and goes
/// straight to local-suspect.
pub async fn on_broken_pipe(state: &Arc<PeerState>, victim: NodeId) {
    state.neighbors.remove(&victim);
    enter_local_suspect(state, victim).await;
}

/// A dial to a freshly chosen preferential-attachment candidate failed.
/// Treated the same as a broken pipe on an existing link.
pub async fn suspect_immediately(state: &Arc<PeerState>, victim: NodeId) {
    enter_local_suspect(state, victim).await;
}

async fn enter_local_suspect(state: &Arc<PeerState>, victim: NodeId) {
    if state.is_purged(&victim) || state.suspect_table.contains_key(&victim) {
        return;
    }
    state.event_log.suspect_initiated(&victim);

    let others: Vec<NodeId> = state
        .neighbor_ids()
        .into_iter()
        .filter(|id| id != &victim)
        .collect();
    state
        .suspect_table
        .insert(victim.clone(), SuspectRound::new(others.len()));

    for other in &others {
        if let Some(n) = state.neighbors.get(other) {
            let _ = n
                .tx
                .send(Message::SuspectRequest(SuspectRequest {
                    victim: victim.clone(),
                }))
                .await;
        }
    }

    let state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SUSPECT_RESPONSE_TIMEOUT).await;
        resolve_suspicion(&state, victim).await;
    });
}

/// Independently probes `victim` on behalf of whoever asked, and replies.
pub async fn handle_suspect_request(state: &Arc<PeerState>, from: &NodeId, msg: SuspectRequest) {
    let icmp_ok = icmp_probe(&msg.victim.host).await;
    let tcp_ok = tcp_connect_probe(&msg.victim).await;
    let alive = icmp_ok || tcp_ok;

    if let Some(n) = state.neighbors.get(from) {
        let _ = n
            .tx
            .send(Message::SuspectResponse(SuspectResponse {
                victim: msg.victim,
                alive,
            }))
            .await;
    }
}

pub async fn handle_suspect_response(state: &Arc<PeerState>, from: &NodeId, msg: SuspectResponse) {
    let victim = msg.victim.clone();
    let all_in = {
        let mut entry = match state.suspect_table.get_mut(&victim) {
            Some(entry) => entry,
            None => return,
        };
        entry.respondents.push((from.clone(), msg.alive));
        entry.respondents.len() >= entry.requested_from
    };
    if all_in {
        resolve_suspicion(state, victim).await;
    }
}

/// `⌈n/2⌉ + 1` over however many respondents actually answered in time.
fn suspect_quorum_threshold(respondents: usize) -> usize {
    (respondents + 1) / 2 + 1
}

async fn resolve_suspicion(state: &Arc<PeerState>, victim: NodeId) {
    let round = match state.suspect_table.remove(&victim) {
        Some((_, round)) => round,
        None => return,
    };

    let respondents = round.respondents.len();
    if respondents < MIN_SUSPECT_RESPONDENTS {
        tracing::debug!(peer = %victim, respondents, "too few suspect respondents, resuming pings");
        return;
    }

    if round.dead_votes() >= suspect_quorum_threshold(respondents) {
        report_dead(state, victim).await;
    } else {
        tracing::debug!(peer = %victim, "suspicion refuted by peer quorum, resuming pings");
    }
}

async fn report_dead(state: &Arc<PeerState>, victim: NodeId) {
    state.neighbors.remove(&victim);

    for seed in state.all_seeds.clone() {
        let state = state.clone();
        let victim = victim.clone();
        tokio::spawn(send_dead_report_and_await_confirmation(state, seed, victim));
    }

    let fallback_state = state.clone();
    let fallback_victim = victim.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SEED_CONFIRM_TIMEOUT).await;
        if !fallback_state.is_purged(&fallback_victim) {
            tracing::info!(peer = %fallback_victim, "no seed confirmation in time, purging locally");
            overlay::purge(&fallback_state, fallback_victim).await;
        }
    });
}

async fn send_dead_report_and_await_confirmation(state: Arc<PeerState>, seed: NodeId, victim: NodeId) {
    let mut stream: TcpStream = match dial_with_retry(&seed).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(%seed, error = %e, "could not reach seed to file dead report");
            return;
        }
    };

    let report = Message::DeadReport(DeadReport {
        victim: victim.clone(),
        reporter: state.self_id.clone(),
    });
    if write_message(&mut stream, &report).await.is_err() {
        return;
    }

    if let Ok(Ok(Some(Message::DeadConfirmed(_)))) =
        tokio::time::timeout(SEED_CONFIRM_TIMEOUT, read_message(&mut stream)).await
    {
        if !state.is_purged(&victim) {
            overlay::purge(&state, victim).await;
        }
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_threshold_matches_ceiling_plus_one() {
        assert_eq!(suspect_quorum_threshold(2), 2);
        assert_eq!(suspect_quorum_threshold(3), 3);
        assert_eq!(suspect_quorum_threshold(4), 3);
        assert_eq!(suspect_quorum_threshold(5), 4);
    }

    #[tokio::test]
    async fn suspect_round_with_majority_dead_votes_reaches_quorum() {
        let mut round = SuspectRound::new(3);
        round.respondents.push((NodeId::new("a", 1), false));
        round.respondents.push((NodeId::new("b", 2), false));
        round.respondents.push((NodeId::new("c", 3), true));
        assert!(round.dead_votes() >= suspect_quorum_threshold(round.respondents.len()));
    }

    #[tokio::test]
    async fn suspect_round_with_majority_alive_votes_does_not_reach_quorum() {
        let mut round = SuspectRound::new(3);
        round.respondents.push((NodeId::new("a", 1), true));
        round.respondents.push((NodeId::new("b", 2), true));
        round.respondents.push((NodeId::new("c", 3), false));
        assert!(round.dead_votes() < suspect_quorum_threshold(round.respondents.len()));
    }
}
