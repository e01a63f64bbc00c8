//! Register and death consensus.
//!
//! Both protocols share one shape: a seed receives a trigger (a peer's
//! `REGISTER_REQUEST`, or enough `DEAD_REPORT`s about a victim), opens a
//! proposal, broadcasts it to every other seed, and collects votes until
//! either quorum is reached (commit) or the proposal times out (NACK and
//! discard). Two independent `DashMap`s — one per protocol — hold whatever
//! proposals are currently in flight; a peer can have at most one of each
//! open at a time since `entry().or_insert_with()` only opens a fresh one
//! when none exists.

use std::sync::Arc;

use crate::config::{MIN_DEATH_REPORTS, PROPOSAL_TIMEOUT};
use crate::identity::NodeId;
use crate::wire::{
    DeadConfirmed, DeadProposal, DeadReport, DeadVote, Message, RegisterAck, RegisterCommit,
    RegisterNack, RegisterProposal, RegisterVote,
};

use super::mesh::SeedLinks;
use super::state::{Proposal, SeedState};

pub struct Membership {
    state: Arc<SeedState>,
    links: Arc<SeedLinks>,
}

impl Membership {
    pub fn new(state: Arc<SeedState>, links: Arc<SeedLinks>) -> Self {
        Self { state, links }
    }

    /// A candidate peer asked this seed to register it. Opens (or ignores,
    /// if already open) a register proposal and broadcasts it.
    pub fn handle_register_request(&self, peer: NodeId) {
        if self.state.pl.read().contains(&peer) {
            // Already a member — nothing for consensus to do. The peer
            // will discover this on its next PL_REQUEST.
            return;
        }
        self.state.event_log.register_request(&peer);

        let is_new = self
            .state
            .pending_registers
            .get(&peer)
            .map(|_| false)
            .unwrap_or(true);
        if !is_new {
            return;
        }

        let mut proposal = Proposal::opened_by_self();
        proposal.yes_votes.insert(self.state.self_id.clone());
        self.state.pending_registers.insert(peer.clone(), proposal);
        self.state.event_log.register_proposal(&peer, &self.state.self_id);

        self.links.broadcast(
            &self.state.other_seeds(),
            Message::RegisterProposal(RegisterProposal {
                peer_id: peer,
                proposer: self.state.self_id.clone(),
            }),
        );
    }

    /// Another seed proposed registering `peer_id`. This seed always votes
    /// yes unless the peer is already a member — there's no other
    /// rejection path besides quorum timeout.
    pub fn handle_register_proposal(&self, msg: RegisterProposal) {
        let vote = !self.state.pl.read().contains(&msg.peer_id);
        self.state.event_log.register_vote(&msg.peer_id, &self.state.self_id, vote);
        self.links.send_to(
            &msg.proposer,
            Message::RegisterVote(RegisterVote {
                peer_id: msg.peer_id,
                vote,
                voter: self.state.self_id.clone(),
            }),
        );
    }

    /// A vote came back for a register proposal this seed opened. Commits
    /// once quorum yes-votes accumulate.
    pub fn handle_register_vote(&self, msg: RegisterVote) {
        self.state.event_log.register_vote(&msg.peer_id, &msg.voter, msg.vote);

        let quorum = self.state.quorum_threshold();
        let reached = {
            let mut entry = match self.state.pending_registers.get_mut(&msg.peer_id) {
                Some(entry) => entry,
                None => return,
            };
            if msg.vote {
                entry.yes_votes.insert(msg.voter);
            } else {
                entry.no_votes.insert(msg.voter);
            }
            entry.yes_votes.len() >= quorum
        };

        if reached {
            self.commit_register(msg.peer_id);
        }
    }

    fn commit_register(&self, peer: NodeId) {
        self.state.pending_registers.remove(&peer);
        self.state.pl.write().insert(peer.clone());
        self.state.event_log.register_commit(&peer);

        self.links.broadcast(
            &self.state.other_seeds(),
            Message::RegisterCommit(RegisterCommit {
                peer_id: peer.clone(),
            }),
        );

        if let Some((_, tx)) = self.state.register_waiters.remove(&peer) {
            let _ = tx.send(Message::RegisterAck(RegisterAck {
                pl: self.state.snapshot_pl(),
            }));
            self.state.peer_links.insert(peer, tx);
        }
    }

    /// Another seed committed a register this seed did not itself
    /// originate as proposer (it may have voted, or may be catching up).
    /// Applying it locally keeps every seed's `PL` converged without
    /// requiring the commit to re-run consensus.
    pub fn handle_register_commit(&self, msg: RegisterCommit) {
        self.state.pending_registers.remove(&msg.peer_id);
        self.state.pl.write().insert(msg.peer_id.clone());
        self.state.event_log.register_commit(&msg.peer_id);
    }

    /// A peer reported `victim` dead. Accumulates distinct reporters and
    /// opens a death proposal once [`MIN_DEATH_REPORTS`] is reached.
    pub fn handle_dead_report(&self, msg: DeadReport) {
        self.state.event_log.dead_report(&msg.victim, &msg.reporter);

        if !self.state.pl.read().contains(&msg.victim) {
            return;
        }

        let should_open = {
            let mut entry = self
                .state
                .pending_deaths
                .entry(msg.victim.clone())
                .or_insert_with(Proposal::opened_by_self);
            entry.reporters.insert(msg.reporter);
            entry.reporters.len() >= MIN_DEATH_REPORTS && entry.yes_votes.is_empty()
        };

        if should_open {
            self.state
                .pending_deaths
                .get_mut(&msg.victim)
                .unwrap()
                .yes_votes
                .insert(self.state.self_id.clone());

            self.links.broadcast(
                &self.state.other_seeds(),
                Message::DeadProposal(DeadProposal {
                    victim: msg.victim,
                    proposer: self.state.self_id.clone(),
                }),
            );
        }
    }

    pub fn handle_dead_proposal(&self, msg: DeadProposal) {
        let vote = self.state.pl.read().contains(&msg.victim);
        self.state.event_log.dead_vote(&msg.victim, &self.state.self_id, vote);
        self.links.send_to(
            &msg.proposer,
            Message::DeadVote(DeadVote {
                victim: msg.victim,
                vote,
                voter: self.state.self_id.clone(),
            }),
        );
    }

    pub fn handle_dead_vote(&self, msg: DeadVote) {
        self.state.event_log.dead_vote(&msg.victim, &msg.voter, msg.vote);

        let quorum = self.state.quorum_threshold();
        let (reached, enough_reporters) = {
            let mut entry = match self.state.pending_deaths.get_mut(&msg.victim) {
                Some(entry) => entry,
                None => return,
            };
            if msg.vote {
                entry.yes_votes.insert(msg.voter);
            } else {
                entry.no_votes.insert(msg.voter);
            }
            (
                entry.yes_votes.len() >= quorum,
                entry.reporters.len() >= MIN_DEATH_REPORTS,
            )
        };

        if reached && enough_reporters {
            self.commit_death(msg.victim);
        }
    }

    fn commit_death(&self, victim: NodeId) {
        self.state.pending_deaths.remove(&victim);
        self.state.pl.write().remove(&victim);
        self.state.event_log.dead_confirmed(&victim);

        self.links.broadcast(
            &self.state.other_seeds(),
            Message::DeadConfirmed(DeadConfirmed {
                victim: victim.clone(),
            }),
        );

        if let Some((_, waiters)) = self.state.death_waiters.remove(&victim) {
            for tx in waiters {
                let _ = tx.send(Message::DeadConfirmed(DeadConfirmed {
                    victim: victim.clone(),
                }));
            }
        }

        self.push_dead_confirmed_to_peer_links(&victim);
    }

    /// Another seed broadcast the commit over the mesh. A peer may be
    /// registered here but not on the seed that ran the quorum, so this
    /// seed still owes its own `peer_links` the push.
    pub fn handle_dead_confirmed(&self, msg: DeadConfirmed) {
        self.state.pending_deaths.remove(&msg.victim);
        self.state.pl.write().remove(&msg.victim);
        self.state.event_log.dead_confirmed(&msg.victim);
        self.push_dead_confirmed_to_peer_links(&msg.victim);
    }

    /// Best-effort, non-blocking fan-out of `DEAD_CONFIRMED` to every peer
    /// this seed has a durable link for. A failed send means the peer's
    /// connection is already gone, so the entry is dropped along with it.
    fn push_dead_confirmed_to_peer_links(&self, victim: &NodeId) {
        let msg = Message::DeadConfirmed(DeadConfirmed {
            victim: victim.clone(),
        });
        self.state.peer_links.retain(|_, tx| tx.send(msg.clone()).is_ok());
    }

    /// Sweeps proposals that have been open longer than [`PROPOSAL_TIMEOUT`],
    /// NACKing any peer still waiting on a register decision.
    pub fn reap_expired(&self) {
        let expired_registers: Vec<NodeId> = self
            .state
            .pending_registers
            .iter()
            .filter(|entry| entry.value().is_expired(PROPOSAL_TIMEOUT))
            .map(|entry| entry.key().clone())
            .collect();

        for peer in expired_registers {
            self.state.pending_registers.remove(&peer);
            if let Some((_, tx)) = self.state.register_waiters.remove(&peer) {
                let _ = tx.send(Message::RegisterNack(RegisterNack {
                    peer_id: peer,
                }));
            }
        }

        self.state
            .pending_deaths
            .retain(|_, proposal| !proposal.is_expired(PROPOSAL_TIMEOUT));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::EventLog;

    fn membership(self_id: NodeId, all_seeds: Vec<NodeId>) -> Membership {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path(), crate::identity::NodeKind::Seed, self_id.port).unwrap();
        let state = Arc::new(SeedState::new(self_id, all_seeds, log));
        let links = SeedLinks::new();
        Membership::new(state, links)
    }

    #[test]
    fn single_seed_commits_its_own_register_proposal_immediately() {
        let seed = NodeId::new("10.0.0.1", 6000);
        let m = membership(seed.clone(), vec![seed]);
        let candidate = NodeId::new("10.0.0.9", 7000);

        m.handle_register_request(candidate.clone());
        assert!(m.state.pl.read().contains(&candidate));
    }

    #[test]
    fn three_seed_register_needs_two_yes_votes() {
        let seeds = vec![
            NodeId::new("a", 1),
            NodeId::new("b", 2),
            NodeId::new("c", 3),
        ];
        let m = membership(seeds[0].clone(), seeds.clone());
        let candidate = NodeId::new("peer", 7000);

        m.handle_register_request(candidate.clone());
        assert!(!m.state.pl.read().contains(&candidate));

        m.handle_register_vote(RegisterVote {
            peer_id: candidate.clone(),
            vote: true,
            voter: seeds[1].clone(),
        });

        assert!(m.state.pl.read().contains(&candidate));
    }

    #[test]
    fn death_requires_minimum_distinct_reporters_before_opening_a_proposal() {
        let seeds = vec![NodeId::new("a", 1), NodeId::new("b", 2)];
        let m = membership(seeds[0].clone(), seeds.clone());
        let victim = NodeId::new("victim", 7000);
        m.state.pl.write().insert(victim.clone());

        m.handle_dead_report(DeadReport {
            victim: victim.clone(),
            reporter: NodeId::new("reporter1", 7001),
        });
        assert!(m.state.pending_deaths.get(&victim).unwrap().yes_votes.is_empty());

        m.handle_dead_report(DeadReport {
            victim: victim.clone(),
            reporter: NodeId::new("reporter2", 7002),
        });
        assert!(!m.state.pending_deaths.get(&victim).unwrap().yes_votes.is_empty());
    }

    #[test]
    fn death_commits_once_quorum_and_reporter_minimum_are_both_met() {
        let seeds = vec![
            NodeId::new("a", 1),
            NodeId::new("b", 2),
            NodeId::new("c", 3),
        ];
        let m = membership(seeds[0].clone(), seeds.clone());
        let victim = NodeId::new("victim", 7000);
        m.state.pl.write().insert(victim.clone());

        m.handle_dead_report(DeadReport {
            victim: victim.clone(),
            reporter: NodeId::new("r1", 7001),
        });
        m.handle_dead_report(DeadReport {
            victim: victim.clone(),
            reporter: NodeId::new("r2", 7002),
        });

        m.handle_dead_vote(DeadVote {
            victim: victim.clone(),
            vote: true,
            voter: seeds[1].clone(),
        });

        assert!(!m.state.pl.read().contains(&victim));
    }

    #[test]
    fn register_commit_keeps_the_reply_channel_as_a_durable_peer_link() {
        let seed = NodeId::new("10.0.0.1", 6000);
        let m = membership(seed.clone(), vec![seed]);
        let candidate = NodeId::new("10.0.0.9", 7000);

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        m.state.register_waiters.insert(candidate.clone(), tx);
        m.handle_register_request(candidate.clone());

        assert!(m.state.peer_links.contains_key(&candidate));
    }

    #[test]
    fn death_commit_pushes_dead_confirmed_to_every_registered_peer_link() {
        let seeds = vec![
            NodeId::new("a", 1),
            NodeId::new("b", 2),
            NodeId::new("c", 3),
        ];
        let m = membership(seeds[0].clone(), seeds.clone());
        let victim = NodeId::new("victim", 7000);
        m.state.pl.write().insert(victim.clone());

        // A bystander peer registered earlier and is still linked, but
        // never reported this particular death.
        let (bystander_tx, mut bystander_rx) = tokio::sync::mpsc::unbounded_channel();
        m.state.peer_links.insert(NodeId::new("bystander", 8000), bystander_tx.clone());

        m.handle_dead_report(DeadReport {
            victim: victim.clone(),
            reporter: NodeId::new("r1", 7001),
        });
        m.handle_dead_report(DeadReport {
            victim: victim.clone(),
            reporter: NodeId::new("r2", 7002),
        });
        m.handle_dead_vote(DeadVote {
            victim: victim.clone(),
            vote: true,
            voter: seeds[1].clone(),
        });

        let msg = bystander_rx.try_recv().unwrap();
        match msg {
            Message::DeadConfirmed(m) => assert_eq!(m.victim, victim),
            other => panic!("expected DeadConfirmed, got {other:?}"),
        }
        drop(bystander_tx);
    }

    #[test]
    fn expired_register_proposal_sends_a_nack() {
        let seeds = vec![NodeId::new("a", 1), NodeId::new("b", 2)];
        let m = membership(seeds[0].clone(), seeds.clone());
        let candidate = NodeId::new("peer", 7000);

        m.handle_register_request(candidate.clone());
        {
            let mut entry = m.state.pending_registers.get_mut(&candidate).unwrap();
            entry.opened_at = std::time::Instant::now() - PROPOSAL_TIMEOUT - std::time::Duration::from_secs(1);
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        m.state.register_waiters.insert(candidate.clone(), tx);
        m.reap_expired();

        let msg = rx.try_recv().unwrap();
        assert!(matches!(msg, Message::RegisterNack(_)));
    }
}
