//! # Event Log File
//!
//! Every node keeps a flat, human-readable append log alongside whatever
//! `tracing` sends to stdout — `outputfile_seed_<port>.txt` or
//! `outputfile_peer_<port>.txt`. This is the record graders and operators
//! are expected to tail with `grep`, so the line shapes below are part of
//! the external contract, not an implementation detail.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::identity::{NodeId, NodeKind};

#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write log file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An append-only, wall-clock-timestamped event log.
///
/// One line per event, `Mutex`-guarded rather than behind a channel: log
/// volume here is low enough (protocol milestones, not per-byte traffic)
/// that a blocking write under the lock never becomes a bottleneck.
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl EventLog {
    /// Opens (creating if needed) `outputfile_<kind>_<port>.txt` under
    /// `log_dir`.
    pub fn open(log_dir: &Path, kind: NodeKind, port: u16) -> Result<Self, LogFileError> {
        let name = match kind {
            NodeKind::Seed => format!("outputfile_seed_{port}.txt"),
            NodeKind::Peer => format!("outputfile_peer_{port}.txt"),
        };
        let path = log_dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogFileError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn write_line(&self, line: &str) -> Result<(), LogFileError> {
        let stamped = format!("{} {line}\n", Utc::now().to_rfc3339());
        self.file
            .lock()
            .write_all(stamped.as_bytes())
            .map_err(|source| LogFileError::Write {
                path: self.path.clone(),
                source,
            })
    }

    pub fn register_request(&self, peer: &NodeId) {
        self.log(&format!("REGISTER_REQUEST {peer}"));
    }

    pub fn register_proposal(&self, peer: &NodeId, proposer: &NodeId) {
        self.log(&format!("REGISTER_PROPOSAL {peer} proposed_by {proposer}"));
    }

    pub fn register_vote(&self, peer: &NodeId, voter: &NodeId, vote: bool) {
        self.log(&format!(
            "REGISTER_VOTE {peer} voter {voter} vote {}",
            if vote { "yes" } else { "no" }
        ));
    }

    pub fn register_commit(&self, peer: &NodeId) {
        self.log(&format!("REGISTER_COMMIT {peer}"));
    }

    pub fn dead_report(&self, victim: &NodeId, reporter: &NodeId) {
        self.log(&format!(
            "DEAD_REPORT Dead Node:{}:{}:{}:{}",
            victim.host,
            victim.port,
            Utc::now().timestamp(),
            reporter.host
        ));
    }

    pub fn dead_vote(&self, victim: &NodeId, voter: &NodeId, vote: bool) {
        self.log(&format!(
            "DEAD_VOTE {victim} voter {voter} vote {}",
            if vote { "yes" } else { "no" }
        ));
    }

    pub fn dead_confirmed(&self, victim: &NodeId) {
        self.log(&format!("DEAD_CONFIRMED {victim}"));
    }

    pub fn gossip_received_first_time(&self, from: &NodeId, payload: &str) {
        self.log(&format!("GOSSIP received (first time) from {from} payload {payload}"));
    }

    pub fn suspect_initiated(&self, victim: &NodeId) {
        self.log(&format!("SUSPECT_INITIATED {victim}"));
    }

    pub fn shutdown(&self) {
        self.log("SHUTDOWN");
    }

    /// Appends `line` verbatim, with no timestamp prefix — used for the
    /// NDJSON status snapshot, which carries its own `ts` field and would
    /// stop being valid JSON with one prepended.
    pub fn raw_line(&self, line: &str) {
        let mut stamped = String::with_capacity(line.len() + 1);
        stamped.push_str(line);
        stamped.push('\n');
        if let Err(e) = self
            .file
            .lock()
            .write_all(stamped.as_bytes())
            .map_err(|source| LogFileError::Write {
                path: self.path.clone(),
                source,
            })
        {
            tracing::warn!(error = %e, "failed to append status snapshot");
        }
    }

    fn log(&self, line: &str) {
        if let Err(e) = self.write_line(line) {
            tracing::warn!(error = %e, "failed to append to event log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expected_file_name_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let seed_log = EventLog::open(dir.path(), NodeKind::Seed, 6000).unwrap();
        let peer_log = EventLog::open(dir.path(), NodeKind::Peer, 7000).unwrap();

        assert!(dir.path().join("outputfile_seed_6000.txt").exists());
        assert!(dir.path().join("outputfile_peer_7000.txt").exists());

        seed_log.shutdown();
        peer_log.shutdown();
    }

    #[test]
    fn events_append_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path(), NodeKind::Peer, 7001).unwrap();
        let peer = NodeId::new("10.0.0.1", 7001);

        log.register_request(&peer);
        log.register_commit(&peer);

        let contents = std::fs::read_to_string(dir.path().join("outputfile_peer_7001.txt")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("REGISTER_REQUEST 10.0.0.1:7001"));
        assert!(lines[1].contains("REGISTER_COMMIT 10.0.0.1:7001"));
    }

    #[test]
    fn dead_report_line_matches_the_documented_shape() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path(), NodeKind::Peer, 7002).unwrap();
        let victim = NodeId::new("10.0.0.5", 7005);
        let reporter = NodeId::new("10.0.0.1", 7001);

        log.dead_report(&victim, &reporter);

        let contents = std::fs::read_to_string(dir.path().join("outputfile_peer_7002.txt")).unwrap();
        assert!(contents.contains("Dead Node:10.0.0.5:7005:"));
        assert!(contents.contains(":10.0.0.1"));
    }
}
