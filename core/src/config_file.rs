//! # Seed Configuration File
//!
//! `config.csv` is a flat, headerless `<host>,<port>` list naming every
//! seed in the network. It's read once at startup; file order becomes the
//! canonical seed ordering every tiebreak rule refers to. The format is too
//! small to earn a general CSV dependency — two fields, no quoting, no
//! escaping.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::identity::NodeId;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: expected \"<host>,<port>\", got {text:?}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("{path}:{line}: invalid port {text:?}")]
    InvalidPort {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("config file {0} names no seeds")]
    Empty(PathBuf),
}

/// Reads the seed list, preserving file order.
pub fn read_seed_list(path: &Path) -> Result<Vec<NodeId>, ConfigFileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seeds = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let (host, port_text) = line.split_once(',').ok_or_else(|| ConfigFileError::MalformedLine {
            path: path.to_path_buf(),
            line: idx + 1,
            text: line.to_string(),
        })?;
        let host = host.trim();
        let port_text = port_text.trim();
        if host.is_empty() {
            return Err(ConfigFileError::MalformedLine {
                path: path.to_path_buf(),
                line: idx + 1,
                text: line.to_string(),
            });
        }
        let port: u16 = port_text.parse().map_err(|_| ConfigFileError::InvalidPort {
            path: path.to_path_buf(),
            line: idx + 1,
            text: port_text.to_string(),
        })?;
        seeds.push(NodeId::new(host, port));
    }

    if seeds.is_empty() {
        return Err(ConfigFileError::Empty(path.to_path_buf()));
    }

    Ok(seeds)
}
