use std::path::PathBuf;

use clap::Parser;
use overlay_core::logging::LogFormat;

/// Peer node: gossip dissemination over a preferential-attachment overlay.
#[derive(Debug, Parser)]
#[command(name = "overlay-peer", version, about)]
pub struct Cli {
    /// Host this peer binds and is addressed by.
    pub host: String,

    /// Port this peer listens on.
    pub port: u16,

    /// Seed list used for registration and peer-list queries,
    /// `<host>,<port>` per line.
    #[arg(long, env = "OVERLAY_CONFIG", default_value = "./config.csv")]
    pub config: PathBuf,

    /// Directory event log files are written to.
    #[arg(long, env = "OVERLAY_LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,

    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_the_two_required_positionals() {
        let cli = Cli::parse_from(["overlay-peer", "10.0.0.9", "7000"]);
        assert_eq!(cli.host, "10.0.0.9");
        assert_eq!(cli.port, 7000);
    }

    #[test]
    fn cli_structure_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
