use std::path::PathBuf;

use clap::Parser;
use overlay_core::logging::LogFormat;

/// Seed node: majority-vote membership authority for the overlay network.
#[derive(Debug, Parser)]
#[command(name = "overlay-seed", version, about)]
pub struct Cli {
    /// Host this seed binds and is addressed by.
    pub host: String,

    /// Port this seed listens on.
    pub port: u16,

    /// Seed list naming every seed in the network, `<host>,<port>` per line.
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
        let cli = Cli::parse_from(["overlay-seed", "10.0.0.1", "6000"]);
        assert_eq!(cli.host, "10.0.0.1");
        assert_eq!(cli.port, 6000);
        assert_eq!(cli.config, PathBuf::from("./config.csv"));
    }

    #[test]
    fn cli_structure_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
