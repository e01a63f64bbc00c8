//! `tracing` initialization shared by both binaries.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Stdout log rendering. Pretty is for a human watching a terminal; JSON is
/// for piping into whatever's aggregating logs across a multi-node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Installs a global `tracing` subscriber. `RUST_LOG` (or the default
/// `info`) drives the filter; `format` picks the renderer.
pub fn init(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).boxed())
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().boxed())
            .init(),
    }
}
