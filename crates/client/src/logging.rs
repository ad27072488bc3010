//! Tracing subscriber setup
//!
//! Installs a global subscriber from `[log]` settings unless the embedding
//! application already installed one.

use shipper_config::{LogConfig, LogFormat, LogOutput};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Install the global tracing subscriber
///
/// `RUST_LOG`-style directives are not read; the level comes from the
/// config. Returns `false` if a global subscriber was already set, in which
/// case the existing one is kept.
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(config.level.as_str()).unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = match (config.format, config.output) {
        (LogFormat::Console, LogOutput::Stderr) => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Console, LogOutput::Stdout) => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(std::io::stdout)
            .boxed(),
        (LogFormat::Json, LogOutput::Stderr) => {
            fmt::layer().json().with_writer(std::io::stderr).boxed()
        }
        (LogFormat::Json, LogOutput::Stdout) => {
            fmt::layer().json().with_writer(std::io::stdout).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .is_ok()
}
