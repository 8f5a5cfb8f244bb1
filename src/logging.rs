//! `tracing` subscriber setup.
//!
//! Logs go to stderr so that command output on stdout stays clean for
//! piping. `RUST_LOG` overrides the configured level.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .or_else(|_| EnvFilter::try_new("info"))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}
