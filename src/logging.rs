//! Tracing setup for the binary.
//!
//! Logs go to stderr so that reports written to stdout stay machine-readable.

use crate::error::{CartError, Result};
use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber.
///
/// `level` is used unless `RUST_LOG` is set. With `json` each event is one
/// JSON object per line; otherwise a human-readable format, colored only
/// when stderr is a terminal.
pub fn init(level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    installed.map_err(|e| CartError::InternalError(Box::new(e)))
}
