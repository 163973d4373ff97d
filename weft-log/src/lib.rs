//! Logging bootstrap for weft binaries.
//!
//! Installs a [`tracing`] collector writing to stderr, filtered by the
//! `RUST_LOG` environment variable. Timestamps are ISO 8601 in the host's
//! local UTC offset. Frames and other tool output go to stdout, so the two
//! streams stay separable.

use time::{format_description::well_known::Iso8601, UtcOffset};
use tracing_subscriber::{
    filter::EnvFilter, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Filter used when `RUST_LOG` is unset.
///
/// Rig bring-up logs one line per configuration step at debug level; those
/// are the first lines an operator needs when a camera misbehaves, so they
/// are on by default.
pub const DEFAULT_FILTER: &str = "info,weft_rig=debug";

/// Install the global collector.
///
/// Panics if a global collector is already set.
pub fn init() {
    // Resolve the local UTC offset once, before any threads exist. When it
    // cannot be represented, timestamps fall back to UTC.
    let offset = UtcOffset::from_whole_seconds(chrono::Local::now().offset().local_minus_utc())
        .unwrap_or(UtcOffset::UTC);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(OffsetTime::new(offset, Iso8601::DEFAULT))
        .with_ansi(!cfg!(windows))
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(filter)
        .init();

    match std::env::var("RUST_LOG") {
        Ok(var) => tracing::debug!("logging to stderr with RUST_LOG=\"{var}\""),
        Err(_) => tracing::debug!("logging to stderr with default filter \"{DEFAULT_FILTER}\""),
    }
}
