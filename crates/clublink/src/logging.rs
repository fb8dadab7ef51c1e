//! Log output for binaries built on clublink.
//!
//! Libraries only emit `tracing` events; installing a subscriber is the
//! binary's call.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber. `RUST_LOG` wins over `default_filter`
/// when set.
///
/// Calling this twice is harmless; the second call changes nothing.
///
/// ```no_run
/// clublink::logging::init("info,clublink_session=debug");
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
