//! `tracing` subscriber setup.
//!
//! The library crates only emit `tracing` events; the embedding service
//! decides where they go. [`init_subscriber`] is the default wiring: compact
//! human-readable output on stderr, filtered by `RUST_LOG` or the configured
//! level.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum log level when `RUST_LOG` is unset (e.g. `"warn"`).
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default fails once a subscriber is installed
    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with JSON lines on stderr.
///
/// Meant for deployments that ship logs to a collector.
pub fn init_json_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}

/// Initialize the global subscriber in the configured format.
pub fn init_logging(level: &str, json: bool) {
    if json {
        init_json_subscriber(level);
    } else {
        init_subscriber(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
        init_logging("info", true);
        init_logging("trace", false);
    }
}
