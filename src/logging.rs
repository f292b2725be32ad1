//! Tracing subscriber setup for the binary.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` overrides the default `agent_flow=info` filter.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Default filter directive.
pub const DEFAULT_FILTER: &str = "agent_flow=info";

/// Filter directive used with `--verbose`.
pub const VERBOSE_FILTER: &str = "agent_flow=debug";

/// Builds the filter: `RUST_LOG` wins, then the verbosity default.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    })
}

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed (for example
/// by a test harness); the existing one is left in place.
pub fn init(verbose: bool, json: bool) -> bool {
    let layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(verbose))
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter(verbose))
            .boxed()
    };

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init(false, false);
        assert!(!init(true, true));
    }
}
