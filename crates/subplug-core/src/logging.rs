//! Tracing bootstrap for hosts and tests.
//!
//! The library only emits `tracing` events; nothing is printed unless the
//! host installs a subscriber, either its own or the one below.

use tracing_subscriber::EnvFilter;

use crate::config::env_vars;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "subplug_core=info";

/// Install a global `fmt` subscriber.
///
/// Honors `RUST_LOG`, and `SUBPLUG_LOG_JSON=true` for JSON lines. Returns
/// `false` when a global subscriber is already set.
pub fn init_tracing() -> bool {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init_tracing();
        assert!(!init_tracing());
    }
}
