//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events; embedding servers that do
//! not install their own subscriber can call [`init`] once at startup.

use tracing_subscriber::EnvFilter;

use crate::config::GeneralConfig;

/// Build the filter: `RUST_LOG` wins, then `general.log_level`, then `info`.
#[must_use]
pub fn env_filter(general: &GeneralConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already set (for example by
/// the host server or a previous call).
pub fn init(general: &GeneralConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(general))
        .with_target(true)
        .try_init()
        .is_ok()
}
