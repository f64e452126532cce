//! # Server Configuration
//!
//! Settings for the listener that serves `/metrics`, `/healthz` and `/readyz`
//! next to the controllers.

use super::env_var_or_default;

/// Metrics listener settings (`METRICS_PORT`, `SERVER_STARTUP_TIMEOUT_SECS`,
/// `SERVER_POLL_INTERVAL_MS`)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub metrics_port: u16,
    /// Startup fails if the listener is not bound within this many seconds
    pub startup_timeout_secs: u64,
    /// Delay between listener readiness checks at startup
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Read the listener settings, falling back to the defaults in `constants`
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }
}
