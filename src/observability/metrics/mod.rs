//! # Metrics Module
//!
//! Prometheus metrics for monitoring the control plane, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Engine metrics (reconciliations, errors, resyncs, queue depth)
//! - `provider_metrics` - Registry connectivity metrics (logins, connects, health checks)
//! - `runner_metrics` - Remote command metrics (SSH runs, node shutdowns)

pub mod controller_metrics;
pub mod provider_metrics;
pub mod registry;
pub mod runner_metrics;

pub use controller_metrics::*;
pub use provider_metrics::*;
pub use registry::*;
pub use runner_metrics::*;
