//! # Controller
//!
//! Reconciliation engine and the resource controllers built on it.
//!
//! ## Sub-modules
//!
//! - `rate_limiter` - Per-item backoff and token-bucket limiters
//! - `queue` - Deduplicating, rate-limited work queue
//! - `reconciler` - `Reconciler` and `Controller` traits
//! - `base` - Worker pool and periodic resync
//! - `status` - Status document helpers
//! - `image_registry` / `model_registry` - Resource phase machines
//! - `server` - Metrics and probe HTTP server

pub mod base;
pub mod image_registry;
pub mod model_registry;
pub mod queue;
pub mod rate_limiter;
pub mod reconciler;
pub mod server;
pub mod status;

pub use base::BaseController;
pub use image_registry::ImageRegistryController;
pub use model_registry::ModelRegistryController;
pub use queue::RateLimitingQueue;
pub use reconciler::{Controller, Reconciler};
