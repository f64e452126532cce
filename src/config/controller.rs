//! # Reconciliation Settings
//!
//! Worker pool, resync cadence and storage connection settings shared by every controller.

use super::{env_var_opt, env_var_or_default};
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Concurrent worker loops per controller
    pub workers: usize,
    /// Seconds between full resyncs
    pub sync_interval_secs: u64,
    /// Re-add failed items through the queue's rate limiter instead of
    /// waiting for the next resync
    pub requeue_on_error: bool,
    /// Base URL of the storage API
    pub storage_url: String,
    /// Bearer token sent to the storage API
    pub storage_access_token: Option<String>,
    /// Per-request storage timeout (seconds)
    pub storage_timeout_secs: u64,
    /// Mount root for NFS-backed model registries
    pub model_registry_mount_root: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            workers: DEFAULT_CONTROLLER_WORKERS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            requeue_on_error: false,
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            storage_access_token: None,
            storage_timeout_secs: DEFAULT_STORAGE_TIMEOUT_SECS,
            model_registry_mount_root: PathBuf::from(DEFAULT_MODEL_REGISTRY_MOUNT_ROOT),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            // A controller with no workers never drains its queue
            workers: env_var_or_default("CONTROLLER_WORKERS", DEFAULT_CONTROLLER_WORKERS).max(1),
            sync_interval_secs: env_var_or_default(
                "SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL_SECS,
            )
            .max(1),
            requeue_on_error: env_var_or_default("REQUEUE_ON_ERROR", false),
            storage_url: env_var_opt("STORAGE_URL")
                .unwrap_or_else(|| DEFAULT_STORAGE_URL.to_string()),
            storage_access_token: env_var_opt("STORAGE_ACCESS_TOKEN"),
            storage_timeout_secs: env_var_or_default(
                "STORAGE_TIMEOUT_SECS",
                DEFAULT_STORAGE_TIMEOUT_SECS,
            ),
            model_registry_mount_root: env_var_opt("MODEL_REGISTRY_MOUNT_ROOT")
                .map_or_else(|| PathBuf::from(DEFAULT_MODEL_REGISTRY_MOUNT_ROOT), PathBuf::from),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}
