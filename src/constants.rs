//! # Constants
//!
//! Default values shared by configuration, controllers and the command runner.

/// Default number of concurrent worker loops per controller
pub const DEFAULT_CONTROLLER_WORKERS: usize = 5;

/// Default interval between full resyncs (seconds)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;

/// Default base URL of the storage API
pub const DEFAULT_STORAGE_URL: &str = "http://localhost:3000";

/// Default timeout for a single storage request (seconds)
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 30;

/// Default directory under which NFS-backed model registries are mounted
pub const DEFAULT_MODEL_REGISTRY_MOUNT_ROOT: &str = "/mnt/model-registry";

/// Default HTTP port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

// Work queue rate limiting, matching the usual controller defaults:
// per-item exponential backoff combined with an overall token bucket.

/// Base delay of the per-item exponential rate limiter (milliseconds)
pub const DEFAULT_ITEM_BACKOFF_BASE_MS: u64 = 5;

/// Maximum delay of the per-item exponential rate limiter (seconds)
pub const DEFAULT_ITEM_BACKOFF_MAX_SECS: u64 = 1000;

/// Overall token bucket refill rate (items per second)
pub const DEFAULT_BUCKET_QPS: f64 = 10.0;

/// Overall token bucket burst size
pub const DEFAULT_BUCKET_BURST: u32 = 100;

/// Storage table holding image registry records
pub const IMAGE_REGISTRY_TABLE: &str = "image_registries";

/// Storage table holding model registry records
pub const MODEL_REGISTRY_TABLE: &str = "model_registries";

/// Command issued on a node after a run with `shutdown_after_run`
pub const NODE_SHUTDOWN_COMMAND: &str = "sudo shutdown -h now";

/// How long an idle multiplexed SSH master connection stays open
pub const SSH_CONTROL_PERSIST: &str = "10s";

/// Seconds between SSH keepalive probes
pub const SSH_SERVER_ALIVE_INTERVAL_SECS: u64 = 5;

/// Missed keepalive probes before the connection is dropped
pub const SSH_SERVER_ALIVE_COUNT_MAX: u32 = 3;

/// Length of the hash fragments used in SSH control paths
pub const SSH_CONTROL_HASH_LENGTH: usize = 10;

/// Interval between node readiness probes (seconds)
pub const NODE_READY_POLL_INTERVAL_SECS: u64 = 5;

/// Default Hugging Face endpoint when a registry has no URL
pub const DEFAULT_HUGGING_FACE_URL: &str = "https://huggingface.co";

/// Timeout for domain client HTTP requests (seconds)
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 30;
