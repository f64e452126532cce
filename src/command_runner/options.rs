//! # Run Options

use std::collections::BTreeMap;
use std::time::Duration;

/// Options for a single remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Treat a failure as fatal: no output is returned and the node is not shut down
    pub exit_on_fail: bool,
    /// Exported in the remote shell before the command runs
    pub environment: BTreeMap<String, String>,
    /// Multiplex over a persistent per-node master connection
    pub use_control_master: bool,
    /// Connect timeout and overall deadline for the command
    pub timeout: Option<Duration>,
    /// Private key used instead of the node's configured key
    pub override_key_path: Option<String>,
    /// Remote user used instead of the node's configured user
    pub override_user: Option<String>,
    /// Power the node off once the command has finished
    pub shutdown_after_run: bool,
}

impl RunOptions {
    #[must_use]
    pub fn exit_on_fail(mut self, enabled: bool) -> Self {
        self.exit_on_fail = enabled;
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn use_control_master(mut self, enabled: bool) -> Self {
        self.use_control_master = enabled;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn override_key_path(mut self, path: impl Into<String>) -> Self {
        self.override_key_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn override_user(mut self, user: impl Into<String>) -> Self {
        self.override_user = Some(user.into());
        self
    }

    #[must_use]
    pub fn shutdown_after_run(mut self, enabled: bool) -> Self {
        self.shutdown_after_run = enabled;
        self
    }
}
