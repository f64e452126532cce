//! # Command Runner
//!
//! Execution of shell commands on remote cluster nodes over SSH.
//!
//! - `executor` - Local process execution seam (`ssh`, `mount`, `umount`)
//! - `options` - Per-invocation run options
//! - `ssh` - SSH runner with control-master reuse and post-run shutdown

mod executor;
mod options;
mod ssh;

pub use executor::{ExecError, Executor, ProcessExecutor};
#[cfg(test)]
pub use executor::MockExecutor;
pub use options::RunOptions;
pub use ssh::{RunnerError, SshCommandRunner};
