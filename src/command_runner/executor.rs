//! # Executor
//!
//! Runs a local program and captures its combined output.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed with {status}")]
    ExitStatus {
        program: String,
        status: String,
        /// stdout followed by stderr
        output: Vec<u8>,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

impl ExecError {
    /// Whatever the program printed before failing
    pub fn output(&self) -> &[u8] {
        match self {
            ExecError::ExitStatus { output, .. } => output,
            ExecError::Spawn { .. } | ExecError::TimedOut { .. } => &[],
        }
    }
}

/// Local process execution
///
/// Returns stdout followed by stderr on success. There is no cancellation
/// argument: dropping the returned future cancels the call, and implementations
/// must stop the child when that happens (`ProcessExecutor` spawns with
/// `kill_on_drop`). Deadlines are applied by wrapping the call in
/// `tokio::time::timeout`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError>;
}

/// Executor backed by `tokio::process`
///
/// The child is killed if the returned future is dropped, so callers can
/// bound it with `tokio::time::timeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError> {
        debug!(program, arg_count = args.len(), "Executing local command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if output.status.success() {
            Ok(combined)
        } else {
            Err(ExecError::ExitStatus {
                program: program.to_string(),
                status: output.status.to_string(),
                output: combined,
            })
        }
    }
}
