//! # SSH Command Runner
//!
//! Runs shell commands on one cluster node through the local `ssh` client.
//!
//! Connections can be multiplexed over a per-node control master. The control
//! socket directory is derived from short hashes of the cluster and node names so
//! the socket path stays under the Unix socket length limit.

use super::executor::{ExecError, Executor};
use super::options::RunOptions;
use crate::constants;
use crate::model::NodeAuth;
use crate::observability;
use std::collections::BTreeMap;
use std::fmt;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

static ENV_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .expect("Failed to compile ENV_NAME regex - this should never happen")
});

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Failure of a command run with `exit_on_fail`
    #[error("command failed on node {node_id}")]
    Fatal {
        node_id: String,
        #[source]
        source: ExecError,
    },

    /// Failure of a command whose output is still returned to the caller
    #[error("SSH command failed on node {node_id}")]
    Remote {
        node_id: String,
        output: String,
        #[source]
        source: ExecError,
    },

    /// Environment variable name that is not a valid shell identifier
    #[error("invalid environment variable name {key:?} for node {node_id}")]
    InvalidEnvironment { node_id: String, key: String },

    #[error("node {node_id} did not become reachable within {waited:?}")]
    NotReady {
        node_id: String,
        waited: Duration,
        #[source]
        last_error: Option<Box<RunnerError>>,
    },
}

impl RunnerError {
    /// Output captured from the failed command; always empty for fatal failures
    pub fn output(&self) -> &str {
        match self {
            RunnerError::Remote { output, .. } => output,
            RunnerError::Fatal { .. }
            | RunnerError::InvalidEnvironment { .. }
            | RunnerError::NotReady { .. } => "",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RunnerError::Fatal { .. })
    }
}

/// Runs commands on a single node over SSH
pub struct SshCommandRunner {
    node_id: String,
    cluster_name: String,
    ssh_ip: String,
    ssh_user: String,
    ssh_private_key: String,
    ssh_control_path: PathBuf,
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for SshCommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCommandRunner")
            .field("node_id", &self.node_id)
            .field("cluster_name", &self.cluster_name)
            .field("ssh_ip", &self.ssh_ip)
            .field("ssh_user", &self.ssh_user)
            .field("ssh_control_path", &self.ssh_control_path)
            .finish_non_exhaustive()
    }
}

impl SshCommandRunner {
    pub fn new(
        node_id: impl Into<String>,
        ssh_ip: impl Into<String>,
        auth: NodeAuth,
        cluster_name: impl Into<String>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let node_id = node_id.into();
        let cluster_name = cluster_name.into();
        let ssh_control_path = std::env::temp_dir()
            .join(format!("fleet_ssh_{}", short_hash(&cluster_name)))
            .join(short_hash(&node_id));

        Self {
            node_id,
            cluster_name,
            ssh_ip: ssh_ip.into(),
            ssh_user: auth.ssh_user,
            ssh_private_key: auth.ssh_private_key,
            ssh_control_path,
            executor,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn ssh_ip(&self) -> &str {
        &self.ssh_ip
    }

    pub fn ssh_user(&self) -> &str {
        &self.ssh_user
    }

    pub fn ssh_private_key(&self) -> &str {
        &self.ssh_private_key
    }

    /// Directory holding this node's control master socket
    pub fn ssh_control_path(&self) -> &Path {
        &self.ssh_control_path
    }

    /// Base `ssh` options: relaxed host key checking, keepalives and the identity file
    ///
    /// An empty or missing override falls back to the node's configured key.
    pub fn ssh_options(&self, override_key_path: Option<&str>) -> Vec<String> {
        let key = override_key_path
            .filter(|path| !path.is_empty())
            .unwrap_or(&self.ssh_private_key);

        let mut options = Vec::new();
        for (name, value) in [
            ("StrictHostKeyChecking", "no".to_string()),
            ("UserKnownHostsFile", "/dev/null".to_string()),
            ("IdentitiesOnly", "yes".to_string()),
            ("ExitOnForwardFailure", "yes".to_string()),
            (
                "ServerAliveInterval",
                constants::SSH_SERVER_ALIVE_INTERVAL_SECS.to_string(),
            ),
            (
                "ServerAliveCountMax",
                constants::SSH_SERVER_ALIVE_COUNT_MAX.to_string(),
            ),
        ] {
            push_option(&mut options, name, &value);
        }

        options.push("-i".to_string());
        options.push(key.to_string());
        options
    }

    fn control_master_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        push_option(&mut options, "ControlMaster", "auto");
        push_option(
            &mut options,
            "ControlPath",
            &format!("{}/%C", self.ssh_control_path.display()),
        );
        push_option(&mut options, "ControlPersist", constants::SSH_CONTROL_PERSIST);
        options
    }

    async fn ensure_control_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.ssh_control_path).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                &self.ssh_control_path,
                std::fs::Permissions::from_mode(0o700),
            )
            .await?;
        }
        Ok(())
    }

    async fn build_args(&self, remote_command: String, options: &RunOptions) -> Vec<String> {
        let mut args = self.ssh_options(options.override_key_path.as_deref());

        if options.use_control_master {
            match self.ensure_control_dir().await {
                Ok(()) => args.extend(self.control_master_options()),
                Err(e) => warn!(
                    node_id = %self.node_id,
                    "Failed to prepare SSH control path {}, connecting without control master: {}",
                    self.ssh_control_path.display(),
                    e
                ),
            }
        }

        if let Some(timeout) = options.timeout {
            push_option(
                &mut args,
                "ConnectTimeout",
                &format!("{}s", timeout.as_secs().max(1)),
            );
        }

        let user = options
            .override_user
            .as_deref()
            .filter(|user| !user.is_empty())
            .unwrap_or(&self.ssh_user);
        args.push(format!("{user}@{}", self.ssh_ip));
        args.push(remote_command);
        args
    }

    async fn execute(&self, args: &[String], timeout: Option<Duration>) -> Result<Vec<u8>, ExecError> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.executor.execute("ssh", args))
                .await
                .unwrap_or_else(|_| {
                    Err(ExecError::TimedOut {
                        program: "ssh".to_string(),
                        timeout,
                    })
                }),
            None => self.executor.execute("ssh", args).await,
        }
    }

    /// Run `cmd` on the node
    ///
    /// # Errors
    ///
    /// With `exit_on_fail` a failure is returned as [`RunnerError::Fatal`] without
    /// output and the post-run shutdown is skipped. Otherwise a failure is returned
    /// as [`RunnerError::Remote`] carrying the command's output.
    ///
    /// Environment names must be shell identifiers; anything else is rejected with
    /// [`RunnerError::InvalidEnvironment`] before the node is contacted.
    pub async fn run(&self, cmd: &str, options: &RunOptions) -> Result<String, RunnerError> {
        let span = tracing::info_span!(
            "command_runner.ssh.run",
            node_id = %self.node_id,
            cluster = %self.cluster_name
        );

        async {
            if let Some(key) = options.environment.keys().find(|key| !is_env_name(key)) {
                return Err(RunnerError::InvalidEnvironment {
                    node_id: self.node_id.clone(),
                    key: key.clone(),
                });
            }

            let args = self
                .build_args(remote_command(cmd, &options.environment), options)
                .await;

            debug!("Running remote command: {}", cmd);
            let started = Instant::now();
            let result = self.execute(&args, options.timeout).await;
            observability::metrics::observe_remote_command_duration(
                started.elapsed().as_secs_f64(),
            );

            let outcome = match result {
                Ok(output) => {
                    observability::metrics::increment_remote_commands("success");
                    Ok(String::from_utf8_lossy(&output).into_owned())
                }
                Err(source) if options.exit_on_fail => {
                    observability::metrics::increment_remote_commands("fatal");
                    return Err(RunnerError::Fatal {
                        node_id: self.node_id.clone(),
                        source,
                    });
                }
                Err(source) => {
                    observability::metrics::increment_remote_commands("failed");
                    Err(RunnerError::Remote {
                        node_id: self.node_id.clone(),
                        output: String::from_utf8_lossy(source.output()).into_owned(),
                        source,
                    })
                }
            };

            if options.shutdown_after_run {
                self.shutdown(options).await;
            }

            outcome
        }
        .instrument(span)
        .await
    }

    /// Best-effort power-off; the connection usually drops mid-command
    async fn shutdown(&self, options: &RunOptions) {
        info!(node_id = %self.node_id, "Shutting down node after run");
        let args = self
            .build_args(constants::NODE_SHUTDOWN_COMMAND.to_string(), options)
            .await;

        match self.execute(&args, options.timeout).await {
            Ok(_) => observability::metrics::increment_node_shutdowns("success"),
            Err(e) => {
                observability::metrics::increment_node_shutdowns("failed");
                warn!(node_id = %self.node_id, "Node shutdown command failed: {}", e);
            }
        }
    }

    /// Poll the node with `uptime` until it answers or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotReady`] with the last failure once the deadline passes.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), RunnerError> {
        let poll_interval = Duration::from_secs(constants::NODE_READY_POLL_INTERVAL_SECS);
        let options = RunOptions::default()
            .use_control_master(true)
            .timeout(poll_interval);
        let started = Instant::now();

        loop {
            match self.run("uptime", &options).await {
                Ok(_) => {
                    info!(node_id = %self.node_id, "✅ Node is reachable over SSH");
                    return Ok(());
                }
                Err(e) => {
                    let waited = started.elapsed();
                    if waited + poll_interval > timeout {
                        return Err(RunnerError::NotReady {
                            node_id: self.node_id.clone(),
                            waited,
                            last_error: Some(Box::new(e)),
                        });
                    }
                    debug!(node_id = %self.node_id, "Node not reachable yet: {}", e);
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}

fn push_option(options: &mut Vec<String>, name: &str, value: &str) {
    options.push("-o".to_string());
    options.push(format!("{name}={value}"));
}

fn short_hash(value: &str) -> String {
    format!("{:x}", md5::compute(value))
        .chars()
        .take(constants::SSH_CONTROL_HASH_LENGTH)
        .collect()
}

fn is_env_name(key: &str) -> bool {
    ENV_NAME.is_match(key)
}

/// Prefix the command with `export` statements for the given environment
///
/// Keys must already have passed [`is_env_name`].
fn remote_command(cmd: &str, environment: &BTreeMap<String, String>) -> String {
    let mut command = String::new();
    for (key, value) in environment {
        command.push_str(&format!("export {key}={}; ", shell_quote(value)));
    }
    command.push_str(cmd);
    command
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | ',' | '='))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}
