//! # fleetctl
//!
//! Operator CLI for the Fleet Controller.
//!
//! ## Usage
//!
//! ```bash
//! # Run a command on a node
//! fleetctl ssh --node-id n1 --ip 10.0.0.4 --user ubuntu --key ~/.ssh/id_ed25519 \
//!     --cluster c1 --env RAY_ADDRESS=auto -- ray status
//!
//! # Wait for a freshly provisioned node to accept SSH
//! fleetctl wait-ready --node-id n1 --ip 10.0.0.4 --user ubuntu --key ~/.ssh/id_ed25519 \
//!     --cluster c1 --timeout 300
//!
//! # List registries and their phases
//! fleetctl list image-registries --workspace default
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fleet_controller::command_runner::{ProcessExecutor, RunOptions, SshCommandRunner};
use fleet_controller::config::ControllerConfig;
use fleet_controller::model::NodeAuth;
use fleet_controller::storage::{ListOption, RestStorage, Storage};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Fleet Controller CLI
#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "Fleet Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a shell command on a node over SSH
    Ssh {
        #[command(flatten)]
        node: NodeArgs,
        /// Fail without output and skip the post-run shutdown on error
        #[arg(long)]
        exit_on_fail: bool,
        /// Environment exported before the command (KEY=VALUE, repeatable)
        #[arg(long = "env", value_parser = parse_env_pair)]
        environment: Vec<(String, String)>,
        /// Open a fresh connection instead of reusing the control master
        #[arg(long)]
        no_control_master: bool,
        /// Connect timeout and command deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Power the node off after the command
        #[arg(long)]
        shutdown_after_run: bool,
        /// Command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Wait until a node answers over SSH
    WaitReady {
        #[command(flatten)]
        node: NodeArgs,
        /// Seconds to keep polling
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// List resources and their phases
    List {
        kind: ResourceKind,
        /// Only show resources in this workspace
        #[arg(short, long)]
        workspace: Option<String>,
    },
}

#[derive(Args)]
struct NodeArgs {
    #[arg(long)]
    node_id: String,
    #[arg(long)]
    ip: String,
    #[arg(long)]
    user: String,
    /// Path to the SSH private key
    #[arg(long)]
    key: String,
    #[arg(long)]
    cluster: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum ResourceKind {
    ImageRegistries,
    ModelRegistries,
}

fn parse_env_pair(value: &str) -> Result<(String, String)> {
    let Some((key, val)) = value.split_once('=') else {
        bail!("expected KEY=VALUE, got '{value}'");
    };
    if key.is_empty() {
        bail!("environment variable name must not be empty");
    }
    Ok((key.to_string(), val.to_string()))
}

fn runner(node: NodeArgs) -> SshCommandRunner {
    SshCommandRunner::new(
        node.node_id,
        node.ip,
        NodeAuth::new(node.user, node.key),
        node.cluster,
        Arc::new(ProcessExecutor),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetctl=info,fleet_controller=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ssh {
            node,
            exit_on_fail,
            environment,
            no_control_master,
            timeout,
            shutdown_after_run,
            command,
        } => {
            let options = RunOptions {
                exit_on_fail,
                environment: environment.into_iter().collect::<BTreeMap<_, _>>(),
                use_control_master: !no_control_master,
                timeout: timeout.map(Duration::from_secs),
                override_key_path: None,
                override_user: None,
                shutdown_after_run,
            };
            ssh_command(runner(node), &command.join(" "), &options).await
        }
        Commands::WaitReady { node, timeout } => {
            let runner = runner(node);
            runner
                .wait_ready(Duration::from_secs(timeout))
                .await
                .context("Node did not become ready")?;
            println!("✅ Node {} is ready", runner.node_id());
            Ok(())
        }
        Commands::List { kind, workspace } => list_command(kind, workspace).await,
    }
}

async fn ssh_command(runner: SshCommandRunner, command: &str, options: &RunOptions) -> Result<()> {
    match runner.run(command, options).await {
        Ok(output) => {
            print!("{output}");
            Ok(())
        }
        Err(e) => {
            print!("{}", e.output());
            Err(e).context("Remote command failed")
        }
    }
}

async fn list_command(kind: ResourceKind, workspace: Option<String>) -> Result<()> {
    let config = ControllerConfig::from_env();
    let storage = RestStorage::new(
        &config.storage_url,
        config.storage_access_token.clone(),
        config.storage_timeout(),
    )
    .context("Failed to create storage client")?;

    let mut option = ListOption::default();
    if let Some(workspace) = workspace {
        option = option.eq("metadata->>workspace", workspace);
    }

    let rows: Vec<(i64, String, String, String)> = match kind {
        ResourceKind::ImageRegistries => storage
            .list_image_registry(&option)
            .await
            .context("Failed to list image registries")?
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    r.metadata.name.clone(),
                    r.phase().map(|p| p.to_string()).unwrap_or_default(),
                    r.status.error_message.clone(),
                )
            })
            .collect(),
        ResourceKind::ModelRegistries => storage
            .list_model_registry(&option)
            .await
            .context("Failed to list model registries")?
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    r.metadata.name.clone(),
                    r.phase().map(|p| p.to_string()).unwrap_or_default(),
                    r.status.error_message.clone(),
                )
            })
            .collect(),
    };

    if rows.is_empty() {
        println!("No resources found.");
        return Ok(());
    }

    println!("{:<8} {:<30} {:<12} {}", "ID", "NAME", "PHASE", "ERROR");
    println!("{}", "-".repeat(80));
    for (id, name, phase, error) in rows {
        let phase = if phase.is_empty() { "-".to_string() } else { phase };
        println!("{id:<8} {name:<30} {phase:<12} {error}");
    }
    Ok(())
}
