//! # Initialization
//!
//! Control plane initialization: rustls setup, tracing, metrics, probe server
//! startup, and construction of the storage client, domain clients and controllers.

use crate::command_runner::{Executor, ProcessExecutor};
use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::controller::{Controller, ImageRegistryController, ModelRegistryController};
use crate::observability;
use crate::provider::{DefaultModelRegistryFactory, RegistryV2Client};
use crate::storage::{RestStorage, Storage};
use anyhow::{Context, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Everything the run loop needs
#[derive(Debug)]
pub struct InitializationResult {
    pub config: ControllerConfig,
    /// Controllers to run, one per resource type
    pub controllers: Vec<Arc<dyn Controller>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub server_handle: JoinHandle<()>,
    /// Cancelled on SIGINT/SIGTERM; stops controllers and the probe server
    pub token: CancellationToken,
}

/// Install the tracing subscriber, honouring `RUST_LOG`
pub fn init_tracing() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleet_controller=info".into()),
        )
        .try_init()
    {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Initialize the control plane runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Storage and domain client creation
/// - Controller construction
pub async fn initialize() -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any client is built.
    // Fails only if a provider is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing();

    info!("Starting Fleet Controller v{}", env!("CARGO_PKG_VERSION"));

    let (config, server_config) = load_config();
    info!(
        workers = config.workers,
        sync_interval_secs = config.sync_interval_secs,
        requeue_on_error = config.requeue_on_error,
        storage_url = %config.storage_url,
        "Loaded controller configuration"
    );

    observability::metrics::register_metrics()?;

    let token = CancellationToken::new();

    // Start HTTP server for metrics and probes
    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let server_state = Arc::clone(&server_state);
        let token = token.clone();
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, server_state, token).await {
                error!("HTTP server error: {:#}", e);
            }
        })
    };

    // Wait for it to be ready before starting any controller
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let storage: Arc<dyn Storage> = Arc::new(
        RestStorage::new(
            &config.storage_url,
            config.storage_access_token.clone(),
            config.storage_timeout(),
        )
        .context("Failed to create storage client")?,
    );

    let executor: Arc<dyn Executor> = Arc::new(ProcessExecutor);
    let controllers = build_controllers(&config, storage, executor)?;

    info!(
        "Controllers initialized: {}",
        controllers
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(InitializationResult {
        config,
        controllers,
        server_state,
        server_handle,
        token,
    })
}

/// Build every resource controller against the given storage
///
/// # Errors
///
/// Returns an error if a domain client cannot be created.
pub fn build_controllers(
    config: &ControllerConfig,
    storage: Arc<dyn Storage>,
    executor: Arc<dyn Executor>,
) -> Result<Vec<Arc<dyn Controller>>> {
    let image_registry = ImageRegistryController::new(
        config,
        Arc::clone(&storage),
        Arc::new(RegistryV2Client::default()),
    );

    let model_registry = ModelRegistryController::new(
        config,
        storage,
        Arc::new(
            DefaultModelRegistryFactory::new(config, executor)
                .context("Failed to create model registry factory")?,
        ),
    );

    Ok(vec![Arc::new(image_registry), Arc::new(model_registry)])
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(server_config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        // Check if server task crashed
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        // Set by start_server once bound
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
