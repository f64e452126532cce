//! # Controller Loop
//!
//! Runs every controller until a shutdown signal arrives, then drains them.

use super::initialization::InitializationResult;
use crate::controller::Controller;
use anyhow::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run all controllers until SIGINT/SIGTERM
///
/// # Errors
///
/// Currently infallible; kept fallible for the binary's `main`.
pub async fn run_controller_loop(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        controllers,
        server_state,
        server_handle,
        token,
        ..
    } = init;

    let shutdown = {
        let token = token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            token.cancel();
        })
    };

    run_controllers(controllers, token).await;

    // Readiness goes false before the server stops accepting connections
    server_state.is_ready.store(false, Ordering::Relaxed);
    if let Err(e) = server_handle.await {
        error!("HTTP server task failed: {}", e);
    }
    shutdown.abort();

    info!("Fleet Controller stopped");
    Ok(())
}

/// Start each controller on its own task and wait for all of them to stop
pub async fn run_controllers(controllers: Vec<Arc<dyn Controller>>, token: CancellationToken) {
    let mut tasks = JoinSet::new();
    for controller in controllers {
        info!("Starting {} controller", controller.name());
        tasks.spawn(controller.start(token.clone()));
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("Controller task failed: {}", e);
            // One controller dying takes the process down with it
            token.cancel();
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
