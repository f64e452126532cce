//! # Fleet Controller
//!
//! Runs the image registry and model registry controllers against the configured
//! storage until SIGINT/SIGTERM.
//!
//! See the library documentation for configuration and architecture.

use anyhow::Result;
use fleet_controller::runtime::{initialize, run_controller_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;
    run_controller_loop(init_result).await
}
