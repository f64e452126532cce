//! # Model Registry Clients
//!
//! One client per registry `type`, built from the resource spec by a factory.

mod bentoml;
mod hugging_face;

pub use bentoml::BentoMlRegistry;
pub use hugging_face::HuggingFaceRegistry;

use crate::command_runner::Executor;
use crate::config::ControllerConfig;
use crate::model::{ModelRegistry, ModelRegistryType};
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Connection to one model registry
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelRegistryClient: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn healthy_check(&self) -> bool;
}

/// Builds the client for a registry from its spec
#[cfg_attr(test, automock)]
pub trait ModelRegistryFactory: Send + Sync {
    fn create(&self, registry: &ModelRegistry) -> Result<Box<dyn ModelRegistryClient>>;
}

pub struct DefaultModelRegistryFactory {
    http: reqwest::Client,
    mount_root: PathBuf,
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for DefaultModelRegistryFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultModelRegistryFactory")
            .field("mount_root", &self.mount_root)
            .finish_non_exhaustive()
    }
}

impl DefaultModelRegistryFactory {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ControllerConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                crate::constants::DEFAULT_CLIENT_TIMEOUT_SECS,
            ))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            mount_root: config.model_registry_mount_root.clone(),
            executor,
        })
    }
}

impl ModelRegistryFactory for DefaultModelRegistryFactory {
    fn create(&self, registry: &ModelRegistry) -> Result<Box<dyn ModelRegistryClient>> {
        match registry.spec.registry_type {
            ModelRegistryType::HuggingFace => Ok(Box::new(HuggingFaceRegistry::new(
                self.http.clone(),
                &registry.spec.url,
                &registry.spec.credentials,
            ))),
            ModelRegistryType::BentoMl => Ok(Box::new(BentoMlRegistry::new(
                &registry.metadata.name,
                &registry.spec.url,
                &self.mount_root,
                Arc::clone(&self.executor),
            )?)),
        }
    }
}
