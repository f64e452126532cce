//! # BentoML Model Store
//!
//! File-backed model store. `file://` URLs name a local directory; `nfs://host/export`
//! URLs are mounted under the mount root, one directory per registry.

use super::ModelRegistryClient;
use crate::command_runner::Executor;
use crate::observability;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreLocation {
    Local(PathBuf),
    /// `host:/export` as understood by `mount -t nfs`
    Nfs(String),
}

fn parse_location(url: &str) -> Result<StoreLocation> {
    let url = url.trim();
    if let Some(path) = url.strip_prefix("file://") {
        if path.is_empty() {
            bail!("model store url {url} has no path");
        }
        return Ok(StoreLocation::Local(PathBuf::from(path)));
    }

    if let Some(rest) = url.strip_prefix("nfs://") {
        let (host, export) = rest
            .split_once('/')
            .with_context(|| format!("model store url {url} has no export path"))?;
        if host.is_empty() {
            bail!("model store url {url} has no host");
        }
        return Ok(StoreLocation::Nfs(format!("{host}:/{export}")));
    }

    bail!("unsupported model store url {url}: expected file:// or nfs://")
}

/// Mount directory for a registry, always a direct child of `mount_root`
fn mount_point(mount_root: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(dir)), None) => Ok(mount_root.join(dir)),
        _ => bail!("model registry name {name:?} is not a valid mount directory name"),
    }
}

pub struct BentoMlRegistry {
    name: String,
    location: StoreLocation,
    mount_point: PathBuf,
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for BentoMlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BentoMlRegistry")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("mount_point", &self.mount_point)
            .finish_non_exhaustive()
    }
}

impl BentoMlRegistry {
    /// # Errors
    ///
    /// Returns an error if the URL is neither `file://` nor `nfs://`, or if the
    /// name would place the mount point outside `mount_root`.
    pub fn new(
        name: &str,
        url: &str,
        mount_root: &Path,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            location: parse_location(url)?,
            mount_point: mount_point(mount_root, name)?,
            executor,
        })
    }

    fn store_path(&self) -> &Path {
        match &self.location {
            StoreLocation::Local(path) => path,
            StoreLocation::Nfs(_) => &self.mount_point,
        }
    }

    async fn is_mounted(&self) -> bool {
        let Ok(mounts) = tokio::fs::read_to_string("/proc/mounts").await else {
            return false;
        };
        let mount_point = self.mount_point.to_string_lossy();
        mounts
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|target| target == mount_point)
    }

    async fn mount(&self, source: &str) -> Result<()> {
        if self.is_mounted().await {
            debug!(registry = %self.name, "Model store already mounted");
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.mount_point)
            .await
            .with_context(|| format!("Failed to create mount point {}", self.mount_point.display()))?;

        let args = vec![
            "-t".to_string(),
            "nfs".to_string(),
            source.to_string(),
            self.mount_point.to_string_lossy().into_owned(),
        ];
        self.executor
            .execute("mount", &args)
            .await
            .with_context(|| format!("Failed to mount {source} at {}", self.mount_point.display()))?;

        info!(registry = %self.name, "Mounted model store {} at {}", source, self.mount_point.display());
        Ok(())
    }

    async fn try_connect(&self) -> Result<()> {
        match &self.location {
            StoreLocation::Local(path) => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .with_context(|| format!("Failed to access model store {}", path.display()))?;
                if !metadata.is_dir() {
                    bail!("model store {} is not a directory", path.display());
                }
                Ok(())
            }
            StoreLocation::Nfs(source) => self.mount(source).await,
        }
    }
}

#[async_trait]
impl ModelRegistryClient for BentoMlRegistry {
    async fn connect(&self) -> Result<()> {
        let result = self.try_connect().await;
        observability::metrics::record_registry_operation("bentoml", "connect", result.is_ok());
        result
    }

    async fn disconnect(&self) -> Result<()> {
        if matches!(self.location, StoreLocation::Local(_)) || !self.is_mounted().await {
            return Ok(());
        }

        let args = vec![self.mount_point.to_string_lossy().into_owned()];
        self.executor
            .execute("umount", &args)
            .await
            .with_context(|| format!("Failed to unmount {}", self.mount_point.display()))?;

        info!(registry = %self.name, "Unmounted model store at {}", self.mount_point.display());
        Ok(())
    }

    async fn healthy_check(&self) -> bool {
        let mounted = match self.location {
            StoreLocation::Local(_) => true,
            StoreLocation::Nfs(_) => self.is_mounted().await,
        };
        let healthy = mounted && tokio::fs::read_dir(self.store_path()).await.is_ok();
        observability::metrics::record_registry_operation("bentoml", "health", healthy);
        healthy
    }
}
