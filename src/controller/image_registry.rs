//! # ImageRegistry Controller
//!
//! Phase machine for image registries:
//!
//! - Marked for deletion and already `DELETED`: remove the record
//! - Marked for deletion otherwise: write `DELETED`
//! - Otherwise: log in, then write `CONNECTED` or `FAILED` with the error message
//!
//! The status write after a login attempt happens on success and failure alike.

use super::base::BaseController;
use super::reconciler::{Controller, Reconciler};
use super::status::{error_message, transition_time};
use crate::config::ControllerConfig;
use crate::model::{ImageRegistry, ImageRegistryPhase, ImageRegistryStatus};
use crate::provider::{ImageRegistryClient, RegistryAuth};
use crate::storage::{ListOption, Storage};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const IMAGE_REGISTRY_CONTROLLER: &str = "image-registry";

pub struct ImageRegistryController {
    base: BaseController<ImageRegistry>,
    storage: Arc<dyn Storage>,
    client: Arc<dyn ImageRegistryClient>,
}

impl fmt::Debug for ImageRegistryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRegistryController")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl ImageRegistryController {
    pub fn new(
        config: &ControllerConfig,
        storage: Arc<dyn Storage>,
        client: Arc<dyn ImageRegistryClient>,
    ) -> Self {
        Self {
            base: BaseController::new(IMAGE_REGISTRY_CONTROLLER, config),
            storage,
            client,
        }
    }

    async fn connect_image_registry(&self, registry: &ImageRegistry) -> Result<()> {
        let auth = RegistryAuth::from_registry(registry);
        self.client
            .login(&auth)
            .await
            .context("image registry login failed")
    }

    async fn update_status(
        &self,
        registry: &mut ImageRegistry,
        phase: ImageRegistryPhase,
        err: Option<&anyhow::Error>,
    ) -> Result<()> {
        registry.status = ImageRegistryStatus {
            phase: Some(phase),
            last_transition_time: transition_time(),
            error_message: error_message(err),
        };

        self.storage
            .update_image_registry(&registry.id.to_string(), registry)
            .await
            .with_context(|| {
                format!(
                    "failed to update image registry {} status to {phase}",
                    registry.metadata.name
                )
            })
    }
}

#[async_trait]
impl Reconciler for ImageRegistryController {
    type Key = ImageRegistry;
    type Object = ImageRegistry;

    async fn list_objects(&self) -> Result<Vec<ImageRegistry>> {
        self.storage
            .list_image_registry(&ListOption::default())
            .await
            .context("failed to list image registries")
    }

    async fn process_object(&self, key: &ImageRegistry) -> Result<ImageRegistry> {
        if key.metadata.name.is_empty() {
            bail!("failed to assert image registry {}: missing name", key.id);
        }
        Ok(key.clone())
    }

    async fn sync(&self, mut registry: ImageRegistry) -> Result<()> {
        let name = registry.metadata.name.clone();

        if registry.metadata.is_marked_for_deletion() {
            if registry.phase() == Some(ImageRegistryPhase::Deleted) {
                info!(resource.name = %name, "Deleted image registry");
                self.storage
                    .delete_image_registry(&registry.id.to_string())
                    .await
                    .with_context(|| format!("failed to delete image registry {name}"))?;
                return Ok(());
            }

            info!(resource.name = %name, "Deleting image registry");
            return self
                .update_status(&mut registry, ImageRegistryPhase::Deleted, None)
                .await;
        }

        info!(resource.name = %name, "Connect to image registry");
        let result = self
            .connect_image_registry(&registry)
            .await
            .with_context(|| format!("failed to connect image registry {name}"));

        let phase = if result.is_ok() {
            ImageRegistryPhase::Connected
        } else {
            ImageRegistryPhase::Failed
        };
        if let Err(e) = self
            .update_status(&mut registry, phase, result.as_ref().err())
            .await
        {
            error!(resource.name = %name, "{:#}", e);
        }

        result
    }
}

#[async_trait]
impl Controller for ImageRegistryController {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(self: Arc<Self>, token: CancellationToken) {
        let base = self.base.clone();
        base.start(token, self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageRegistrySpec, Metadata, RegistryAuthConfig};
    use crate::provider::image_registry::MockImageRegistryClient;
    use crate::storage::{MockStorage, StorageError};

    fn registry(phase: Option<ImageRegistryPhase>, deleting: bool) -> ImageRegistry {
        let mut metadata = Metadata::new("r1");
        if deleting {
            metadata.deletion_timestamp = "2024-01-01T00:00:00Z".to_string();
        }
        ImageRegistry {
            id: 1,
            metadata,
            spec: ImageRegistrySpec {
                url: "registry.example.com".to_string(),
                authconfig: RegistryAuthConfig {
                    username: "u".to_string(),
                    password: "p".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            status: ImageRegistryStatus {
                phase,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn controller(storage: MockStorage, client: MockImageRegistryClient) -> ImageRegistryController {
        ImageRegistryController::new(
            &ControllerConfig::default(),
            Arc::new(storage),
            Arc::new(client),
        )
    }

    fn status_error() -> StorageError {
        StorageError::Status {
            operation: "update image_registries".to_string(),
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_login_success_writes_connected() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_image_registry()
            .withf(|id, registry| {
                id == "1"
                    && registry.status.phase == Some(ImageRegistryPhase::Connected)
                    && registry.status.error_message.is_empty()
                    && !registry.status.last_transition_time.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(()));
        storage.expect_delete_image_registry().never();

        let mut client = MockImageRegistryClient::new();
        client
            .expect_login()
            .withf(|auth| {
                auth.username == "u"
                    && auth.password == "p"
                    && auth.server_address == "registry.example.com"
            })
            .times(1)
            .returning(|_| Ok(()));

        controller(storage, client)
            .sync(registry(None, false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_failure_writes_failed_with_message() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_image_registry()
            .withf(|_, registry| {
                registry.status.phase == Some(ImageRegistryPhase::Failed)
                    && registry.status.error_message == "auth denied"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut client = MockImageRegistryClient::new();
        client
            .expect_login()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("auth denied")));

        let err = controller(storage, client)
            .sync(registry(Some(ImageRegistryPhase::Connected), false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to connect image registry r1"));
    }

    #[tokio::test]
    async fn test_status_written_again_when_phase_unchanged() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_image_registry()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut client = MockImageRegistryClient::new();
        client.expect_login().returning(|_| Ok(()));

        controller(storage, client)
            .sync(registry(Some(ImageRegistryPhase::Connected), false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_write_error_does_not_mask_login_error() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_image_registry()
            .times(1)
            .returning(|_, _| Err(status_error()));

        let mut client = MockImageRegistryClient::new();
        client
            .expect_login()
            .returning(|_| Err(anyhow::anyhow!("auth denied")));

        let err = controller(storage, client)
            .sync(registry(None, false))
            .await
            .unwrap_err();
        assert_eq!(err.root_cause().to_string(), "auth denied");
    }

    #[tokio::test]
    async fn test_status_write_error_after_success_is_swallowed() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_image_registry()
            .times(1)
            .returning(|_, _| Err(status_error()));

        let mut client = MockImageRegistryClient::new();
        client.expect_login().returning(|_| Ok(()));

        controller(storage, client)
            .sync(registry(None, false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deleted_phase_removes_record() {
        let mut storage = MockStorage::new();
        storage
            .expect_delete_image_registry()
            .withf(|id| id == "1")
            .times(1)
            .returning(|_| Ok(()));
        storage.expect_update_image_registry().never();

        let mut client = MockImageRegistryClient::new();
        client.expect_login().never();

        controller(storage, client)
            .sync(registry(Some(ImageRegistryPhase::Deleted), true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_marked_for_deletion_writes_deleted() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_image_registry()
            .withf(|_, registry| {
                registry.status.phase == Some(ImageRegistryPhase::Deleted)
                    && registry.status.error_message.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(()));
        storage.expect_delete_image_registry().never();

        let mut client = MockImageRegistryClient::new();
        client.expect_login().never();

        controller(storage, client)
            .sync(registry(Some(ImageRegistryPhase::Connected), true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_error_is_returned() {
        let mut storage = MockStorage::new();
        storage
            .expect_delete_image_registry()
            .returning(|_| Err(status_error()));

        let err = controller(storage, MockImageRegistryClient::new())
            .sync(registry(Some(ImageRegistryPhase::Deleted), true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to delete image registry r1"));
    }

    #[tokio::test]
    async fn test_process_object_rejects_missing_name() {
        let controller = controller(MockStorage::new(), MockImageRegistryClient::new());
        let mut unnamed = registry(None, false);
        unnamed.metadata.name = String::new();

        assert!(controller.process_object(&unnamed).await.is_err());
        assert_eq!(
            controller.process_object(&registry(None, false)).await.unwrap(),
            registry(None, false)
        );
    }

    #[tokio::test]
    async fn test_list_objects_wraps_storage_error() {
        let mut storage = MockStorage::new();
        storage
            .expect_list_image_registry()
            .returning(|_| Err(status_error()));

        let err = controller(storage, MockImageRegistryClient::new())
            .list_objects()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to list image registries"));
    }
}
