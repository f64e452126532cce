//! # ModelRegistry Controller
//!
//! Phase machine for model registries. A registry client is built from the spec on
//! every sync; a spec the factory rejects counts as a failed connection.
//!
//! | current phase        | action                  | target      |
//! |----------------------|-------------------------|-------------|
//! | none, `PENDING`      | connect                 | `CONNECTED` |
//! | `FAILED`             | disconnect, connect     | `CONNECTED` |
//! | `CONNECTED`          | health check            | `CONNECTED` |
//!
//! Any failure targets `FAILED`. The status is only written when the target phase
//! differs from the current one. A record marked for deletion is disconnected and
//! set to `DELETED`, or removed once it is already `DELETED`; removal needs no client.

use super::base::BaseController;
use super::reconciler::{Controller, Reconciler};
use super::status::{error_message, transition_time};
use crate::config::ControllerConfig;
use crate::model::{ModelRegistry, ModelRegistryPhase, ModelRegistryStatus};
use crate::provider::{ModelRegistryClient, ModelRegistryFactory};
use crate::storage::{ListOption, Storage};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const MODEL_REGISTRY_CONTROLLER: &str = "model-registry";

pub struct ModelRegistryController {
    base: BaseController<ModelRegistry>,
    storage: Arc<dyn Storage>,
    factory: Arc<dyn ModelRegistryFactory>,
}

impl fmt::Debug for ModelRegistryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistryController")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl ModelRegistryController {
    pub fn new(
        config: &ControllerConfig,
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ModelRegistryFactory>,
    ) -> Self {
        Self {
            base: BaseController::new(MODEL_REGISTRY_CONTROLLER, config),
            storage,
            factory,
        }
    }

    /// Drive a live registry one step from its current phase
    async fn reconcile_connection(
        &self,
        client: &dyn ModelRegistryClient,
        registry: &ModelRegistry,
    ) -> Result<()> {
        let name = &registry.metadata.name;

        match registry.phase() {
            // A DELETED phase without a deletion marker means the record was restored
            None | Some(ModelRegistryPhase::Pending | ModelRegistryPhase::Deleted) => {
                info!(resource.name = %name, "Connect model registry");
                client
                    .connect()
                    .await
                    .with_context(|| format!("failed to connect model registry {name}"))?;
            }
            Some(ModelRegistryPhase::Failed) => {
                info!(resource.name = %name, "Reconnect model registry");
                client
                    .disconnect()
                    .await
                    .with_context(|| format!("failed to disconnect model registry {name}"))?;
                client
                    .connect()
                    .await
                    .with_context(|| format!("failed to reconnect model registry {name}"))?;
            }
            Some(ModelRegistryPhase::Connected) => {
                if !client.healthy_check().await {
                    return Err(anyhow!("health check failed")
                        .context(format!("model registry {name} is unhealthy")));
                }
            }
        }

        Ok(())
    }

    async fn update_status(
        &self,
        registry: &mut ModelRegistry,
        phase: ModelRegistryPhase,
        err: Option<&anyhow::Error>,
    ) -> Result<()> {
        registry.status = ModelRegistryStatus {
            phase: Some(phase),
            last_transition_time: transition_time(),
            error_message: error_message(err),
        };

        self.storage
            .update_model_registry(&registry.id.to_string(), registry)
            .await
            .with_context(|| {
                format!(
                    "failed to update model registry {} status to {phase}",
                    registry.metadata.name
                )
            })
    }
}

#[async_trait]
impl Reconciler for ModelRegistryController {
    type Key = ModelRegistry;
    type Object = ModelRegistry;

    async fn list_objects(&self) -> Result<Vec<ModelRegistry>> {
        self.storage
            .list_model_registry(&ListOption::default())
            .await
            .context("failed to list model registries")
    }

    async fn process_object(&self, key: &ModelRegistry) -> Result<ModelRegistry> {
        if key.metadata.name.is_empty() {
            bail!("failed to assert model registry {}: missing name", key.id);
        }
        Ok(key.clone())
    }

    async fn sync(&self, mut registry: ModelRegistry) -> Result<()> {
        let name = registry.metadata.name.clone();

        if registry.metadata.is_marked_for_deletion() {
            if registry.phase() == Some(ModelRegistryPhase::Deleted) {
                info!(resource.name = %name, "Deleted model registry");
                self.storage
                    .delete_model_registry(&registry.id.to_string())
                    .await
                    .with_context(|| format!("failed to delete model registry {name}"))?;
                return Ok(());
            }

            info!(resource.name = %name, "Deleting model registry");
            match self.factory.create(&registry) {
                Ok(client) => client
                    .disconnect()
                    .await
                    .with_context(|| format!("failed to disconnect model registry {name}"))?,
                // A client that cannot be built never connected anything
                Err(e) => warn!(
                    resource.name = %name,
                    "Skipping disconnect of model registry without a usable client: {:#}",
                    e
                ),
            }
            return self
                .update_status(&mut registry, ModelRegistryPhase::Deleted, None)
                .await;
        }

        let current = registry.phase();
        let result = match self
            .factory
            .create(&registry)
            .with_context(|| format!("failed to create model registry client for {name}"))
        {
            Ok(client) => self.reconcile_connection(client.as_ref(), &registry).await,
            Err(e) => Err(e),
        };

        let target = if result.is_ok() {
            ModelRegistryPhase::Connected
        } else {
            ModelRegistryPhase::Failed
        };
        if current != Some(target) {
            if let Err(e) = self
                .update_status(&mut registry, target, result.as_ref().err())
                .await
            {
                error!(resource.name = %name, "{:#}", e);
            }
        }

        result
    }
}

#[async_trait]
impl Controller for ModelRegistryController {
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
    use crate::model::{Metadata, ModelRegistrySpec, ModelRegistryType};
    use crate::provider::model_registry::{MockModelRegistryClient, MockModelRegistryFactory};
    use crate::storage::MockStorage;
    use mockall::Sequence;

    fn registry(phase: Option<ModelRegistryPhase>, deleting: bool) -> ModelRegistry {
        let mut metadata = Metadata::new("m1");
        if deleting {
            metadata.deletion_timestamp = "2024-01-01T00:00:00Z".to_string();
        }
        ModelRegistry {
            id: 7,
            metadata,
            spec: ModelRegistrySpec {
                registry_type: ModelRegistryType::HuggingFace,
                url: "https://huggingface.co".to_string(),
                credentials: String::new(),
            },
            status: ModelRegistryStatus {
                phase,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn factory_for(client: MockModelRegistryClient) -> MockModelRegistryFactory {
        let mut factory = MockModelRegistryFactory::new();
        factory
            .expect_create()
            .times(1)
            .return_once(move |_| Ok(Box::new(client) as Box<dyn ModelRegistryClient>));
        factory
    }

    fn controller(
        storage: MockStorage,
        factory: MockModelRegistryFactory,
    ) -> ModelRegistryController {
        ModelRegistryController::new(
            &ControllerConfig::default(),
            Arc::new(storage),
            Arc::new(factory),
        )
    }

    fn expect_phase(storage: &mut MockStorage, phase: ModelRegistryPhase) {
        storage
            .expect_update_model_registry()
            .withf(move |id, registry| id == "7" && registry.status.phase == Some(phase))
            .times(1)
            .returning(|_, _| Ok(()));
    }

    #[tokio::test]
    async fn test_pending_connects() {
        let mut client = MockModelRegistryClient::new();
        client.expect_connect().times(1).returning(|| Ok(()));
        client.expect_disconnect().never();

        let mut storage = MockStorage::new();
        expect_phase(&mut storage, ModelRegistryPhase::Connected);

        controller(storage, factory_for(client))
            .sync(registry(None, false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_writes_failed() {
        let mut client = MockModelRegistryClient::new();
        client
            .expect_connect()
            .returning(|| Err(anyhow!("connection refused")));

        let mut storage = MockStorage::new();
        storage
            .expect_update_model_registry()
            .withf(|_, registry| {
                registry.status.phase == Some(ModelRegistryPhase::Failed)
                    && registry.status.error_message == "connection refused"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let err = controller(storage, factory_for(client))
            .sync(registry(Some(ModelRegistryPhase::Pending), false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to connect model registry m1"));
    }

    #[tokio::test]
    async fn test_failed_reconnects_in_order() {
        let mut seq = Sequence::new();
        let mut client = MockModelRegistryClient::new();
        client
            .expect_disconnect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        client
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut storage = MockStorage::new();
        expect_phase(&mut storage, ModelRegistryPhase::Connected);

        controller(storage, factory_for(client))
            .sync(registry(Some(ModelRegistryPhase::Failed), false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_reconnect_failure_skips_status_write() {
        let mut client = MockModelRegistryClient::new();
        client.expect_disconnect().returning(|| Ok(()));
        client
            .expect_connect()
            .returning(|| Err(anyhow!("still down")));

        let mut storage = MockStorage::new();
        storage.expect_update_model_registry().never();

        assert!(controller(storage, factory_for(client))
            .sync(registry(Some(ModelRegistryPhase::Failed), false))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_healthy_connected_skips_status_write() {
        let mut client = MockModelRegistryClient::new();
        client.expect_healthy_check().times(1).returning(|| true);
        client.expect_connect().never();

        let mut storage = MockStorage::new();
        storage.expect_update_model_registry().never();

        controller(storage, factory_for(client))
            .sync(registry(Some(ModelRegistryPhase::Connected), false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unhealthy_connected_writes_failed() {
        let mut client = MockModelRegistryClient::new();
        client.expect_healthy_check().times(1).returning(|| false);

        let mut storage = MockStorage::new();
        storage
            .expect_update_model_registry()
            .withf(|_, registry| {
                registry.status.phase == Some(ModelRegistryPhase::Failed)
                    && registry.status.error_message == "health check failed"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let err = controller(storage, factory_for(client))
            .sync(registry(Some(ModelRegistryPhase::Connected), false))
            .await
            .unwrap_err();
        assert_eq!(err.root_cause().to_string(), "health check failed");
    }

    #[tokio::test]
    async fn test_marked_for_deletion_disconnects_and_writes_deleted() {
        let mut client = MockModelRegistryClient::new();
        client.expect_disconnect().times(1).returning(|| Ok(()));

        let mut storage = MockStorage::new();
        expect_phase(&mut storage, ModelRegistryPhase::Deleted);
        storage.expect_delete_model_registry().never();

        controller(storage, factory_for(client))
            .sync(registry(Some(ModelRegistryPhase::Connected), true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_failure_leaves_phase_untouched() {
        let mut client = MockModelRegistryClient::new();
        client
            .expect_disconnect()
            .returning(|| Err(anyhow!("device busy")));

        let mut storage = MockStorage::new();
        storage.expect_update_model_registry().never();

        let err = controller(storage, factory_for(client))
            .sync(registry(Some(ModelRegistryPhase::Connected), true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to disconnect model registry m1"));
    }

    #[tokio::test]
    async fn test_deleted_phase_removes_record() {
        let mut factory = MockModelRegistryFactory::new();
        factory.expect_create().never();

        let mut storage = MockStorage::new();
        storage
            .expect_delete_model_registry()
            .withf(|id| id == "7")
            .times(1)
            .returning(|_| Ok(()));
        storage.expect_update_model_registry().never();

        controller(storage, factory)
            .sync(registry(Some(ModelRegistryPhase::Deleted), true))
            .await
            .unwrap();
    }

    fn failing_factory() -> MockModelRegistryFactory {
        let mut factory = MockModelRegistryFactory::new();
        factory
            .expect_create()
            .times(1)
            .returning(|_| Err(anyhow!("unsupported model store url")));
        factory
    }

    #[tokio::test]
    async fn test_factory_error_writes_failed() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_model_registry()
            .withf(|_, registry| {
                registry.status.phase == Some(ModelRegistryPhase::Failed)
                    && registry.status.error_message == "unsupported model store url"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        storage.expect_delete_model_registry().never();

        let err = controller(storage, failing_factory())
            .sync(registry(None, false))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to create model registry client for m1"));
    }

    #[tokio::test]
    async fn test_factory_error_on_failed_registry_skips_write() {
        let mut storage = MockStorage::new();
        storage.expect_update_model_registry().never();

        assert!(controller(storage, failing_factory())
            .sync(registry(Some(ModelRegistryPhase::Failed), false))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_factory_error_does_not_block_deletion() {
        let mut storage = MockStorage::new();
        expect_phase(&mut storage, ModelRegistryPhase::Deleted);
        storage.expect_delete_model_registry().never();

        controller(storage, failing_factory())
            .sync(registry(Some(ModelRegistryPhase::Failed), true))
            .await
            .unwrap();
    }
}
