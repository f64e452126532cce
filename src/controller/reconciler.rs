//! # Reconciler Capability
//!
//! The narrow interface the engine drives. Each resource type supplies one
//! implementation; the engine never sees resource-specific detail.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Domain behaviour for one resource type
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Work item pushed through the queue
    type Key: Clone + Eq + Hash + Send + Sync + Debug + 'static;
    /// Concrete object handed to `sync`
    type Object: Send;

    /// List every resource of this type
    async fn list_objects(&self) -> Result<Vec<Self::Key>>;

    /// Resolve and validate a dequeued key into the object to reconcile
    async fn process_object(&self, key: &Self::Key) -> Result<Self::Object>;

    /// Drive the object's state machine one step and persist its status
    async fn sync(&self, object: Self::Object) -> Result<()>;
}

/// A runnable resource controller
#[async_trait]
pub trait Controller: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Run until the token is cancelled
    async fn start(self: Arc<Self>, token: CancellationToken);
}
