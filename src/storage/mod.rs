//! # Storage
//!
//! Persistence of resource records. The controllers only need list, status update and
//! delete; creation and spec edits belong to the API layer.
//!
//! The storage layer is assumed to give per-record atomicity for update and delete,
//! with no cross-record transactions.

mod rest;

pub use rest::RestStorage;

use crate::model::{ImageRegistry, ModelRegistry};
use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Errors from the storage collaborator
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("storage returned {status} for {operation}: {body}")]
    Status {
        operation: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode {table} records: {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A single `column=op.value` filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub operator: String,
    pub value: String,
}

/// Filters applied to a list call; empty lists everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOption {
    pub filters: Vec<Filter>,
}

impl ListOption {
    /// Add an equality filter
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            operator: "eq".to_string(),
            value: value.into(),
        });
        self
    }

    pub(crate) fn query_pairs(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|f| (f.column.clone(), format!("{}.{}", f.operator, f.value)))
            .collect()
    }
}

/// Storage operations consumed by the controllers
///
/// IDs are passed in their canonical string form.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn list_image_registry(
        &self,
        option: &ListOption,
    ) -> Result<Vec<ImageRegistry>, StorageError>;

    /// Persist the status document of an image registry
    async fn update_image_registry(
        &self,
        id: &str,
        registry: &ImageRegistry,
    ) -> Result<(), StorageError>;

    async fn delete_image_registry(&self, id: &str) -> Result<(), StorageError>;

    async fn list_model_registry(
        &self,
        option: &ListOption,
    ) -> Result<Vec<ModelRegistry>, StorageError>;

    /// Persist the status document of a model registry
    async fn update_model_registry(
        &self,
        id: &str,
        registry: &ModelRegistry,
    ) -> Result<(), StorageError>;

    async fn delete_model_registry(&self, id: &str) -> Result<(), StorageError>;
}
