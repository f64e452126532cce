//! # REST Storage Client
//!
//! PostgREST-style storage client.
//!
//! - List: `GET {base}/{table}?{column}=op.value`
//! - Update: `PATCH {base}/{table}?id=eq.{id}` with the status document
//! - Delete: `DELETE {base}/{table}?id=eq.{id}`

use super::{ListOption, Storage, StorageError};
use crate::constants::{IMAGE_REGISTRY_TABLE, MODEL_REGISTRY_TABLE};
use crate::model::{ImageRegistry, ModelRegistry};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Storage client speaking the PostgREST dialect over HTTP
#[derive(Debug, Clone)]
pub struct RestStorage {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl RestStorage {
    /// Create a new storage client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn list<T: DeserializeOwned>(
        &self,
        table: &'static str,
        option: &ListOption,
    ) -> Result<Vec<T>, StorageError> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*")])
            .query(&option.query_pairs());
        let response = check_status(
            self.authorize(request).send().await?,
            format!("list {table}"),
        )
        .await?;

        let body = response.bytes().await?;
        let records = decode_rows(table, &body)?;
        debug!("Listed {} records from {}", records.len(), table);
        Ok(records)
    }

    async fn update_status<S: Serialize + Sync>(
        &self,
        table: &'static str,
        id: &str,
        status: &S,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .json(&serde_json::json!({ "status": status }));
        check_status(
            self.authorize(request).send().await?,
            format!("update {table} {id}"),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, table: &'static str, id: &str) -> Result<(), StorageError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))]);
        check_status(
            self.authorize(request).send().await?,
            format!("delete {table} {id}"),
        )
        .await?;
        Ok(())
    }
}

/// Decode a list response row by row
///
/// A row that does not match the record type is logged and skipped so the rest of
/// the table keeps reconciling. Only a body that is not a JSON array fails.
fn decode_rows<T: DeserializeOwned>(table: &'static str, body: &[u8]) -> Result<Vec<T>, StorageError> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_slice(body).map_err(|source| StorageError::Decode { table, source })?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.get("id").cloned().unwrap_or(serde_json::Value::Null);
        match serde_json::from_value(row) {
            Ok(record) => records.push(record),
            Err(e) => warn!(table, id = %id, "Skipping undecodable record: {}", e),
        }
    }
    Ok(records)
}

async fn check_status(
    response: reqwest::Response,
    operation: String,
) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Status {
        operation,
        status,
        body,
    })
}

#[async_trait]
impl Storage for RestStorage {
    async fn list_image_registry(
        &self,
        option: &ListOption,
    ) -> Result<Vec<ImageRegistry>, StorageError> {
        self.list(IMAGE_REGISTRY_TABLE, option).await
    }

    async fn update_image_registry(
        &self,
        id: &str,
        registry: &ImageRegistry,
    ) -> Result<(), StorageError> {
        self.update_status(IMAGE_REGISTRY_TABLE, id, &registry.status)
            .await
    }

    async fn delete_image_registry(&self, id: &str) -> Result<(), StorageError> {
        self.delete(IMAGE_REGISTRY_TABLE, id).await
    }

    async fn list_model_registry(
        &self,
        option: &ListOption,
    ) -> Result<Vec<ModelRegistry>, StorageError> {
        self.list(MODEL_REGISTRY_TABLE, option).await
    }

    async fn update_model_registry(
        &self,
        id: &str,
        registry: &ModelRegistry,
    ) -> Result<(), StorageError> {
        self.update_status(MODEL_REGISTRY_TABLE, id, &registry.status)
            .await
    }

    async fn delete_model_registry(&self, id: &str) -> Result<(), StorageError> {
        self.delete(MODEL_REGISTRY_TABLE, id).await
    }
}
