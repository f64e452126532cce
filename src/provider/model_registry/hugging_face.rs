//! # Hugging Face Hub
//!
//! Connectivity is an authenticated `whoami` call when a token is configured,
//! otherwise an anonymous model listing.

use super::ModelRegistryClient;
use crate::constants;
use crate::observability;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

pub struct HuggingFaceRegistry {
    client: Client,
    base_url: String,
    token: Zeroizing<String>,
}

impl fmt::Debug for HuggingFaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingFaceRegistry")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HuggingFaceRegistry {
    pub fn new(client: Client, url: &str, token: &str) -> Self {
        let url = url.trim().trim_end_matches('/');
        let base_url = if url.is_empty() {
            constants::DEFAULT_HUGGING_FACE_URL.to_string()
        } else {
            url.to_string()
        };

        Self {
            client,
            base_url,
            token: Zeroizing::new(token.trim().to_string()),
        }
    }

    async fn probe(&self) -> Result<()> {
        let request = if self.token.is_empty() {
            self.client
                .get(format!("{}/api/models", self.base_url))
                .query(&[("limit", "1")])
        } else {
            self.client
                .get(format!("{}/api/whoami-v2", self.base_url))
                .bearer_auth(self.token.as_str())
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach Hugging Face hub {}", self.base_url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("Hugging Face hub {} returned {status}", self.base_url);
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRegistryClient for HuggingFaceRegistry {
    async fn connect(&self) -> Result<()> {
        let result = self.probe().await;
        observability::metrics::record_registry_operation("hugging-face", "connect", result.is_ok());
        result
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn healthy_check(&self) -> bool {
        match self.probe().await {
            Ok(()) => {
                observability::metrics::record_registry_operation("hugging-face", "health", true);
                true
            }
            Err(e) => {
                debug!("Hugging Face health check failed: {:#}", e);
                observability::metrics::record_registry_operation("hugging-face", "health", false);
                false
            }
        }
    }
}
