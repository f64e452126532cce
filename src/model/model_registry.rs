//! # ModelRegistry
//!
//! Model registry (Hugging Face hub or BentoML store) the control plane keeps connected.

use super::{empty_phase_as_none, Metadata, UnknownPhase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ModelRegistry {
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub metadata: Metadata,
    pub spec: ModelRegistrySpec,
    #[serde(default)]
    pub status: ModelRegistryStatus,
}

impl ModelRegistry {
    pub fn phase(&self) -> Option<ModelRegistryPhase> {
        self.status.phase
    }
}

#[derive(Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ModelRegistrySpec {
    #[serde(rename = "type")]
    pub registry_type: ModelRegistryType,
    #[serde(default)]
    pub url: String,
    /// Access token for hub registries; unused by file-backed registries
    #[serde(default)]
    pub credentials: String,
}

impl fmt::Debug for ModelRegistrySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistrySpec")
            .field("registry_type", &self.registry_type)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ModelRegistryType {
    #[default]
    #[serde(rename = "bentoml")]
    BentoMl,
    #[serde(rename = "hugging-face")]
    HuggingFace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ModelRegistryStatus {
    #[serde(default, deserialize_with = "empty_phase_as_none")]
    pub phase: Option<ModelRegistryPhase>,
    #[serde(default)]
    pub last_transition_time: String,
    #[serde(default)]
    pub error_message: String,
}

/// Phases of a model registry: `PENDING → CONNECTED ↔ FAILED`, plus `DELETED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelRegistryPhase {
    Pending,
    Connected,
    Failed,
    Deleted,
}

impl ModelRegistryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRegistryPhase::Pending => "PENDING",
            ModelRegistryPhase::Connected => "CONNECTED",
            ModelRegistryPhase::Failed => "FAILED",
            ModelRegistryPhase::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ModelRegistryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelRegistryPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ModelRegistryPhase::Pending),
            "CONNECTED" => Ok(ModelRegistryPhase::Connected),
            "FAILED" => Ok(ModelRegistryPhase::Failed),
            "DELETED" => Ok(ModelRegistryPhase::Deleted),
            _ => Err(UnknownPhase {
                kind: "model registry",
                value: s.to_string(),
            }),
        }
    }
}
