//! # ImageRegistry
//!
//! Container image registry the control plane logs into on behalf of clusters.

use super::{empty_phase_as_none, Metadata, UnknownPhase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ImageRegistry record
///
/// # Example
///
/// ```json
/// {
///   "id": 1,
///   "metadata": { "name": "r1" },
///   "spec": {
///     "url": "registry.example.com",
///     "repository": "team",
///     "authconfig": { "username": "u", "password": "p" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ImageRegistry {
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub metadata: Metadata,
    pub spec: ImageRegistrySpec,
    #[serde(default)]
    pub status: ImageRegistryStatus,
}

impl ImageRegistry {
    /// Current phase, `None` before the first reconciliation
    pub fn phase(&self) -> Option<ImageRegistryPhase> {
        self.status.phase
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ImageRegistrySpec {
    /// Registry server address, with or without scheme
    pub url: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub authconfig: RegistryAuthConfig,
    /// PEM bundle trusted for this registry, if it uses a private CA
    #[serde(default)]
    pub ca: String,
}

/// Credentials for an image registry
#[derive(Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RegistryAuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub auth: String,
    #[serde(default)]
    pub identitytoken: String,
    #[serde(default)]
    pub registrytoken: String,
}

impl fmt::Debug for RegistryAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ImageRegistryStatus {
    #[serde(default, deserialize_with = "empty_phase_as_none")]
    pub phase: Option<ImageRegistryPhase>,
    /// RFC3339 timestamp with nanoseconds of the last phase write
    #[serde(default)]
    pub last_transition_time: String,
    #[serde(default)]
    pub error_message: String,
}

/// Phases of an image registry
///
/// `PENDING` is implicit: a registry without a phase has never been reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageRegistryPhase {
    Pending,
    Connected,
    Failed,
    Deleted,
}

impl ImageRegistryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRegistryPhase::Pending => "PENDING",
            ImageRegistryPhase::Connected => "CONNECTED",
            ImageRegistryPhase::Failed => "FAILED",
            ImageRegistryPhase::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ImageRegistryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageRegistryPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ImageRegistryPhase::Pending),
            "CONNECTED" => Ok(ImageRegistryPhase::Connected),
            "FAILED" => Ok(ImageRegistryPhase::Failed),
            "DELETED" => Ok(ImageRegistryPhase::Deleted),
            _ => Err(UnknownPhase {
                kind: "image registry",
                value: s.to_string(),
            }),
        }
    }
}
