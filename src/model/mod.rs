//! # Resource Model
//!
//! Records shared by every controller: identity, metadata, spec and a status
//! sub-document carrying a phase, a transition timestamp and an optional error message.
//!
//! Records are plain serde types mirroring the storage rows. They are also the
//! work items pushed through the controller queue, so they implement `Eq` and `Hash`.

mod image_registry;
mod model_registry;
mod node;

pub use image_registry::*;
pub use model_registry::*;
pub use node::*;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Metadata common to every resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Metadata {
    /// Human-readable unique name
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace: String,
    /// Soft-delete marker. Empty means the resource is live; any value means
    /// deletion was requested.
    #[serde(default, deserialize_with = "null_as_default")]
    pub deletion_timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub creation_timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub update_timestamp: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether deletion has been requested for this resource
    pub fn is_marked_for_deletion(&self) -> bool {
        !self.deletion_timestamp.is_empty()
    }
}

/// Storage rows may carry `null` for timestamps that were never set
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The implicit initial phase is stored as an empty string (or not at all)
pub(crate) fn empty_phase_as_none<'de, D, P>(deserializer: D) -> Result<Option<P>, D::Error>
where
    D: Deserializer<'de>,
    P: std::str::FromStr,
    P::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Error returned when a stored phase string is not one of the known phases
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} phase '{value}'")]
pub struct UnknownPhase {
    pub kind: &'static str,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_deletion_marker_presence() {
        let mut metadata = Metadata::new("r1");
        assert!(!metadata.is_marked_for_deletion());

        metadata.deletion_timestamp = "2024-01-01T00:00:00Z".to_string();
        assert!(metadata.is_marked_for_deletion());
    }

    #[test]
    fn test_metadata_null_timestamps() {
        let metadata: Metadata = serde_json::from_value(serde_json::json!({
            "name": "r1",
            "deletion_timestamp": null,
            "creation_timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(metadata.name, "r1");
        assert!(!metadata.is_marked_for_deletion());
        assert_eq!(metadata.creation_timestamp, "2024-01-01T00:00:00Z");
    }
}
