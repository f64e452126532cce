//! # Node Access
//!
//! Connection parameters for managed cluster nodes, sourced from a node's auth spec.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SSH credentials for a node
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeAuth {
    #[serde(default)]
    pub ssh_user: String,
    /// Path of the private key file handed to `ssh -i`
    #[serde(default)]
    pub ssh_private_key: String,
}

impl NodeAuth {
    pub fn new(ssh_user: impl Into<String>, ssh_private_key: impl Into<String>) -> Self {
        Self {
            ssh_user: ssh_user.into(),
            ssh_private_key: ssh_private_key.into(),
        }
    }
}

impl fmt::Debug for NodeAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeAuth")
            .field("ssh_user", &self.ssh_user)
            .finish_non_exhaustive()
    }
}
