//! Node executor configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cluster receiving records created while this member owns the transaction
    pub default_cluster: i32,

    /// How many resolved log ids are remembered for duplicate and stale detection
    pub resolved_retention: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            default_cluster: 9,
            resolved_retention: 4096,
        }
    }
}

impl NodeConfig {
    pub fn with_default_cluster(mut self, cluster_id: i32) -> Self {
        self.default_cluster = cluster_id;
        self
    }

    pub fn with_resolved_retention(mut self, retention: usize) -> Self {
        self.resolved_retention = retention;
        self
    }
}
