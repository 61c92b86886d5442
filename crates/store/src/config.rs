//! Store configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Keep an identity-map cache of recently read records
    pub cache_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
        }
    }
}

impl StoreConfig {
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }
}
