//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts, retry policy and cache sizes for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bounded wait for each member's phase-1 vote
    pub phase1_timeout: Duration,

    /// Bounded wait for each phase-2 attempt
    pub phase2_timeout: Duration,

    /// Phase-2 attempts per member before reporting a durability risk
    pub phase2_max_attempts: u32,

    /// Base delay between phase-2 attempts, multiplied by the attempt number
    pub phase2_retry_backoff: Duration,

    /// Committed responses remembered for idempotent resubmission
    pub completed_cache_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            phase1_timeout: Duration::from_secs(5),
            phase2_timeout: Duration::from_secs(5),
            phase2_max_attempts: 3,
            phase2_retry_backoff: Duration::from_millis(50),
            completed_cache_capacity: 1024,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_phase1_timeout(mut self, timeout: Duration) -> Self {
        self.phase1_timeout = timeout;
        self
    }

    pub fn with_phase2_timeout(mut self, timeout: Duration) -> Self {
        self.phase2_timeout = timeout;
        self
    }

    pub fn with_phase2_max_attempts(mut self, attempts: u32) -> Self {
        self.phase2_max_attempts = attempts.max(1);
        self
    }

    pub fn with_phase2_retry_backoff(mut self, backoff: Duration) -> Self {
        self.phase2_retry_backoff = backoff;
        self
    }

    pub fn with_completed_cache_capacity(mut self, capacity: usize) -> Self {
        self.completed_cache_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde() {
        let config = CoordinatorConfig::default()
            .with_phase1_timeout(Duration::from_millis(200))
            .with_phase2_max_attempts(0);
        assert_eq!(config.phase2_max_attempts, 1);

        let json = serde_json::to_string(&config).unwrap();
        let back: CoordinatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.phase1_timeout, Duration::from_millis(200));
        assert_eq!(back.completed_cache_capacity, 1024);
    }
}
