//! Transaction log identifier
//!
//! Log ids are assigned by the coordinator from a single atomic counter and
//! totally order transactions across the member set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinator-assigned, strictly increasing transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogId(u64);

impl LogId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse from the decimal string form used in message headers
    pub fn parse(s: &str) -> Result<Self, String> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| format!("Invalid log id {}: {}", s, e))
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let id = LogId::new(42);
        let parsed = LogId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ordering() {
        assert!(LogId::new(1) < LogId::new(2));
        assert!(LogId::parse("not-a-number").is_err());
    }
}
