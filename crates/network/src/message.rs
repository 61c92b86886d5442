//! Request and reply messages on the member network

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tessera_common::LogId;

/// Header naming the sender of a message
pub const FROM_HEADER: &str = "from";

/// Header carrying the transaction log id on node traffic
pub const LOG_ID_HEADER: &str = "log_id";

/// Encoded body plus correlation headers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl Message {
    pub fn new(body: Vec<u8>, headers: HashMap<String, String>) -> Self {
        Self { body, headers }
    }

    pub fn with_body(body: Vec<u8>) -> Self {
        Self::new(body, HashMap::new())
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|s| s.as_str())
    }

    /// Sender named in the `from` header
    pub fn sender(&self) -> Option<&str> {
        self.get_header(FROM_HEADER)
    }

    /// Log id in the `log_id` header, if present and well formed
    pub fn log_id(&self) -> Option<LogId> {
        self.get_header(LOG_ID_HEADER)
            .and_then(|value| LogId::parse(value).ok())
    }
}

impl From<Vec<u8>> for Message {
    fn from(body: Vec<u8>) -> Self {
        Message::with_body(body)
    }
}
