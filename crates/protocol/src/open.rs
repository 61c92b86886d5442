//! Session-open request
//!
//! Establishes the session context a begin-transaction request runs under.
//! Authentication itself is handled outside this crate.

use crate::codec::{self, Reader};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub client_id: String,
    pub use_token: bool,
    pub supports_push: bool,
    pub collect_stats: bool,
    pub database_name: String,
    pub user_name: String,
    pub user_password: String,
}

impl OpenRequest {
    pub fn new(
        database_name: impl Into<String>,
        user_name: impl Into<String>,
        user_password: impl Into<String>,
    ) -> Self {
        Self {
            client_id: String::new(),
            use_token: false,
            supports_push: true,
            collect_stats: true,
            database_name: database_name.into(),
            user_name: user_name.into(),
            user_password: user_password.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        codec::write_string(&mut out, &self.client_id)?;
        codec::write_bool(&mut out, self.use_token);
        codec::write_bool(&mut out, self.supports_push);
        codec::write_bool(&mut out, self.collect_stats);
        codec::write_string(&mut out, &self.database_name)?;
        codec::write_string(&mut out, &self.user_name)?;
        codec::write_string(&mut out, &self.user_password)?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let request = Self {
            client_id: reader.read_string("client id")?,
            use_token: reader.read_bool("use token")?,
            supports_push: reader.read_bool("supports push")?,
            collect_stats: reader.read_bool("collect stats")?,
            database_name: reader.read_string("database name")?,
            user_name: reader.read_string("user name")?,
            user_password: reader.read_string("user password")?,
        };
        reader.finish()?;
        Ok(request)
    }
}
