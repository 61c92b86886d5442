//! Client-facing byte endpoint
//!
//! A client first opens a session, then sends begin-transaction requests
//! under it. Credentials are accepted as given; authentication belongs to
//! the session layer in front of this endpoint.

use crate::coordinator::Coordinator;
use crate::error::{CoordinatorError, Result};
use parking_lot::Mutex;
use tessera_common::MemberId;
use tessera_protocol::{BeginTransactionRequest, OpenRequest};

/// Context established by a session-open request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub client_id: String,
    pub database_name: String,
    pub user_name: String,
    pub use_token: bool,
    pub supports_push: bool,
    pub collect_stats: bool,
}

impl Coordinator {
    /// Decode a begin-transaction request, run it, and encode the response
    ///
    /// Malformed input is returned as an error and never reaches a member.
    pub async fn handle_begin_transaction(
        &self,
        bytes: &[u8],
        members: Vec<MemberId>,
    ) -> Result<Vec<u8>> {
        let request = BeginTransactionRequest::decode(bytes)?;
        let response = self.submit_request(request, members).await?;
        Ok(response.encode()?)
    }
}

/// One client connection to the coordinator
pub struct ClientEndpoint {
    coordinator: Coordinator,
    session: Mutex<Option<SessionContext>>,
}

impl ClientEndpoint {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            session: Mutex::new(None),
        }
    }

    pub fn open(&self, bytes: &[u8]) -> Result<SessionContext> {
        let request = OpenRequest::decode(bytes)?;
        if request.database_name.is_empty() {
            return Err(CoordinatorError::InvalidSession(
                "database name is required".to_string(),
            ));
        }

        let context = SessionContext {
            client_id: request.client_id,
            database_name: request.database_name,
            user_name: request.user_name,
            use_token: request.use_token,
            supports_push: request.supports_push,
            collect_stats: request.collect_stats,
        };
        tracing::info!(
            "Session opened for {} on {} by {}",
            context.client_id,
            context.database_name,
            context.user_name
        );
        *self.session.lock() = Some(context.clone());
        Ok(context)
    }

    pub fn session(&self) -> Option<SessionContext> {
        self.session.lock().clone()
    }

    pub async fn begin_transaction(&self, bytes: &[u8], members: Vec<MemberId>) -> Result<Vec<u8>> {
        if self.session.lock().is_none() {
            return Err(CoordinatorError::NoSession);
        }
        self.coordinator.handle_begin_transaction(bytes, members).await
    }

    pub fn close(&self) {
        if let Some(context) = self.session.lock().take() {
            tracing::info!("Session closed for {}", context.client_id);
        }
    }
}
