//! Outbound message boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::envelope::Response;
use crate::error::SendError;
use crate::session::SessionId;

/// Delivers text payloads to sessions.
///
/// From the dispatcher's point of view sending is fire-and-forget: errors
/// are logged, never retried.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends `payload` to the session identified by `session_id`.
    async fn send(&self, session_id: &SessionId, payload: String) -> Result<(), SendError>;
}

/// A shared, type-erased message sender.
pub type BoxedSender = Arc<dyn MessageSender>;

/// Convenience methods on top of [`MessageSender`].
#[async_trait]
pub trait MessageSenderExt: MessageSender {
    /// Encodes `response` as JSON and sends it.
    async fn send_response<T>(
        &self,
        session_id: &SessionId,
        response: &Response<T>,
    ) -> Result<(), SendError>
    where
        T: Serialize + Sync,
    {
        let payload = response.to_json()?;
        self.send(session_id, payload).await
    }
}

impl<S: MessageSender + ?Sized> MessageSenderExt for S {}
