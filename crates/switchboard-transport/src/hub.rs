//! Live session registry.
//!
//! The [`SessionHub`] maps each connected session to the sending half of its
//! outbound channel. The transport registers a session when the socket opens
//! and removes it when the socket closes; everything else (the dispatcher,
//! handlers) only ever sends through the hub as a [`MessageSender`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use switchboard_core::{MessageSender, SendError, SessionId};

/// Registry of live sessions and their outbound channels.
#[derive(Debug, Default)]
pub struct SessionHub {
    sessions: RwLock<HashMap<SessionId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl SessionHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh session identifier (`s-1`, `s-2`, ...).
    pub fn next_session_id(&self) -> SessionId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        SessionId::new(format!("s-{n}"))
    }

    /// Registers `session_id` with a new outbound channel of `buffer` slots.
    ///
    /// Returns the receiving half, to be drained into the socket. A previous
    /// registration under the same id is replaced.
    pub fn register(&self, session_id: SessionId, buffer: usize) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        if self.sessions.write().insert(session_id.clone(), tx).is_some() {
            debug!(session_id = %session_id, "Replaced existing session registration");
        }
        trace!(session_id = %session_id, "Session registered");
        rx
    }

    /// Removes a session. Returns `true` if it was registered.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            trace!(session_id = %session_id, "Session removed");
        }
        removed
    }

    /// Returns `true` if the session is registered.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Identifiers of every registered session.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[async_trait]
impl MessageSender for SessionHub {
    async fn send(&self, session_id: &SessionId, payload: String) -> Result<(), SendError> {
        let tx = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SendError::SessionNotFound(session_id.to_string()))?;

        tx.send(payload)
            .await
            .map_err(|_| SendError::Closed(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_sequential() {
        let hub = SessionHub::new();
        assert_eq!(hub.next_session_id().as_str(), "s-1");
        assert_eq!(hub.next_session_id().as_str(), "s-2");
    }

    #[tokio::test]
    async fn test_send_reaches_registered_session() {
        let hub = SessionHub::new();
        let id = hub.next_session_id();
        let mut rx = hub.register(id.clone(), 4);

        hub.send(&id, "hello".into()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_send_to_unknown_session() {
        let hub = SessionHub::new();
        let err = hub.send(&SessionId::new("nope"), "x".into()).await.unwrap_err();
        assert!(matches!(err, SendError::SessionNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_send_to_closed_session() {
        let hub = SessionHub::new();
        let id = hub.next_session_id();
        drop(hub.register(id.clone(), 1));

        let err = hub.send(&id, "x".into()).await.unwrap_err();
        assert!(matches!(err, SendError::Closed(_)));
    }

    #[test]
    fn test_register_and_remove() {
        let hub = SessionHub::new();
        let id = SessionId::new("a");
        let _rx = hub.register(id.clone(), 8);
        assert!(hub.contains(&id));
        assert_eq!(hub.len(), 1);
        assert_eq!(hub.session_ids(), vec![id.clone()]);

        assert!(hub.remove(&id));
        assert!(!hub.remove(&id));
        assert!(hub.is_empty());
        assert!(hub.session_ids().is_empty());
    }

    #[tokio::test]
    async fn test_remove_lets_queued_payloads_drain() {
        let hub = SessionHub::new();
        let id = hub.next_session_id();
        let mut rx = hub.register(id.clone(), 4);
        hub.send(&id, "one".into()).await.unwrap();
        hub.send(&id, "two".into()).await.unwrap();

        assert!(hub.remove(&id));
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
        assert_eq!(rx.recv().await, None);
    }
}
