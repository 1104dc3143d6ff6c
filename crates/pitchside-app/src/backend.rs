// The auth/storage/realtime backend seam.
//
// Everything the store needs from the backend-as-a-service goes through the
// `Backend` trait: session restore and change notifications, the three auth
// calls, the two table reads, one insert, and a row-change subscription on
// the streams table.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use pitchside_core::mapper::{AuthUser, MatchRow, StreamInsert, StreamRow};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("rejected by backend: {0}")]
    Rejected(String),

    #[error("backend unavailable")]
    Unavailable,
}

/// An authenticated session as reported by the auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

/// Session transitions pushed by the auth service.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthChange {
    SignedIn(AuthSession),
    SignedOut,
}

/// A row-level change on the streams table.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert(StreamRow),
    Update(StreamRow),
    Delete { id: String },
}

/// A live row-change feed. Dropping it (or calling `unsubscribe`) closes the
/// feed and stops any transport task behind it.
pub struct Subscription {
    changes: mpsc::Receiver<RowChange>,
    transport: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(changes: mpsc::Receiver<RowChange>, transport: Option<JoinHandle<()>>) -> Self {
        Subscription {
            changes,
            transport,
        }
    }

    /// Next change, or `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<RowChange> {
        self.changes.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.changes.close();
        if let Some(task) = self.transport.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// The session persisted by the auth service, if any.
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError>;

    /// A receiver for session transitions, starting from now.
    fn auth_changes(&self) -> broadcast::Receiver<AuthChange>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<(), BackendError>;

    /// Register an account with `name` and the `creator` role in its metadata.
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<(), BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// All streams, live ones first, then newest first.
    async fn fetch_streams(&self) -> Result<Vec<StreamRow>, BackendError>;

    /// All matches ordered by date ascending.
    async fn fetch_matches(&self) -> Result<Vec<MatchRow>, BackendError>;

    /// Insert one stream row and return it as stored (with its new id).
    async fn insert_stream(&self, row: StreamInsert) -> Result<StreamRow, BackendError>;

    /// Subscribe to insert/update/delete changes on the streams table. Changes
    /// are delivered through a channel bounded at `capacity`.
    async fn subscribe_streams(&self, capacity: usize) -> Result<Subscription, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsubscribe_closes_the_sender_side() {
        let (tx, rx) = mpsc::channel(4);
        let sub = Subscription::new(rx, None);
        assert!(!tx.is_closed());

        sub.unsubscribe();
        assert!(tx.is_closed());
        assert!(tx.send(RowChange::Delete { id: "1".into() }).await.is_err());
    }

    #[tokio::test]
    async fn dropping_a_subscription_aborts_its_transport() {
        let (_tx, rx) = mpsc::channel(4);
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let transport = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await
        });

        drop(Subscription::new(rx, Some(transport)));
        // The aborted task drops its future, and with it the sender.
        assert!(alive_rx.await.is_err());
    }
}
