// In-process backend: accounts, a session, the two tables and a change feed,
// all held in memory. Used by the offline binary and by tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use pitchside_core::mapper::{AuthUser, MatchRow, StreamInsert, StreamRow, UserMetadata};
use pitchside_core::model::{Role, Stream};
use pitchside_core::seed::seed_streams;

use crate::backend::{AuthChange, AuthSession, Backend, BackendError, RowChange, Subscription};

struct Account {
    password: String,
    user: AuthUser,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    session: Option<AuthSession>,
    /// Stream rows with their insertion sequence, used for recency ordering.
    streams: Vec<(u64, StreamRow)>,
    matches: Vec<MatchRow>,
    subscribers: Vec<mpsc::Sender<RowChange>>,
    seq: u64,
    offline: bool,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline {
            Err(BackendError::Unavailable)
        } else {
            Ok(())
        }
    }
}

pub struct MemoryBackend {
    inner: Mutex<Inner>,
    auth_tx: broadcast::Sender<AuthChange>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An empty backend: no accounts, no rows, nobody signed in.
    pub fn new() -> Self {
        let (auth_tx, _) = broadcast::channel(32);
        MemoryBackend {
            inner: Mutex::new(Inner::default()),
            auth_tx,
        }
    }

    /// A backend holding the demo stream list and no matches.
    pub fn seeded() -> Self {
        let backend = Self::new();
        backend.set_streams(seed_streams());
        backend
    }

    /// Replace the streams table. The first entry is treated as the newest.
    pub fn set_streams(&self, streams: Vec<Stream>) {
        let mut inner = self.lock();
        inner.streams.clear();
        for stream in streams.into_iter().rev() {
            let seq = inner.next_seq();
            inner.streams.push((seq, row_from_stream(&stream)));
        }
    }

    pub fn set_matches(&self, rows: Vec<MatchRow>) {
        self.lock().matches = rows;
    }

    /// Register an account that can later sign in.
    pub fn add_account(&self, email: &str, password: &str, name: &str, role: Role) -> String {
        let mut inner = self.lock();
        let id = format!("user-{}", inner.next_seq());
        let role = match role {
            Role::Viewer => "viewer",
            Role::Creator => "creator",
        };
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: AuthUser {
                    id: id.clone(),
                    email: Some(email.to_string()),
                    user_metadata: UserMetadata {
                        name: Some(name.to_string()),
                        role: Some(role.to_string()),
                    },
                },
            },
        );
        id
    }

    /// Mark an existing account as signed in without broadcasting, as if the
    /// session had been persisted by an earlier run.
    pub fn restore_session(&self, email: &str) -> bool {
        let mut inner = self.lock();
        let Some(user) = inner.accounts.get(email).map(|a| a.user.clone()) else {
            return false;
        };
        inner.session = Some(session_for(user));
        true
    }

    /// Make every subsequent call fail with `BackendError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of live change subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    /// Apply an update to a stored row and publish it, as another client
    /// would. Unknown ids are published anyway.
    pub async fn update_stream(&self, row: StreamRow) {
        {
            let mut inner = self.lock();
            if let Some((_, stored)) = inner
                .streams
                .iter_mut()
                .find(|(_, r)| r.id.is_some() && r.id == row.id)
            {
                *stored = row.clone();
            }
        }
        self.publish(RowChange::Update(row)).await;
    }

    /// Delete a stored row and publish the deletion.
    pub async fn delete_stream(&self, id: &str) {
        self.lock()
            .streams
            .retain(|(_, r)| r.id.as_deref() != Some(id));
        self.publish(RowChange::Delete { id: id.to_string() }).await;
    }

    /// Deliver a change to every open subscriber, in subscription order.
    pub async fn publish(&self, change: RowChange) {
        let subscribers = {
            let mut inner = self.lock();
            inner.subscribers.retain(|tx| !tx.is_closed());
            inner.subscribers.clone()
        };
        for tx in subscribers {
            if tx.send(change.clone()).await.is_err() {
                debug!("Dropping change for a closed subscriber");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn broadcast(&self, change: AuthChange) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.auth_tx.send(change);
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let inner = self.lock();
        inner.check_online()?;
        Ok(inner.session.clone())
    }

    fn auth_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.auth_tx.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<(), BackendError> {
        let session = {
            let mut inner = self.lock();
            inner.check_online()?;
            let user = match inner.accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(BackendError::Auth("Invalid login credentials".into())),
            };
            let session = session_for(user);
            inner.session = Some(session.clone());
            session
        };
        info!("Signed in {}", email);
        self.broadcast(AuthChange::SignedIn(session));
        Ok(())
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<(), BackendError> {
        {
            let inner = self.lock();
            inner.check_online()?;
            if inner.accounts.contains_key(email) {
                return Err(BackendError::Auth("User already registered".into()));
            }
        }
        if password.len() < 6 {
            return Err(BackendError::Auth(
                "Password should be at least 6 characters".into(),
            ));
        }
        self.add_account(email, password, name, Role::Creator);
        self.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        {
            let mut inner = self.lock();
            inner.check_online()?;
            inner.session = None;
        }
        self.broadcast(AuthChange::SignedOut);
        Ok(())
    }

    async fn fetch_streams(&self) -> Result<Vec<StreamRow>, BackendError> {
        let inner = self.lock();
        inner.check_online()?;
        let mut rows: Vec<&(u64, StreamRow)> = inner.streams.iter().collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            let live_a = a.is_live.unwrap_or(false);
            let live_b = b.is_live.unwrap_or(false);
            live_b.cmp(&live_a).then(seq_b.cmp(seq_a))
        });
        Ok(rows.into_iter().map(|(_, row)| row.clone()).collect())
    }

    async fn fetch_matches(&self) -> Result<Vec<MatchRow>, BackendError> {
        let inner = self.lock();
        inner.check_online()?;
        let mut rows = inner.matches.clone();
        rows.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(rows)
    }

    async fn insert_stream(&self, insert: StreamInsert) -> Result<StreamRow, BackendError> {
        let row = {
            let mut inner = self.lock();
            inner.check_online()?;
            let seq = inner.next_seq();
            let row = StreamRow {
                id: Some(uuid::Uuid::new_v4().to_string()),
                title: insert.title,
                streamer_name: insert.streamer_name,
                viewers: insert.viewers,
                thumbnail_url: insert.thumbnail_url,
                tags: insert.tags,
                is_live: insert.is_live,
                description: None,
                user_id: insert.user_id,
                created_at: Some(chrono::Utc::now().to_rfc3339()),
            };
            inner.streams.push((seq, row.clone()));
            row
        };
        self.publish(RowChange::Insert(row.clone())).await;
        Ok(row)
    }

    async fn subscribe_streams(&self, capacity: usize) -> Result<Subscription, BackendError> {
        let mut inner = self.lock();
        inner.check_online()?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        inner.subscribers.push(tx);
        Ok(Subscription::new(rx, None))
    }
}

fn session_for(user: AuthUser) -> AuthSession {
    AuthSession {
        access_token: format!("memory-{}", user.id),
        user,
    }
}

fn row_from_stream(stream: &Stream) -> StreamRow {
    StreamRow {
        id: Some(stream.id.clone()),
        title: Some(stream.title.clone()),
        streamer_name: Some(stream.streamer_name.clone()),
        viewers: Some(stream.viewers),
        thumbnail_url: Some(stream.thumbnail_url.clone()),
        tags: Some(stream.tags.clone()),
        is_live: Some(stream.is_live),
        description: stream.description.clone(),
        user_id: None,
        created_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_streams_come_back_live_first() {
        let backend = MemoryBackend::seeded();
        let rows = backend.fetch_streams().await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["101", "102", "103", "104"]);
    }

    #[tokio::test]
    async fn inserted_live_stream_is_listed_first() {
        let backend = MemoryBackend::seeded();
        let row = backend
            .insert_stream(StreamInsert {
                title: Some("New".into()),
                is_live: Some(true),
                ..StreamInsert::default()
            })
            .await
            .unwrap();

        let rows = backend.fetch_streams().await.unwrap();
        assert_eq!(rows[0].id, row.id);
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn sign_in_checks_password_and_broadcasts() {
        let backend = MemoryBackend::new();
        backend.add_account("a@b.c", "secret1", "Ana", Role::Viewer);
        let mut changes = backend.auth_changes();

        let err = backend.sign_in("a@b.c", "wrong").await.unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));

        backend.sign_in("a@b.c", "secret1").await.unwrap();
        match changes.recv().await.unwrap() {
            AuthChange::SignedIn(session) => {
                assert_eq!(session.user.email.as_deref(), Some("a@b.c"))
            }
            other => panic!("expected SignedIn, got {other:?}"),
        }
        assert!(backend.get_session().await.unwrap().is_some());

        backend.sign_out().await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), AuthChange::SignedOut);
        assert!(backend.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicates_and_short_passwords() {
        let backend = MemoryBackend::new();
        backend.sign_up("new@b.c", "longenough", "Neo").await.unwrap();
        assert!(backend.sign_up("new@b.c", "longenough", "Neo").await.is_err());
        assert!(backend.sign_up("other@b.c", "123", "Short").await.is_err());

        let session = backend.get_session().await.unwrap().unwrap();
        assert_eq!(session.user.user_metadata.role.as_deref(), Some("creator"));
    }

    #[tokio::test]
    async fn offline_backend_fails_every_call() {
        let backend = MemoryBackend::seeded();
        backend.set_offline(true);
        assert_eq!(backend.fetch_streams().await, Err(BackendError::Unavailable));
        assert_eq!(backend.fetch_matches().await, Err(BackendError::Unavailable));
        assert!(backend.subscribe_streams(8).await.is_err());
    }

    #[tokio::test]
    async fn changes_reach_subscribers_until_they_unsubscribe() {
        let backend = MemoryBackend::seeded();
        let mut sub = backend.subscribe_streams(8).await.unwrap();
        assert_eq!(backend.subscriber_count(), 1);

        backend.delete_stream("104").await;
        assert_eq!(sub.recv().await, Some(RowChange::Delete { id: "104".into() }));

        sub.unsubscribe();
        assert_eq!(backend.subscriber_count(), 0);
    }
}
