// The application store.
//
// `AppState` owns the canonical stream list, match list and session. It
// publishes them as one `StoreSnapshot` through a `watch` channel; consumers
// read `snapshot()` or `subscribe()` and call the mutation methods here.
// Besides those methods, only the auth listener and the realtime apply task
// (both owned by the store) write to the snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pitchside_core::config::Config;
use pitchside_core::mapper::{map_match, map_session_user, map_stream, stream_insert};
use pitchside_core::model::{Match, NewStream, Role, Side, Stream, User};
use pitchside_core::seed::seed_matches;
use pitchside_core::votes::{VotePolicy, VoteSimulator, VoteTally, DEFAULT_VOTE_DELAY};

use crate::backend::{AuthChange, Backend, BackendError};
use crate::realtime::{apply_event, RealtimeSync};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything a consumer renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub session: Option<User>,
    pub streams: Vec<Stream>,
    pub matches: Vec<Match>,
    /// True until the persisted session has been checked.
    pub is_loading: bool,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        StoreSnapshot {
            session: None,
            streams: Vec::new(),
            matches: Vec::new(),
            is_loading: true,
        }
    }
}

impl StoreSnapshot {
    pub fn is_creator(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|user| user.role == Role::Creator)
    }

    fn clear_vote_markers(&mut self) {
        for m in &mut self.matches {
            m.user_voted = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub vote_policy: VotePolicy,
    pub vote_delay: Duration,
    /// Fixed seed for the vote simulator; `None` seeds from the OS.
    pub vote_seed: Option<u64>,
    /// Bound of the realtime change channel.
    pub channel_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            vote_policy: VotePolicy::default(),
            vote_delay: DEFAULT_VOTE_DELAY,
            vote_seed: None,
            channel_capacity: 256,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        StoreOptions {
            vote_policy: config.votes.policy(),
            vote_delay: config.votes.delay(),
            vote_seed: None,
            channel_capacity: config.realtime.channel_capacity,
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tasks {
    auth: Option<JoinHandle<()>>,
    realtime: Option<RealtimeSync>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    votes: Arc<VoteSimulator>,
    policy: VotePolicy,
    channel_capacity: usize,
    state: watch::Sender<StoreSnapshot>,
    tasks: Mutex<Tasks>,
    started: AtomicBool,
}

/// Shared handle to the store. Clones refer to the same state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl AppState {
    /// An idle store: loading, empty, with no tasks running. Call `start`.
    pub fn new(backend: Arc<dyn Backend>, options: StoreOptions) -> Self {
        let votes = match options.vote_seed {
            Some(seed) => VoteSimulator::seeded(options.vote_policy.clone(), options.vote_delay, seed),
            None => VoteSimulator::new(options.vote_policy.clone(), options.vote_delay),
        };
        let (state, _) = watch::channel(StoreSnapshot::default());
        AppState {
            inner: Arc::new(Inner {
                backend,
                votes: Arc::new(votes),
                policy: options.vote_policy,
                channel_capacity: options.channel_capacity,
                state,
                tasks: Mutex::new(Tasks::default()),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Run initialization: restore the session, start the auth listener,
    /// fetch streams and matches once, then attach the realtime feed.
    ///
    /// Only the first call does anything.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("Store already started");
            return;
        }
        let inner = &self.inner;
        let auth_changes = inner.backend.auth_changes();

        let restored = match inner.backend.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not restore session: {e}");
                None
            }
        };
        let user = restored.as_ref().map(|s| map_session_user(&s.user));
        if let Some(user) = &user {
            info!("Restored session for {}", user.email);
        }
        inner.state.send_modify(|s| {
            s.session = user;
            s.is_loading = false;
        });

        let listener = tokio::spawn(listen_for_auth(Arc::downgrade(inner), auth_changes));
        inner.tasks().auth = Some(listener);

        inner.refresh_streams().await;
        inner.refresh_matches().await;

        match inner.backend.subscribe_streams(inner.channel_capacity).await {
            Ok(subscription) => {
                let weak = Arc::downgrade(inner);
                let sync = RealtimeSync::spawn(subscription, move |event| {
                    if let Some(inner) = weak.upgrade() {
                        inner.state.send_modify(|s| apply_event(&mut s.streams, event));
                    }
                });
                inner.tasks().realtime = Some(sync);
                info!("Realtime sync attached");
            }
            Err(e) => warn!("Realtime subscription failed, streams will not live-update: {e}"),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), BackendError> {
        self.inner.backend.sign_in(email, password).await
    }

    /// Register a creator account. The session, if the backend opens one, is
    /// picked up by the auth listener.
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<(), BackendError> {
        self.inner.backend.sign_up(email, password, name).await
    }

    /// Sign out and forget every local vote choice. Vote counts are kept.
    pub async fn logout(&self) {
        if let Err(e) = self.inner.backend.sign_out().await {
            warn!("Sign-out failed, clearing local session anyway: {e}");
        }
        self.inner.state.send_modify(|s| {
            s.session = None;
            s.clear_vote_markers();
        });
    }

    /// Insert a stream owned by the current user and return its new id.
    ///
    /// The local list is not touched here; the row arrives through the
    /// realtime feed.
    pub async fn add_stream(&self, stream: NewStream) -> Option<String> {
        let user_id = self.session().map(|u| u.id);
        match self.inner.backend.insert_stream(stream_insert(stream, user_id.as_deref())).await {
            Ok(row) => {
                info!("Added stream {:?}", row.id);
                row.id
            }
            Err(e) => {
                error!("Error adding stream: {e}");
                None
            }
        }
    }

    /// Simulate a vote on `m` and commit the tally to the stored match with
    /// the same id.
    pub async fn cast_vote(&self, m: &Match, side: Side) -> VoteTally {
        let tally = self.inner.votes.cast_vote(&m.id, side).await;
        self.inner.state.send_modify(|s| {
            if let Some(stored) = s.matches.iter_mut().find(|stored| stored.id == m.id) {
                tally.apply_to(stored);
            }
        });
        tally
    }

    /// Reconcile externally sourced matches with stored votes. Votes are not
    /// persisted, so the list comes back unchanged.
    pub async fn sync_match_votes(&self, matches: Vec<Match>) -> Vec<Match> {
        matches
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn streams(&self) -> Vec<Stream> {
        self.inner.state.borrow().streams.clone()
    }

    pub fn matches(&self) -> Vec<Match> {
        self.inner.state.borrow().matches.clone()
    }

    pub fn session(&self) -> Option<User> {
        self.inner.state.borrow().session.clone()
    }

    pub fn is_creator(&self) -> bool {
        self.inner.state.borrow().is_creator()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    /// The simulator shared by every vote surface.
    pub fn vote_simulator(&self) -> Arc<VoteSimulator> {
        Arc::clone(&self.inner.votes)
    }

    pub fn vote_policy(&self) -> &VotePolicy {
        &self.inner.policy
    }

    pub fn is_live_syncing(&self) -> bool {
        self.inner
            .tasks()
            .realtime
            .as_ref()
            .is_some_and(RealtimeSync::is_running)
    }

    /// Stop the auth listener and the realtime feed. Safe to call twice.
    pub fn shutdown(&self) {
        self.inner.stop_tasks();
    }
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stop_tasks(&self) {
        let mut tasks = self.tasks();
        if let Some(auth) = tasks.auth.take() {
            auth.abort();
        }
        if let Some(sync) = tasks.realtime.take() {
            sync.stop();
            info!("Realtime sync stopped");
        }
    }

    /// Replace the stream list. On failure the current list is kept.
    async fn refresh_streams(&self) {
        match self.backend.fetch_streams().await {
            Ok(rows) => {
                let streams: Vec<Stream> = rows.into_iter().map(map_stream).collect();
                debug!("Fetched {} streams", streams.len());
                self.state.send_modify(|s| s.streams = streams);
            }
            Err(e) => warn!("Stream fetch failed, keeping current list: {e}"),
        }
    }

    /// Replace the match list.
    async fn refresh_matches(&self) {
        let matches = self.load_matches().await;
        self.state.send_modify(|s| s.matches = matches);
    }

    /// Stored matches, or the seed schedule when the backend has none or
    /// fails.
    async fn load_matches(&self) -> Vec<Match> {
        match self.backend.fetch_matches().await {
            Ok(rows) if !rows.is_empty() => rows
                .into_iter()
                .map(|row| map_match(row, &self.policy))
                .collect(),
            Ok(_) => {
                debug!("No matches stored, using seed schedule");
                seed_matches()
            }
            Err(e) => {
                warn!("Match fetch failed, using seed schedule: {e}");
                seed_matches()
            }
        }
    }

    /// Signing in refetches matches and publishes them together with the
    /// session. Signing out drops the session and every vote choice.
    async fn on_auth_change(&self, change: AuthChange) {
        match change {
            AuthChange::SignedIn(session) => {
                let user = map_session_user(&session.user);
                let matches = self.load_matches().await;
                info!("Session changed: signed in as {}", user.email);
                self.state.send_modify(|s| {
                    s.session = Some(user);
                    s.is_loading = false;
                    s.matches = matches;
                });
            }
            AuthChange::SignedOut => {
                info!("Session changed: signed out");
                self.state.send_modify(|s| {
                    s.session = None;
                    s.is_loading = false;
                    s.clear_vote_markers();
                });
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

async fn listen_for_auth(store: Weak<Inner>, mut changes: broadcast::Receiver<AuthChange>) {
    loop {
        let change = match changes.recv().await {
            Ok(change) => Some(change),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Auth listener lagged by {skipped} changes, re-reading session");
                None
            }
            Err(RecvError::Closed) => break,
        };
        let Some(inner) = store.upgrade() else {
            break;
        };
        match change {
            Some(change) => inner.on_auth_change(change).await,
            None => match inner.backend.get_session().await {
                Ok(Some(session)) => inner.on_auth_change(AuthChange::SignedIn(session)).await,
                Ok(None) => inner.on_auth_change(AuthChange::SignedOut).await,
                Err(e) => warn!("Could not re-read session: {e}"),
            },
        }
    }
    debug!("Auth listener finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn options() -> StoreOptions {
        StoreOptions {
            vote_delay: Duration::ZERO,
            vote_seed: Some(7),
            ..StoreOptions::default()
        }
    }

    #[tokio::test]
    async fn new_store_is_loading_and_empty() {
        let store = AppState::new(Arc::new(MemoryBackend::seeded()), options());
        assert!(store.is_loading());
        assert!(store.streams().is_empty());
        assert!(!store.is_creator());
    }

    #[tokio::test]
    async fn start_loads_streams_and_seed_matches() {
        let store = AppState::new(Arc::new(MemoryBackend::seeded()), options());
        store.start().await;

        let snap = store.snapshot();
        assert!(!snap.is_loading);
        assert!(snap.session.is_none());
        assert_eq!(snap.streams.len(), 4);
        assert_eq!(snap.matches, seed_matches());
        assert!(store.is_live_syncing());
        store.shutdown();
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let backend = Arc::new(MemoryBackend::seeded());
        let store = AppState::new(backend.clone(), options());
        store.start().await;
        store.start().await;
        assert_eq!(backend.subscriber_count(), 1);
        store.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_unsubscribes() {
        let backend = Arc::new(MemoryBackend::seeded());
        let store = AppState::new(backend.clone(), options());
        store.start().await;

        store.shutdown();
        store.shutdown();
        assert!(!store.is_live_syncing());
        for _ in 0..100 {
            if backend.subscriber_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn failed_stream_fetch_keeps_previous_list() {
        let backend = Arc::new(MemoryBackend::seeded());
        let store = AppState::new(backend.clone(), options());
        store.start().await;

        backend.set_offline(true);
        store.inner.refresh_streams().await;
        store.inner.refresh_matches().await;
        assert_eq!(store.streams().len(), 4);
        assert_eq!(store.matches(), seed_matches());
        store.shutdown();
    }

    #[tokio::test]
    async fn sync_match_votes_is_identity() {
        let store = AppState::new(Arc::new(MemoryBackend::new()), options());
        let input = seed_matches();
        assert_eq!(store.sync_match_votes(input.clone()).await, input);
    }
}
