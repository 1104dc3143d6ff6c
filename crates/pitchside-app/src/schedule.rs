// Schedule board: the World Cup schedule from the store and the league
// schedule fetched from the fixture API, grouped by day, with one vote in
// flight at a time across both. League choices belong to the signed-in user
// and are dropped whenever the session changes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pitchside_core::model::{Match, Side};
use pitchside_core::votes::VoteTally;

use crate::fixtures::FixtureSource;
use crate::store::{AppState, StoreSnapshot};

/// Label of the venue filter entry that matches everything.
pub const ALL_VENUES: &str = "All Venues";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTab {
    WorldCup,
    PremierLeague,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("a vote on match {0} is still being submitted")]
    InFlight(String),

    #[error("no match with id {0} on this schedule")]
    UnknownMatch(String),
}

/// Group matches by date, dates ascending. Matches keep their input order
/// within a date.
pub fn group_by_date(matches: &[Match]) -> Vec<(String, Vec<Match>)> {
    let mut groups: BTreeMap<String, Vec<Match>> = BTreeMap::new();
    for m in matches {
        groups.entry(m.date.clone()).or_default().push(m.clone());
    }
    groups.into_iter().collect()
}

/// Keep matches played at `venue`. `ALL_VENUES` keeps everything.
pub fn filter_by_venue(matches: &[Match], venue: &str) -> Vec<Match> {
    matches
        .iter()
        .filter(|m| venue == ALL_VENUES || m.venue == venue)
        .cloned()
        .collect()
}

pub struct ScheduleBoard {
    store: AppState,
    fixtures: FixtureSource,
    league: Mutex<Vec<Match>>,
    voting: Mutex<Option<String>>,
}

/// Clears the in-flight marker when the vote finishes or is cancelled.
struct VotingGuard<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl Drop for VotingGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

impl ScheduleBoard {
    pub fn new(store: AppState, fixtures: FixtureSource) -> Self {
        ScheduleBoard {
            store,
            fixtures,
            league: Mutex::new(Vec::new()),
            voting: Mutex::new(None),
        }
    }

    /// Re-fetch the league schedule. Local league votes are replaced.
    pub async fn refresh_league(&self) {
        let fetched = self.fixtures.fetch_league_fixtures().await;
        self.install_league(fetched).await;
    }

    /// Re-fetch the league schedule for an explicit "today".
    pub async fn refresh_league_for(&self, today: NaiveDate) {
        let fetched = self.fixtures.fetch_for(today).await;
        self.install_league(fetched).await;
    }

    /// Drop every league vote choice, then re-fetch the league schedule.
    pub async fn on_session_change(&self) {
        for m in lock(&self.league).iter_mut() {
            m.user_voted = None;
        }
        self.refresh_league().await;
    }

    /// Run `on_session_change` each time the store's signed-in user changes.
    ///
    /// The task ends when the board or the store is dropped.
    pub fn follow_session(self: &Arc<Self>) -> JoinHandle<()> {
        let board = Arc::downgrade(self);
        let mut changes = self.store.subscribe();
        let mut current = session_id(&changes.borrow_and_update());
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let seen = session_id(&changes.borrow_and_update());
                if seen == current {
                    continue;
                }
                current = seen;
                let Some(board) = board.upgrade() else {
                    break;
                };
                debug!("Session changed, resetting league schedule");
                board.on_session_change().await;
            }
            debug!("League session follower finished");
        })
    }

    async fn install_league(&self, fetched: Vec<Match>) {
        let synced = self.store.sync_match_votes(fetched).await;
        info!("League schedule holds {} matches", synced.len());
        *lock(&self.league) = synced;
    }

    pub fn matches(&self, tab: ScheduleTab) -> Vec<Match> {
        match tab {
            ScheduleTab::WorldCup => self.store.matches(),
            ScheduleTab::PremierLeague => lock(&self.league).clone(),
        }
    }

    pub fn grouped(&self, tab: ScheduleTab) -> Vec<(String, Vec<Match>)> {
        group_by_date(&self.matches(tab))
    }

    /// The match whose vote is being submitted, if any.
    pub fn voting_match(&self) -> Option<String> {
        lock(&self.voting).clone()
    }

    /// Vote on a match of `tab`. Rejected while another vote is pending.
    ///
    /// World Cup votes go through the store; league votes are simulated with
    /// the same simulator and kept on the board only.
    pub async fn vote(&self, tab: ScheduleTab, match_id: &str, side: Side) -> Result<VoteTally, VoteError> {
        let target = self
            .matches(tab)
            .into_iter()
            .find(|m| m.id == match_id)
            .ok_or_else(|| VoteError::UnknownMatch(match_id.to_string()))?;

        {
            let mut voting = lock(&self.voting);
            if let Some(pending) = voting.as_ref() {
                debug!("Rejecting vote on {match_id}, {pending} still pending");
                return Err(VoteError::InFlight(pending.clone()));
            }
            *voting = Some(match_id.to_string());
        }
        let _guard = VotingGuard { slot: &self.voting };

        let tally = match tab {
            ScheduleTab::WorldCup => self.store.cast_vote(&target, side).await,
            ScheduleTab::PremierLeague => {
                let tally = self.store.vote_simulator().cast_vote(match_id, side).await;
                if let Some(stored) = lock(&self.league).iter_mut().find(|m| m.id == match_id) {
                    tally.apply_to(stored);
                }
                tally
            }
        };
        Ok(tally)
    }
}

fn session_id(snapshot: &StoreSnapshot) -> Option<String> {
    snapshot.session.as_ref().map(|user| user.id.clone())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
