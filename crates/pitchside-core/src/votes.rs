// Crowd-prediction vote seeding and the simulated vote round trip.
//
// Every randomized vote number in the workspace (row backfill, fixture
// seeding, post-vote tallies) is drawn through one `VotePolicy`, so the
// ranges live in a single place and come from the `[votes]` config table.

use std::ops::Range;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::model::{Match, Side};

/// Fixed latency of the simulated vote submission.
pub const DEFAULT_VOTE_DELAY: Duration = Duration::from_millis(600);

/// Ranges for cosmetic vote numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct VotePolicy {
    /// Per-side count used to backfill missing vote columns.
    pub side_range: Range<u32>,
    /// Base total drawn for a simulated tally.
    pub tally_total: Range<u32>,
    /// Home share of the base total.
    pub tally_ratio: Range<f64>,
}

impl Default for VotePolicy {
    fn default() -> Self {
        VotePolicy {
            side_range: 100..1100,
            tally_total: 1000..6000,
            tally_ratio: 0.4..0.6,
        }
    }
}

impl VotePolicy {
    /// Draw one per-side backfill count.
    pub fn seed_side<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.random_range(self.side_range.clone())
    }

    /// Draw a `(home, away)` pair where each side is seeded independently.
    pub fn seed_pair<R: Rng + ?Sized>(&self, rng: &mut R) -> (u32, u32) {
        (self.seed_side(rng), self.seed_side(rng))
    }

    /// Draw a split tally and add the caller's own vote to `side`.
    ///
    /// `home = floor(total * ratio)`, `away = total - home`, then the chosen
    /// side is incremented by exactly one.
    pub fn draw_tally<R: Rng + ?Sized>(&self, rng: &mut R, side: Side) -> (u32, u32) {
        let total = rng.random_range(self.tally_total.clone());
        let ratio = rng.random_range(self.tally_ratio.clone());
        let mut home = (f64::from(total) * ratio).floor() as u32;
        home = home.min(total);
        let mut away = total - home;
        match side {
            Side::Home => home += 1,
            Side::Away => away += 1,
        }
        (home, away)
    }
}

/// Result of a simulated vote, ready to be committed into a `Match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub home_votes: u32,
    pub away_votes: u32,
    pub user_voted: Side,
}

impl VoteTally {
    /// Overwrite the match's vote state with this tally.
    pub fn apply_to(&self, m: &mut Match) {
        m.home_votes = Some(self.home_votes);
        m.away_votes = Some(self.away_votes);
        m.user_voted = Some(self.user_voted);
    }

    pub fn total(&self) -> u32 {
        self.home_votes + self.away_votes
    }
}

/// Produces randomized tallies after a fixed delay.
///
/// Calls are not idempotent: each one draws a fresh tally, and only the most
/// recent result should be kept on the match.
pub struct VoteSimulator {
    policy: VotePolicy,
    delay: Duration,
    rng: Mutex<StdRng>,
}

impl VoteSimulator {
    pub fn new(policy: VotePolicy, delay: Duration) -> Self {
        VoteSimulator {
            policy,
            delay,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// A simulator with a fixed seed, for reproducible tallies.
    pub fn seeded(policy: VotePolicy, delay: Duration, seed: u64) -> Self {
        VoteSimulator {
            policy,
            delay,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn policy(&self) -> &VotePolicy {
        &self.policy
    }

    /// Simulate submitting a vote for `side` on `match_id`.
    pub async fn cast_vote(&self, match_id: &str, side: Side) -> VoteTally {
        tokio::time::sleep(self.delay).await;

        let (home_votes, away_votes) = self.policy.draw_tally(&mut *self.rng(), side);
        debug!(match_id, %side, home_votes, away_votes, "simulated vote tally");

        VoteTally {
            home_votes,
            away_votes,
            user_voted: side,
        }
    }

    /// Draw a per-side backfill count from the simulator's generator.
    pub fn seed_side(&self) -> u32 {
        self.policy.seed_side(&mut *self.rng())
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `floor(side / total * 100)`, or 0 when either is missing or zero.
///
/// The two sides are floored independently and need not sum to 100.
pub fn percentage(side_votes: Option<u32>, total: u32) -> u32 {
    match side_votes {
        Some(votes) if votes > 0 && total > 0 => {
            ((u64::from(votes) * 100) / u64::from(total)) as u32
        }
        _ => 0,
    }
}

/// Home and away percentages for a match's current counts.
pub fn split_percentages(m: &Match) -> (u32, u32) {
    let total = m.total_votes();
    (percentage(m.home_votes, total), percentage(m.away_votes, total))
}
