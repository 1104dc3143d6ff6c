// Canonical entity shapes shared by every crate in the workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a scheduled match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatchStatus {
    #[default]
    Upcoming,
    Live,
    Finished,
}

impl MatchStatus {
    /// Parse the backend's status label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Upcoming" => Some(MatchStatus::Upcoming),
            "Live" => Some(MatchStatus::Live),
            "Finished" => Some(MatchStatus::Finished),
            _ => None,
        }
    }
}

/// One side of a fixture, used for recording a viewer's pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => f.write_str("home"),
            Side::Away => f.write_str("away"),
        }
    }
}

/// A scheduled match, either from the backend, the fixture API, or seed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    /// ISO date (`YYYY-MM-DD`).
    pub date: String,
    /// Kickoff label (`HH:MM`, or `TBD`).
    pub time: String,
    pub venue: String,
    /// Group or league label shown next to the kickoff.
    pub group: String,
    pub status: MatchStatus,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub home_votes: Option<u32>,
    pub away_votes: Option<u32>,
    /// The current viewer's recorded pick. Only set alongside vote counts.
    pub user_voted: Option<Side>,
}

impl Match {
    /// `"Home vs Away"`, as fed to the prediction prompt.
    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Combined vote total, treating missing counts as zero.
    pub fn total_votes(&self) -> u32 {
        self.home_votes
            .unwrap_or(0)
            .saturating_add(self.away_votes.unwrap_or(0))
    }
}

/// A live or replay video stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub title: String,
    pub streamer_name: String,
    pub viewers: u32,
    pub thumbnail_url: String,
    pub tags: Vec<String>,
    pub is_live: bool,
    pub description: Option<String>,
}

/// Fields a creator supplies when going live. The backend assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewStream {
    pub title: Option<String>,
    pub streamer_name: Option<String>,
    pub viewers: Option<u32>,
    pub thumbnail_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_live: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Creator,
}

impl Role {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "viewer" => Some(Role::Viewer),
            "creator" => Some(Role::Creator),
            _ => None,
        }
    }
}

/// The signed-in identity derived from the auth service's session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: String,
}

/// A chat line in one viewing session. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user: String,
    pub text: String,
    pub timestamp: String,
    pub is_system: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_known_values() {
        assert_eq!(MatchStatus::from_label("Live"), Some(MatchStatus::Live));
        assert_eq!(MatchStatus::from_label("Finished"), Some(MatchStatus::Finished));
        assert_eq!(MatchStatus::from_label("live"), None);
    }

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Home).unwrap(), "\"home\"");
        assert_eq!(Side::Away.to_string(), "away");
    }

    #[test]
    fn total_votes_treats_missing_as_zero() {
        let mut m = crate::seed::seed_matches().remove(0);
        m.away_votes = None;
        assert_eq!(m.total_votes(), 1250);
        assert_eq!(m.label(), "Saudi Arabia vs Brazil");
    }
}
