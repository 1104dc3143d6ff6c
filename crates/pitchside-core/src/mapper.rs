// Wire records from the backend, the fixture API, and the auth service, and
// the pure functions mapping them onto canonical entities.
//
// Every wire field is optional and loosely typed: ids may arrive as strings
// or numbers, counts as numbers or numeric strings. Mapping never fails;
// malformed values become `None` (or an empty string for required text).

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::{Match, MatchStatus, NewStream, Role, Stream, User};
use crate::votes::VotePolicy;

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

/// A row of the backend's `streams` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRow {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub streamer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_tags", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A row of the backend's `matches` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub home_score: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub away_score: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub home_votes: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub away_votes: Option<u32>,
}

/// One event from the fixture API's `eventsnextleague` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureEvent {
    #[serde(rename = "idEvent", default, deserialize_with = "lenient_string")]
    pub id_event: Option<String>,
    #[serde(rename = "strHomeTeam", default, deserialize_with = "lenient_string")]
    pub home_team: Option<String>,
    #[serde(rename = "strAwayTeam", default, deserialize_with = "lenient_string")]
    pub away_team: Option<String>,
    #[serde(rename = "dateEvent", default, deserialize_with = "lenient_string")]
    pub date_event: Option<String>,
    #[serde(rename = "strTime", default, deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(rename = "strVenue", default, deserialize_with = "lenient_string")]
    pub venue: Option<String>,
    #[serde(rename = "strLeague", default, deserialize_with = "lenient_string")]
    pub league: Option<String>,
    #[serde(rename = "idLeague", default, deserialize_with = "lenient_string")]
    pub league_id: Option<String>,
}

/// Free-form profile metadata attached to an auth user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The user record inside an auth session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Payload for inserting a new stream row. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInsert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streamer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

pub fn map_stream(row: StreamRow) -> Stream {
    Stream {
        id: row.id.unwrap_or_default(),
        title: row.title.unwrap_or_default(),
        streamer_name: row.streamer_name.unwrap_or_default(),
        viewers: row.viewers.unwrap_or(0),
        thumbnail_url: row.thumbnail_url.unwrap_or_default(),
        tags: row.tags.unwrap_or_default(),
        is_live: row.is_live.unwrap_or(false),
        description: row.description,
    }
}

/// Map a match row, drawing backfill votes from the thread-local generator.
pub fn map_match(row: MatchRow, policy: &VotePolicy) -> Match {
    map_match_with(row, policy, &mut rand::rng())
}

/// Map a match row, drawing backfill votes from `rng`.
///
/// Missing (or zero) vote counts get a cosmetic per-side value from
/// `policy.side_range`. Unknown status labels read as `Upcoming`.
pub fn map_match_with<R: Rng + ?Sized>(row: MatchRow, policy: &VotePolicy, rng: &mut R) -> Match {
    let home_votes = match row.home_votes {
        Some(v) if v > 0 => v,
        _ => policy.seed_side(rng),
    };
    let away_votes = match row.away_votes {
        Some(v) if v > 0 => v,
        _ => policy.seed_side(rng),
    };

    Match {
        id: row.id.unwrap_or_default(),
        home_team: row.home_team.unwrap_or_default(),
        away_team: row.away_team.unwrap_or_default(),
        date: row.date.unwrap_or_default(),
        time: row.time.unwrap_or_default(),
        venue: row.venue.unwrap_or_default(),
        group: row.group_name.unwrap_or_default(),
        status: row
            .status
            .as_deref()
            .and_then(MatchStatus::from_label)
            .unwrap_or_default(),
        home_score: row.home_score,
        away_score: row.away_score,
        home_votes: Some(home_votes),
        away_votes: Some(away_votes),
        user_voted: None,
    }
}

/// Map an external fixture onto an upcoming match with zeroed scores.
pub fn map_fixture_event<R: Rng + ?Sized>(
    event: FixtureEvent,
    policy: &VotePolicy,
    rng: &mut R,
) -> Match {
    let time = event
        .time
        .as_deref()
        .map(|t| t.chars().take(5).collect::<String>())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "TBD".to_string());
    let venue = event
        .venue
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "Stadium".to_string());
    let (home_votes, away_votes) = policy.seed_pair(rng);

    Match {
        id: event.id_event.unwrap_or_default(),
        home_team: event.home_team.unwrap_or_default(),
        away_team: event.away_team.unwrap_or_default(),
        date: event.date_event.unwrap_or_default(),
        time,
        venue,
        group: event.league.unwrap_or_default(),
        status: MatchStatus::Upcoming,
        home_score: Some(0),
        away_score: Some(0),
        home_votes: Some(home_votes),
        away_votes: Some(away_votes),
        user_voted: None,
    }
}

/// Derive the application identity from an auth user.
///
/// Name falls back to the email's local part, then `"User"`. A missing role
/// means `creator`; an unrecognized one grants nothing beyond `viewer`.
pub fn map_session_user(user: &AuthUser) -> User {
    let email = user.email.clone().unwrap_or_default();
    let name = user
        .user_metadata
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "User".to_string());
    let role = match user.user_metadata.role.as_deref() {
        None | Some("") => Role::Creator,
        Some(label) => Role::from_label(label).unwrap_or(Role::Viewer),
    };

    User {
        id: user.id.clone(),
        name,
        email,
        role,
        avatar: format!("https://api.dicebear.com/7.x/avataaars/svg?seed={}", user.id),
    }
}

/// Build the insert payload for a new stream owned by `user_id`.
pub fn stream_insert(stream: NewStream, user_id: Option<&str>) -> StreamInsert {
    StreamInsert {
        title: stream.title,
        streamer_name: stream.streamer_name,
        viewers: stream.viewers,
        thumbnail_url: stream.thumbnail_url,
        tags: stream.tags,
        is_live: stream.is_live,
        user_id: user_id.map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        Some(Value::String(s)) => match s.as_str() {
            "true" | "t" => Some(true),
            "false" | "f" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn stream_row(json: &str) -> StreamRow {
        serde_json::from_str(json).expect("stream row should decode")
    }

    fn match_row(json: &str) -> MatchRow {
        serde_json::from_str(json).expect("match row should decode")
    }

    #[test]
    fn stream_row_maps_renamed_fields() {
        let row = stream_row(
            r#"{
                "id": "s1",
                "title": "Derby day",
                "streamer_name": "Anfield Watch",
                "viewers": 420,
                "thumbnail_url": "https://img/1.jpg",
                "tags": ["Live", "Derby"],
                "is_live": true,
                "description": "pre-match"
            }"#,
        );
        let s = map_stream(row);
        assert_eq!(s.id, "s1");
        assert_eq!(s.streamer_name, "Anfield Watch");
        assert_eq!(s.viewers, 420);
        assert_eq!(s.tags, vec!["Live", "Derby"]);
        assert!(s.is_live);
        assert_eq!(s.description.as_deref(), Some("pre-match"));
    }

    #[test]
    fn missing_tags_become_empty_and_description_stays_absent() {
        let s = map_stream(stream_row(r#"{ "id": 7, "title": "x", "tags": null }"#));
        assert_eq!(s.id, "7");
        assert!(s.tags.is_empty());
        assert!(s.description.is_none());
        assert_eq!(s.streamer_name, "");
        assert!(!s.is_live);
    }

    #[test]
    fn malformed_stream_fields_are_coerced_not_rejected() {
        let s = map_stream(stream_row(
            r#"{ "id": "a", "viewers": "12", "is_live": 1, "tags": ["ok", 3, null] }"#,
        ));
        assert_eq!(s.viewers, 12);
        assert!(s.is_live);
        assert_eq!(s.tags, vec!["ok"]);

        let s = map_stream(stream_row(r#"{ "id": "b", "viewers": -4, "is_live": "maybe" }"#));
        assert_eq!(s.viewers, 0);
        assert!(!s.is_live);
    }

    #[test]
    fn match_row_keeps_scores_absent_and_backfills_votes() {
        let policy = VotePolicy::default();
        let mut rng = StdRng::seed_from_u64(1);
        let m = map_match_with(
            match_row(
                r#"{
                    "id": 12, "home_team": "Qatar", "away_team": "Ghana",
                    "date": "2034-06-12", "time": "19:00", "venue": "Riyadh",
                    "group_name": "Group E", "status": "Upcoming"
                }"#,
            ),
            &policy,
            &mut rng,
        );
        assert_eq!(m.id, "12");
        assert_eq!(m.group, "Group E");
        assert!(m.home_score.is_none());
        assert!(m.away_score.is_none());
        assert!(policy.side_range.contains(&m.home_votes.unwrap()));
        assert!(policy.side_range.contains(&m.away_votes.unwrap()));
        assert!(m.user_voted.is_none());
    }

    #[test]
    fn present_votes_are_kept_and_zero_votes_are_backfilled() {
        let policy = VotePolicy::default();
        let mut rng = StdRng::seed_from_u64(2);
        let m = map_match_with(
            match_row(r#"{ "id": "1", "home_votes": 15, "away_votes": 0, "status": "Live" }"#),
            &policy,
            &mut rng,
        );
        assert_eq!(m.home_votes, Some(15));
        assert!(m.away_votes.unwrap() >= 100);
        assert_eq!(m.status, MatchStatus::Live);
    }

    #[test]
    fn unknown_status_reads_as_upcoming() {
        let m = map_match(match_row(r#"{ "id": "1", "status": "Postponed" }"#), &VotePolicy::default());
        assert_eq!(m.status, MatchStatus::Upcoming);
        assert_eq!(m.home_team, "");
    }

    #[test]
    fn fixture_event_truncates_time_and_defaults_venue() {
        let policy = VotePolicy::default();
        let mut rng = StdRng::seed_from_u64(4);
        let event: FixtureEvent = serde_json::from_str(
            r#"{
                "idEvent": "2070001", "strHomeTeam": "Arsenal", "strAwayTeam": "Chelsea",
                "dateEvent": "2026-10-20", "strTime": "19:45:00", "strVenue": null,
                "strLeague": "English Premier League", "idLeague": "4328"
            }"#,
        )
        .unwrap();
        let m = map_fixture_event(event, &policy, &mut rng);
        assert_eq!(m.time, "19:45");
        assert_eq!(m.venue, "Stadium");
        assert_eq!(m.group, "English Premier League");
        assert_eq!(m.home_score, Some(0));
        assert_eq!(m.status, MatchStatus::Upcoming);

        let m = map_fixture_event(FixtureEvent::default(), &policy, &mut rng);
        assert_eq!(m.time, "TBD");
    }

    #[test]
    fn session_user_prefers_metadata_then_email() {
        let user = AuthUser {
            id: "u1".into(),
            email: Some("fan@example.com".into()),
            user_metadata: UserMetadata {
                name: Some("Nora".into()),
                role: Some("viewer".into()),
            },
        };
        let mapped = map_session_user(&user);
        assert_eq!(mapped.name, "Nora");
        assert_eq!(mapped.role, Role::Viewer);
        assert!(mapped.avatar.ends_with("seed=u1"));

        let bare = AuthUser {
            id: "u2".into(),
            email: Some("kick@example.com".into()),
            user_metadata: UserMetadata::default(),
        };
        let mapped = map_session_user(&bare);
        assert_eq!(mapped.name, "kick");
        assert_eq!(mapped.role, Role::Creator);

        let anonymous = AuthUser {
            id: "u3".into(),
            ..AuthUser::default()
        };
        let mapped = map_session_user(&anonymous);
        assert_eq!(mapped.name, "User");
        assert_eq!(mapped.email, "");
    }

    #[test]
    fn unrecognized_role_does_not_grant_creator() {
        let user = AuthUser {
            id: "u4".into(),
            email: None,
            user_metadata: UserMetadata {
                name: None,
                role: Some("admin".into()),
            },
        };
        assert_eq!(map_session_user(&user).role, Role::Viewer);
    }

    #[test]
    fn stream_insert_omits_absent_fields() {
        let insert = stream_insert(
            NewStream {
                title: Some("Go".into()),
                is_live: Some(true),
                ..NewStream::default()
            },
            Some("u1"),
        );
        let json = serde_json::to_value(&insert).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "title": "Go", "is_live": true, "user_id": "u1" })
        );
    }
}
