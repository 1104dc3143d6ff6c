// Upcoming league fixtures from the public sports-data API, with a
// deterministic local schedule whenever the API yields nothing usable.

use anyhow::Context;
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use pitchside_core::config::FixturesConfig;
use pitchside_core::mapper::{map_fixture_event, FixtureEvent};
use pitchside_core::model::{Match, MatchStatus};
use pitchside_core::votes::VotePolicy;

const FALLBACK_TEAMS: [&str; 12] = [
    "Manchester City",
    "Arsenal",
    "Liverpool",
    "Aston Villa",
    "Tottenham",
    "Chelsea",
    "Newcastle",
    "Manchester United",
    "West Ham",
    "Brighton",
    "Wolves",
    "Fulham",
];

const FALLBACK_VENUES: [&str; 6] = [
    "Etihad Stadium",
    "Emirates Stadium",
    "Anfield",
    "Villa Park",
    "Tottenham Hotspur Stadium",
    "Stamford Bridge",
];

const FALLBACK_KICKOFFS: [&str; 2] = ["20:00", "22:00"];

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Option<Vec<FixtureEvent>>,
}

pub struct FixtureSource {
    http: reqwest::Client,
    config: FixturesConfig,
    policy: VotePolicy,
}

impl FixtureSource {
    pub fn new(config: FixturesConfig, policy: VotePolicy) -> Self {
        FixtureSource {
            http: reqwest::Client::new(),
            config,
            policy,
        }
    }

    /// Upcoming fixtures from today (UTC). Never fails: any problem with the
    /// API resolves to the fallback schedule.
    pub async fn fetch_league_fixtures(&self) -> Vec<Match> {
        self.fetch_for(Utc::now().date_naive()).await
    }

    /// Same as `fetch_league_fixtures`, for an explicit "today".
    pub async fn fetch_for(&self, today: NaiveDate) -> Vec<Match> {
        let events = match self.fetch_events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("Fixture fetch failed, using fallback schedule: {e:#}");
                Vec::new()
            }
        };
        let mut rng = rand::rng();
        league_fixtures(events, today, &self.config, &self.policy, &mut rng)
    }

    /// Raw events for the configured league. A `null` event list is empty.
    pub async fn fetch_events(&self) -> anyhow::Result<Vec<FixtureEvent>> {
        let url = format!(
            "{}/{}/eventsnextleague.php?id={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_key,
            self.config.league_id
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("fixture request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("fixture API returned status {status}");
        }

        let body: EventsResponse = response
            .json()
            .await
            .context("fixture response was not the expected JSON")?;
        Ok(body.events.unwrap_or_default())
    }
}

/// The whole pipeline for one "today": league filter, date window, sort and
/// mapping, falling back to the local schedule when nothing survives.
pub fn league_fixtures<R: Rng + ?Sized>(
    events: Vec<FixtureEvent>,
    today: NaiveDate,
    config: &FixturesConfig,
    policy: &VotePolicy,
    rng: &mut R,
) -> Vec<Match> {
    let league = filter_league(events, &config.league_id, &config.league_names);
    if league.is_empty() {
        info!("No league events available, using fallback schedule");
        return fallback_fixtures(today, config.fallback_days, policy, rng);
    }

    let upcoming = select_fixtures(league, today, config.window_days);
    if upcoming.is_empty() {
        info!("No league events inside the window, using fallback schedule");
        return fallback_fixtures(today, config.fallback_days, policy, rng);
    }

    upcoming
        .into_iter()
        .map(|event| map_fixture_event(event, policy, rng))
        .collect()
}

/// Keep events whose league id matches, or whose league name contains one
/// of the lower-case `names`.
pub fn filter_league(events: Vec<FixtureEvent>, league_id: &str, names: &[String]) -> Vec<FixtureEvent> {
    events
        .into_iter()
        .filter(|event| {
            if event.league_id.as_deref() == Some(league_id) {
                return true;
            }
            let league = event.league.as_deref().unwrap_or("").to_lowercase();
            names.iter().any(|needle| league.contains(needle.as_str()))
        })
        .collect()
}

/// Keep events dated within `[today, today + window_days]` and order them by
/// date then kickoff. Undated events are dropped; a missing or unreadable
/// kickoff sorts as midnight. The sort is stable.
pub fn select_fixtures(events: Vec<FixtureEvent>, today: NaiveDate, window_days: u32) -> Vec<FixtureEvent> {
    let start = iso(today);
    let end = iso(
        today
            .checked_add_days(Days::new(u64::from(window_days)))
            .unwrap_or(NaiveDate::MAX),
    );

    let mut upcoming: Vec<FixtureEvent> = events
        .into_iter()
        .filter(|event| match event.date_event.as_deref() {
            Some(date) if !date.is_empty() => date >= start.as_str() && date <= end.as_str(),
            _ => false,
        })
        .collect();

    upcoming.sort_by(|a, b| {
        let date_a = a.date_event.as_deref().unwrap_or("");
        let date_b = b.date_event.as_deref().unwrap_or("");
        date_a
            .cmp(date_b)
            .then_with(|| kickoff(a.time.as_deref()).cmp(&kickoff(b.time.as_deref())))
    });
    upcoming
}

/// Two Premier League matches a day for `days` days starting at `today`.
pub fn fallback_fixtures<R: Rng + ?Sized>(
    today: NaiveDate,
    days: u32,
    policy: &VotePolicy,
    rng: &mut R,
) -> Vec<Match> {
    let teams = FALLBACK_TEAMS.len();
    let mut matches = Vec::with_capacity(days as usize * FALLBACK_KICKOFFS.len());

    for i in 0..days as usize {
        let date = today
            .checked_add_days(Days::new(i as u64))
            .unwrap_or(today);
        for (j, kickoff) in FALLBACK_KICKOFFS.iter().enumerate() {
            let slot = i * 2 + j;
            let (home_votes, away_votes) = policy.seed_pair(rng);
            matches.push(Match {
                id: format!("fallback-epl-{i}-{j}"),
                home_team: FALLBACK_TEAMS[slot % teams].to_string(),
                away_team: FALLBACK_TEAMS[(teams - 1 + teams - slot % teams) % teams].to_string(),
                date: iso(date),
                time: kickoff.to_string(),
                venue: FALLBACK_VENUES[(i + j) % FALLBACK_VENUES.len()].to_string(),
                group: "Premier League".to_string(),
                status: MatchStatus::Upcoming,
                home_score: Some(0),
                away_score: Some(0),
                home_votes: Some(home_votes),
                away_votes: Some(away_votes),
                user_voted: None,
            });
        }
    }
    matches
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn kickoff(time: Option<&str>) -> NaiveTime {
    time.and_then(|t| {
        NaiveTime::parse_from_str(t, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
            .ok()
    })
    .unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config() -> FixturesConfig {
        FixturesConfig {
            base_url: "http://unused".into(),
            api_key: "3".into(),
            league_id: "4328".into(),
            league_names: vec!["premier league".into(), "english".into()],
            window_days: 14,
            fallback_days: 5,
        }
    }

    fn event(id: &str, date: Option<&str>, time: Option<&str>) -> FixtureEvent {
        FixtureEvent {
            id_event: Some(id.into()),
            home_team: Some("Home".into()),
            away_team: Some("Away".into()),
            date_event: date.map(str::to_string),
            time: time.map(str::to_string),
            venue: None,
            league: Some("English Premier League".into()),
            league_id: Some("4328".into()),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn fallback_is_ten_upcoming_matches_with_fixed_layout() {
        let today = day("2026-10-19");
        let policy = VotePolicy::default();
        let matches = fallback_fixtures(today, 5, &policy, &mut StdRng::seed_from_u64(1));

        assert_eq!(matches.len(), 10);
        assert!(matches.iter().all(|m| m.status == MatchStatus::Upcoming));
        assert!(matches.iter().all(|m| m.home_score == Some(0) && m.away_score == Some(0)));
        assert!(matches.iter().all(|m| m.group == "Premier League"));

        let first = &matches[0];
        assert_eq!(first.id, "fallback-epl-0-0");
        assert_eq!(first.home_team, "Manchester City");
        assert_eq!(first.away_team, "Fulham");
        assert_eq!(first.venue, "Etihad Stadium");
        assert_eq!((first.date.as_str(), first.time.as_str()), ("2026-10-19", "20:00"));

        let m = &matches[3];
        assert_eq!(m.id, "fallback-epl-1-1");
        assert_eq!(m.home_team, "Aston Villa");
        assert_eq!(m.away_team, "West Ham");
        assert_eq!(m.venue, "Anfield");
        assert_eq!((m.date.as_str(), m.time.as_str()), ("2026-10-20", "22:00"));

        assert_eq!(matches[9].date, "2026-10-23");
    }

    #[test]
    fn fallback_is_deterministic_apart_from_votes() {
        let today = day("2026-01-30");
        let policy = VotePolicy::default();
        let strip = |mut ms: Vec<Match>| {
            for m in &mut ms {
                m.home_votes = None;
                m.away_votes = None;
            }
            ms
        };
        let a = strip(fallback_fixtures(today, 5, &policy, &mut StdRng::seed_from_u64(1)));
        let b = strip(fallback_fixtures(today, 5, &policy, &mut StdRng::seed_from_u64(2)));
        assert_eq!(a, b);
        // Crosses the month boundary.
        assert_eq!(a[4].date, "2026-02-01");
    }

    #[test]
    fn league_filter_accepts_id_or_name() {
        let mut by_name = event("2", Some("2026-10-20"), None);
        by_name.league_id = Some("999".into());
        by_name.league = Some("Premier League 2".into());
        let mut other = event("3", Some("2026-10-20"), None);
        other.league_id = Some("4335".into());
        other.league = Some("Spanish La Liga".into());

        let kept = filter_league(
            vec![event("1", None, None), by_name, other],
            "4328",
            &config().league_names,
        );
        let ids: Vec<_> = kept.iter().map(|e| e.id_event.clone().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn window_is_inclusive_and_drops_undated_events() {
        let today = day("2026-10-19");
        let events = vec![
            event("past", Some("2026-10-18"), None),
            event("today", Some("2026-10-19"), None),
            event("edge", Some("2026-11-02"), None),
            event("late", Some("2026-11-03"), None),
            event("undated", None, None),
        ];
        let ids: Vec<_> = select_fixtures(events, today, 14)
            .into_iter()
            .map(|e| e.id_event.unwrap())
            .collect();
        assert_eq!(ids, vec!["today", "edge"]);
    }

    #[test]
    fn sorted_by_date_then_kickoff_with_midnight_default() {
        let today = day("2026-10-19");
        let events = vec![
            event("b", Some("2026-10-21"), Some("15:00:00")),
            event("a2", Some("2026-10-20"), Some("19:45:00")),
            event("c", Some("2026-10-21"), None),
            event("a1", Some("2026-10-20"), Some("12:30")),
            event("d", Some("2026-10-21"), Some("garbage")),
        ];
        let ids: Vec<_> = select_fixtures(events, today, 14)
            .into_iter()
            .map(|e| e.id_event.unwrap())
            .collect();
        // `c` and `d` both sort as midnight and keep their input order.
        assert_eq!(ids, vec!["a1", "a2", "c", "d", "b"]);
    }

    #[test]
    fn pipeline_maps_surviving_events() {
        let today = day("2026-10-19");
        let matches = league_fixtures(
            vec![event("7", Some("2026-10-25"), Some("17:30:00"))],
            today,
            &config(),
            &VotePolicy::default(),
            &mut StdRng::seed_from_u64(3),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "7");
        assert_eq!(matches[0].time, "17:30");
        assert_eq!(matches[0].venue, "Stadium");
    }

    #[test]
    fn pipeline_falls_back_when_only_other_leagues_are_listed() {
        let today = day("2026-10-19");
        let serie_a: Vec<_> = ["s1", "s2", "s3"]
            .iter()
            .map(|id| {
                let mut e = event(id, Some("2026-10-21"), Some("18:00:00"));
                e.league_id = Some("4332".into());
                e.league = Some("Italian Serie A".into());
                e
            })
            .collect();

        let matches = league_fixtures(
            serie_a,
            today,
            &config(),
            &VotePolicy::default(),
            &mut StdRng::seed_from_u64(3),
        );
        let strip = |mut ms: Vec<Match>| {
            for m in &mut ms {
                m.home_votes = None;
                m.away_votes = None;
            }
            ms
        };
        let expected = fallback_fixtures(today, 5, &VotePolicy::default(), &mut StdRng::seed_from_u64(9));
        assert_eq!(strip(matches), strip(expected));
    }

    #[test]
    fn pipeline_falls_back_when_window_is_empty() {
        let today = day("2026-10-19");
        let matches = league_fixtures(
            vec![event("7", Some("2027-01-01"), None)],
            today,
            &config(),
            &VotePolicy::default(),
            &mut StdRng::seed_from_u64(3),
        );
        assert_eq!(matches.len(), 10);
        assert!(matches[0].id.starts_with("fallback-epl-"));
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
        });

        format!("http://{addr}")
    }

    fn source(base_url: String) -> FixtureSource {
        FixtureSource::new(
            FixturesConfig {
                base_url,
                ..config()
            },
            VotePolicy::default(),
        )
    }

    #[tokio::test]
    async fn fetch_uses_api_events_when_available() {
        let base = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"events":[
                {"idEvent":"55","strHomeTeam":"Arsenal","strAwayTeam":"Chelsea","dateEvent":"2026-10-22","strTime":"19:30:00","strVenue":"Emirates Stadium","strLeague":"English Premier League","idLeague":"4328"},
                {"idEvent":"56","strHomeTeam":"X","strAwayTeam":"Y","dateEvent":"2026-10-22","strLeague":"Serie A","idLeague":"4332"}
            ]}"#,
        )
        .await;

        let matches = source(base).fetch_for(day("2026-10-19")).await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].label(), "Arsenal vs Chelsea");
        assert_eq!(matches[0].venue, "Emirates Stadium");
    }

    #[tokio::test]
    async fn null_events_fall_back() {
        let base = serve_once("HTTP/1.1 200 OK", r#"{"events":null}"#).await;
        let matches = source(base).fetch_for(day("2026-10-19")).await;
        assert_eq!(matches.len(), 10);
    }

    #[tokio::test]
    async fn response_with_only_other_leagues_falls_back() {
        let base = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"events":[
                {"idEvent":"90","strHomeTeam":"Inter","strAwayTeam":"Milan","dateEvent":"2026-10-20","strTime":"19:45:00","strLeague":"Italian Serie A","idLeague":"4332"},
                {"idEvent":"91","strHomeTeam":"Roma","strAwayTeam":"Lazio","dateEvent":"2026-10-21","strLeague":"Italian Serie A","idLeague":"4332"}
            ]}"#,
        )
        .await;

        let matches = source(base).fetch_for(day("2026-10-19")).await;
        assert_eq!(matches.len(), 10);
        assert!(matches.iter().all(|m| m.id.starts_with("fallback-epl-")));
        assert_eq!(matches[0].label(), "Manchester City vs Fulham");
    }

    #[tokio::test]
    async fn error_status_falls_back() {
        let base = serve_once("HTTP/1.1 500 Internal Server Error", "{}").await;
        let matches = source(base).fetch_for(day("2026-10-19")).await;
        assert_eq!(matches.len(), 10);
        assert_eq!(matches[0].id, "fallback-epl-0-0");
    }
}
