// Static seed data: the World Cup schedule used when the backend has no
// matches, and the stream list the in-memory backend starts with.

use crate::model::{Match, MatchStatus, Stream};

/// Build one seed match.
#[allow(clippy::too_many_arguments)]
fn fixture(
    id: &str,
    home: &str,
    away: &str,
    date: &str,
    time: &str,
    venue: &str,
    group: &str,
    status: MatchStatus,
    votes: (u32, u32),
) -> Match {
    Match {
        id: id.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        date: date.to_string(),
        time: time.to_string(),
        venue: venue.to_string(),
        group: group.to_string(),
        status,
        home_score: None,
        away_score: None,
        home_votes: Some(votes.0),
        away_votes: Some(votes.1),
        user_voted: None,
    }
}

pub fn seed_matches() -> Vec<Match> {
    let mut live = fixture(
        "3",
        "Argentina",
        "Japan",
        "2034-06-10",
        "21:00",
        "Jeddah Central Stadium, Jeddah",
        "Group C",
        MatchStatus::Live,
        (2100, 1500),
    );
    live.home_score = Some(1);
    live.away_score = Some(1);

    vec![
        fixture(
            "1",
            "Saudi Arabia",
            "Brazil",
            "2034-06-09",
            "21:00",
            "King Salman Stadium, Riyadh",
            "Group A",
            MatchStatus::Upcoming,
            (1250, 980),
        ),
        fixture(
            "2",
            "France",
            "Germany",
            "2034-06-10",
            "18:00",
            "Neom Stadium, Neom",
            "Group B",
            MatchStatus::Upcoming,
            (850, 890),
        ),
        live,
        fixture(
            "4",
            "Spain",
            "Portugal",
            "2034-06-11",
            "16:00",
            "Aramco Stadium, Al Khobar",
            "Group D",
            MatchStatus::Upcoming,
            (1100, 1150),
        ),
    ]
}

fn stream(id: &str, title: &str, streamer: &str, viewers: u32, n: u32, tags: &[&str], live: bool) -> Stream {
    Stream {
        id: id.to_string(),
        title: title.to_string(),
        streamer_name: streamer.to_string(),
        viewers,
        thumbnail_url: format!("https://picsum.photos/800/450?random={n}"),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        is_live: live,
        description: None,
    }
}

pub fn seed_streams() -> Vec<Stream> {
    vec![
        stream(
            "101",
            "Match Day LIVE: KSA vs Brazil Pre-game Analysis",
            "KSA Sports Central",
            12_500,
            1,
            &["Analysis", "KSA", "Live"],
            true,
        ),
        stream(
            "102",
            "Tactical Breakdown: The Neom Stadium Experience",
            "Future Football",
            3_400,
            2,
            &["Vlog", "Stadium", "Tour"],
            true,
        ),
        stream(
            "103",
            "Watch Party: Argentina vs Japan",
            "GoalGaming",
            8_900,
            3,
            &["Watch Party", "Reaction"],
            true,
        ),
        stream(
            "104",
            "Best Goals of Qualifier Rounds",
            "Najam Highlights",
            1_200,
            4,
            &["Highlights", "Replay"],
            false,
        ),
    ]
}

/// Venue filter labels for the World Cup schedule, `All Venues` first.
pub const VENUES: [&str; 5] = [
    "All Venues",
    "King Salman Stadium, Riyadh",
    "Neom Stadium, Neom",
    "Jeddah Central Stadium, Jeddah",
    "Aramco Stadium, Al Khobar",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_matches_are_sorted_by_date_and_carry_votes() {
        let matches = seed_matches();
        assert_eq!(matches.len(), 4);
        assert!(matches.windows(2).all(|w| w[0].date <= w[1].date));
        assert!(matches.iter().all(|m| m.home_votes.is_some() && m.away_votes.is_some()));
        assert!(matches.iter().all(|m| m.user_voted.is_none()));
    }

    #[test]
    fn only_the_live_seed_match_has_a_score() {
        let scored: Vec<_> = seed_matches()
            .into_iter()
            .filter(|m| m.home_score.is_some())
            .collect();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].status, MatchStatus::Live);
    }

    #[test]
    fn seed_stream_ids_are_unique() {
        let streams = seed_streams();
        let mut ids: Vec<_> = streams.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), streams.len());
    }
}
