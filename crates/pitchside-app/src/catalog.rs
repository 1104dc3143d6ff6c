// Stream catalog: category filtering over the store's streams plus locally
// synthesized "load more" entries.

use rand::seq::IndexedRandom;
use rand::Rng;

use pitchside_core::model::Stream;

pub const CATEGORIES: [&str; 7] = [
    "All",
    "Live",
    "Analysis",
    "Watch Party",
    "Vlog",
    "Highlights",
    "Gaming",
];

const LOAD_MORE_BATCH: usize = 4;

const TOPICS: [&str; 5] = [
    "Tactical Analysis",
    "Fan Zone",
    "Match Highlights",
    "Pre-game Show",
    "Stadium Vlog",
];

const TEAMS: [&str; 7] = [
    "Saudi Arabia",
    "Argentina",
    "Brazil",
    "France",
    "Japan",
    "Spain",
    "Portugal",
];

const STOCK_VIDEOS: [&str; 6] = [
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ForBiggerJoyrides.mp4",
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ForBiggerMeltdowns.mp4",
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ElephantsDream.mp4",
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4",
    "https://cdn.pixabay.com/video/2023/05/23/162143-829042696_tiny.mp4",
    "https://cdn.pixabay.com/video/2022/02/28/110290-693280396_tiny.mp4",
];

/// Streams matching `category`: everything for `All`, live ones for `Live`,
/// otherwise a case-insensitive substring match on any tag or the title.
pub fn filter_streams(streams: &[Stream], category: &str) -> Vec<Stream> {
    let needle = category.to_lowercase();
    streams
        .iter()
        .filter(|s| match category {
            "All" => true,
            "Live" => s.is_live,
            _ => {
                s.title.to_lowercase().contains(&needle)
                    || s.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            }
        })
        .cloned()
        .collect()
}

/// Whether a thumbnail URL points at a video rather than an image.
pub fn is_video_url(url: &str) -> bool {
    url.ends_with(".mp4") || url.ends_with(".webm") || url.contains("video") || url.contains("mp4")
}

/// Locally loaded streams appended after the store's list. They live only as
/// long as the catalog.
#[derive(Debug, Default)]
pub struct StreamCatalog {
    local: Vec<Stream>,
    next_id: u64,
}

impl StreamCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of synthesized streams and return it.
    pub fn load_more<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Stream> {
        let mut batch = Vec::with_capacity(LOAD_MORE_BATCH);
        for _ in 0..LOAD_MORE_BATCH {
            batch.push(synthesize(self.next_id, rng));
            self.next_id += 1;
        }
        self.local.extend(batch.iter().cloned());
        batch
    }

    pub fn local(&self) -> &[Stream] {
        &self.local
    }

    /// `store_streams` followed by the local ones, filtered by `category`.
    pub fn visible(&self, store_streams: &[Stream], category: &str) -> Vec<Stream> {
        let combined: Vec<Stream> = store_streams.iter().chain(self.local.iter()).cloned().collect();
        filter_streams(&combined, category)
    }
}

fn synthesize<R: Rng + ?Sized>(n: u64, rng: &mut R) -> Stream {
    let is_live = rng.random_bool(0.7);
    let topic = *TOPICS.choose(rng).unwrap_or(&TOPICS[0]);
    let home = *TEAMS.choose(rng).unwrap_or(&TEAMS[0]);
    let away = *TEAMS.choose(rng).unwrap_or(&TEAMS[1]);
    let lead_word = topic.split(' ').next().unwrap_or(topic);

    Stream {
        id: format!("local-{n}"),
        title: format!(
            "{topic}: {home} vs {away} - {}",
            if is_live { "LIVE" } else { "Replay" }
        ),
        streamer_name: format!("User_{}", rng.random_range(1000..10000)),
        viewers: rng.random_range(200..8200),
        thumbnail_url: STOCK_VIDEOS.choose(rng).unwrap_or(&STOCK_VIDEOS[0]).to_string(),
        tags: vec!["World Cup".into(), "Football".into(), lead_word.to_string()],
        is_live,
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchside_core::seed::seed_streams;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ids(streams: &[Stream]) -> Vec<&str> {
        streams.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn all_and_live_categories() {
        let streams = seed_streams();
        assert_eq!(filter_streams(&streams, "All").len(), 4);
        assert_eq!(ids(&filter_streams(&streams, "Live")), vec!["101", "102", "103"]);
    }

    #[test]
    fn category_matches_tag_or_title_case_insensitively() {
        let streams = seed_streams();
        assert_eq!(ids(&filter_streams(&streams, "Analysis")), vec!["101"]);
        assert_eq!(ids(&filter_streams(&streams, "Watch Party")), vec!["103"]);
        assert_eq!(ids(&filter_streams(&streams, "vlog")), vec!["102"]);
        assert!(filter_streams(&streams, "Gaming").is_empty());
    }

    #[test]
    fn title_alone_matches_even_without_tags() {
        let mut streams = seed_streams();
        streams[3].tags.clear();
        assert_eq!(ids(&filter_streams(&streams, "goals")), vec!["104"]);
    }

    #[test]
    fn load_more_appends_unique_local_streams() {
        let mut catalog = StreamCatalog::new();
        let mut rng = StdRng::seed_from_u64(8);
        let first = catalog.load_more(&mut rng);
        let second = catalog.load_more(&mut rng);

        assert_eq!(first.len(), 4);
        assert_eq!(catalog.local().len(), 8);
        assert_eq!(second[0].id, "local-4");
        for s in catalog.local() {
            assert!(s.id.starts_with("local-"));
            assert!((200..8200).contains(&s.viewers));
            assert_eq!(s.tags[..2], ["World Cup".to_string(), "Football".to_string()]);
            assert!(is_video_url(&s.thumbnail_url));
        }
    }

    #[test]
    fn visible_puts_store_streams_first() {
        let mut catalog = StreamCatalog::new();
        catalog.load_more(&mut StdRng::seed_from_u64(1));
        let visible = catalog.visible(&seed_streams(), "All");
        assert_eq!(visible.len(), 8);
        assert_eq!(visible[0].id, "101");
        assert_eq!(visible[4].id, "local-0");
    }
}
