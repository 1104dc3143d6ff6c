// Pitchside entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Pick the backend (REST when configured, in-memory otherwise)
// 4. Start the store: session, streams, matches, realtime
// 5. Load the league schedule
// 6. Print a summary and wait for Ctrl+C
// 7. Shut the store down

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use pitchside_app::backend::Backend;
use pitchside_app::catalog::{filter_streams, CATEGORIES};
use pitchside_app::fixtures::FixtureSource;
use pitchside_app::memory::MemoryBackend;
use pitchside_app::rest::RestBackend;
use pitchside_app::schedule::{ScheduleBoard, ScheduleTab};
use pitchside_app::store::{AppState, StoreOptions};
use pitchside_core::config::{self, Config};
use pitchside_core::model::MatchStatus;
use pitchside_core::votes::split_percentages;
use pitchside_llm::TextGenerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Pitchside starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league {}, vote delay {} ms, realtime capacity {}",
        config.fixtures.league_id, config.votes.delay_ms, config.realtime.channel_capacity
    );

    let backend = select_backend(&config);

    let text = Arc::new(TextGenerator::from_config(&config));
    if text.is_active() {
        info!("Text generation enabled (model {})", config.llm.model);
    } else {
        info!("Text generation disabled (no API key)");
    }

    let store = AppState::new(backend, StoreOptions::from_config(&config));
    store.start().await;

    let fixtures = FixtureSource::new(config.fixtures.clone(), config.votes.policy());
    let board = Arc::new(ScheduleBoard::new(store.clone(), fixtures));
    board.refresh_league().await;
    let league_follower = board.follow_session();

    print_summary(&store, &board, &text).await;

    println!("Watching for live updates. Press Ctrl+C to quit.");
    let mut changes = store.subscribe();
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {e}");
                }
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let live = changes.borrow_and_update().streams.iter().filter(|s| s.is_live).count();
                println!("Streams updated: {live} live");
            }
        }
    }

    info!("Shutting down");
    league_follower.abort();
    store.shutdown();
    Ok(())
}

fn select_backend(config: &Config) -> Arc<dyn Backend> {
    let anon_key = config
        .credentials
        .backend_anon_key
        .as_deref()
        .filter(|k| !k.is_empty());
    match anon_key {
        Some(key) if !config.backend.url.is_empty() => {
            info!("Using REST backend at {}", config.backend.url);
            Arc::new(RestBackend::new(&config.backend.url, key))
        }
        _ => {
            info!("No backend configured, using in-memory demo backend");
            Arc::new(MemoryBackend::seeded())
        }
    }
}

async fn print_summary(store: &AppState, board: &ScheduleBoard, text: &TextGenerator) {
    let snapshot = store.snapshot();
    match &snapshot.session {
        Some(user) => println!("Signed in as {} <{}>", user.name, user.email),
        None => println!("Not signed in"),
    }

    println!("\nStreams");
    for category in CATEGORIES {
        let count = filter_streams(&snapshot.streams, category).len();
        println!("  {category:<12} {count}");
    }

    println!("\nWorld Cup schedule");
    for (date, matches) in board.grouped(ScheduleTab::WorldCup) {
        println!("  {date}");
        for m in matches {
            let (home_pct, away_pct) = split_percentages(&m);
            let live = if m.status == MatchStatus::Live { " [LIVE]" } else { "" };
            println!(
                "    {} {}{} ({}% / {}%)",
                m.time,
                m.label(),
                live,
                home_pct,
                away_pct
            );
        }
    }

    let league = board.matches(ScheduleTab::PremierLeague);
    println!("\nPremier League: {} upcoming fixtures", league.len());
    if let Some(next) = league.first() {
        println!("  next: {} on {} at {}", next.label(), next.date, next.time);
    }

    if let Some(live) = snapshot.matches.iter().find(|m| m.status == MatchStatus::Live) {
        let prediction = text.match_prediction(&live.label()).await;
        println!("\nPrediction for {}: {prediction}", live.label());
    }
    println!();
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("pitchside.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("pitchside=info,pitchside_app=info,pitchside_core=info,pitchside_llm=info,warn")
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
