// Configuration loading and parsing (pitchside.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::votes::VotePolicy;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub fixtures: FixturesConfig,
    pub votes: VotesConfig,
    pub llm: LlmConfig,
    pub realtime: RealtimeConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// pitchside.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire pitchside.toml file.
#[derive(Debug, Clone, Deserialize)]
struct PitchsideFile {
    backend: BackendConfig,
    fixtures: FixturesConfig,
    votes: VotesConfig,
    llm: LlmConfig,
    realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the auth/storage/realtime backend. When empty, the
    /// in-memory backend is used.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixturesConfig {
    pub base_url: String,
    pub api_key: String,
    pub league_id: String,
    /// Lower-case substrings accepted in an event's league name.
    pub league_names: Vec<String>,
    /// Forward window, in days, for fetched fixtures (inclusive).
    pub window_days: u32,
    /// Number of days covered by the synthetic fallback schedule.
    pub fallback_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VotesConfig {
    pub side_min: u32,
    pub side_max: u32,
    pub tally_min: u32,
    pub tally_max: u32,
    pub ratio_min: f64,
    pub ratio_max: f64,
    pub delay_ms: u64,
}

impl VotesConfig {
    pub fn policy(&self) -> VotePolicy {
        VotePolicy {
            side_range: self.side_min..self.side_max,
            tally_total: self.tally_min..self.tally_max,
            tally_ratio: self.ratio_min..self.ratio_max,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of the bounded channel between the push transport and the
    /// apply loop.
    pub channel_capacity: usize,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub backend_anon_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/pitchside.toml` and
/// (optionally) `config/credentials.toml`, both relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- pitchside.toml (required) ---
    let main_path = config_dir.join("pitchside.toml");
    let main_text = read_file(&main_path)?;
    let file: PitchsideFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        backend: file.backend,
        fixtures: file.fixtures,
        votes: file.votes,
        llm: file.llm,
        realtime: file.realtime,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            debug!("Skipping template {}", path.display());
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                info!("Copied default config to {}", target.display());
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Loads config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let f = &config.fixtures;
    if f.league_id.trim().is_empty() {
        return Err(invalid("fixtures.league_id", "must not be empty"));
    }
    if f.window_days == 0 {
        return Err(invalid("fixtures.window_days", "must be greater than 0"));
    }
    if f.fallback_days == 0 {
        return Err(invalid("fixtures.fallback_days", "must be greater than 0"));
    }

    let v = &config.votes;
    let ranges: &[(&str, u32, u32)] = &[
        ("votes.side_max", v.side_min, v.side_max),
        ("votes.tally_max", v.tally_min, v.tally_max),
    ];
    for (name, min, max) in ranges {
        if max <= min {
            return Err(invalid(name, format!("must be greater than the minimum ({min}), got {max}")));
        }
    }
    if !(0.0..=1.0).contains(&v.ratio_min) || !(0.0..=1.0).contains(&v.ratio_max) {
        return Err(invalid(
            "votes.ratio_min",
            format!("ratios must be within 0.0..=1.0, got {}..{}", v.ratio_min, v.ratio_max),
        ));
    }
    if v.ratio_max <= v.ratio_min {
        return Err(invalid(
            "votes.ratio_max",
            format!("must be greater than ratio_min ({}), got {}", v.ratio_min, v.ratio_max),
        ));
    }

    if config.realtime.channel_capacity == 0 {
        return Err(invalid("realtime.channel_capacity", "must be greater than 0"));
    }

    if config.llm.model.trim().is_empty() {
        return Err(invalid("llm.model", "must not be empty"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
