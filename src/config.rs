//! Runtime configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Timing and seating rules applied to every session
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub night: Duration,
    pub day: Duration,
    pub voting: Duration,
    /// Seconds-remaining marks at which a reminder is published
    pub reminder_marks: Vec<u64>,
    /// Upper bound between two checks of the driver's early-exit condition
    pub poll_interval: Duration,
    /// Lobby capacity
    pub max_players: usize,
    /// Recommended minimum; starting below it only logs a warning
    pub min_players: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            night: Duration::from_secs(60),
            day: Duration::from_secs(60),
            voting: Duration::from_secs(45),
            reminder_marks: vec![30, 15, 5],
            poll_interval: Duration::from_millis(1000),
            max_players: 12,
            min_players: 4,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

fn parse_marks(raw: &str) -> Option<Vec<u64>> {
    let mut marks = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    marks.sort_unstable_by(|a, b| b.cmp(a));
    marks.dedup();
    Some(marks)
}

impl GameConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let night = env_parse::<u64>("MAFIOSI_NIGHT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.night);
        let day = env_parse::<u64>("MAFIOSI_DAY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.day);
        let voting = env_parse::<u64>("MAFIOSI_VOTING_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.voting);

        let reminder_marks = match std::env::var("MAFIOSI_REMINDERS") {
            Ok(raw) => parse_marks(&raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring invalid MAFIOSI_REMINDERS: {:?}", raw);
                defaults.reminder_marks.clone()
            }),
            Err(_) => defaults.reminder_marks.clone(),
        };

        let poll_interval = env_parse::<u64>("MAFIOSI_POLL_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let max_players = env_parse::<usize>("MAFIOSI_MAX_PLAYERS")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_players);
        let min_players = env_parse::<usize>("MAFIOSI_MIN_PLAYERS").unwrap_or(defaults.min_players);

        tracing::info!(
            night_secs = night.as_secs(),
            day_secs = day.as_secs(),
            voting_secs = voting.as_secs(),
            max_players,
            min_players,
            "Game config loaded"
        );

        Self {
            night,
            day,
            voting,
            reminder_marks,
            poll_interval,
            max_players,
            min_players,
        }
    }
}

/// Server-level settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let fallback = SocketAddr::from(([0, 0, 0, 0], 6573));
        let bind = env_parse::<SocketAddr>("MAFIOSI_BIND").unwrap_or(fallback);
        Self { bind }
    }
}
