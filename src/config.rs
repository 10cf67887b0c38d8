//! Session client configuration parsed from environment variables.
//!
//! Every knob has a default matching the production room service, so
//! `SessionConfig::default()` is a working configuration and `from_env`
//! only overrides what is set.

use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_PING_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_ROSTER_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_DRAFT_SNAPSHOT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_FLUSH_CONFIRM_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_LOG_CAPACITY: usize = 200;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Shortest period a repeating timer runs at.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Tuning knobs for one open session view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base URL of the socket service; rooms live under `/room/{name}/`.
    pub ws_url: String,
    /// Base URL of the HTTP API (join, leave, curation, catalog, report).
    pub api_url: String,
    /// Reconnect attempts after an unexpected close before giving up.
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Liveness ping period.
    pub ping_interval: Duration,
    /// Participant-list refresh period.
    pub roster_interval: Duration,
    /// Periodic draft flush period.
    pub autosave_interval: Duration,
    /// How long an activated draft stays read-only waiting for its snapshot.
    pub draft_snapshot_timeout: Duration,
    /// How long an item switch waits for the outgoing flush to be written.
    pub flush_confirm_timeout: Duration,
    /// Maximum chat/log entries retained; oldest entries are evicted first.
    pub log_capacity: usize,
    /// Request timeout for the HTTP collaborators.
    pub http_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_owned(),
            api_url: DEFAULT_API_URL.to_owned(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            ping_interval: Duration::from_millis(DEFAULT_PING_INTERVAL_MS),
            roster_interval: Duration::from_millis(DEFAULT_ROSTER_INTERVAL_MS),
            autosave_interval: Duration::from_millis(DEFAULT_AUTOSAVE_INTERVAL_MS),
            draft_snapshot_timeout: Duration::from_millis(DEFAULT_DRAFT_SNAPSHOT_TIMEOUT_MS),
            flush_confirm_timeout: Duration::from_millis(DEFAULT_FLUSH_CONFIRM_TIMEOUT_MS),
            log_capacity: DEFAULT_LOG_CAPACITY,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    /// Build config from environment variables.
    ///
    /// Optional (defaults in parentheses):
    /// - `TASTING_WS_URL` (`ws://127.0.0.1:8000/ws`)
    /// - `TASTING_API_URL` (`http://127.0.0.1:8000`)
    /// - `TASTING_RECONNECT_ATTEMPTS` (5)
    /// - `TASTING_RECONNECT_INTERVAL_MS` (2000)
    /// - `TASTING_PING_INTERVAL_MS` (10000)
    /// - `TASTING_ROSTER_INTERVAL_MS` (10000)
    /// - `TASTING_AUTOSAVE_INTERVAL_MS` (5000)
    /// - `TASTING_DRAFT_SNAPSHOT_TIMEOUT_MS` (2000)
    /// - `TASTING_FLUSH_CONFIRM_TIMEOUT_MS` (500)
    /// - `TASTING_LOG_CAPACITY` (200)
    /// - `TASTING_HTTP_TIMEOUT_SECS` (30)
    ///
    /// Unparsable values fall back to the default, and so does a zero period
    /// for the ping, roster and autosave timers.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            ws_url: env_url("TASTING_WS_URL", DEFAULT_WS_URL),
            api_url: env_url("TASTING_API_URL", DEFAULT_API_URL),
            reconnect_attempts: env_parse("TASTING_RECONNECT_ATTEMPTS", DEFAULT_RECONNECT_ATTEMPTS),
            reconnect_interval: env_millis("TASTING_RECONNECT_INTERVAL_MS", DEFAULT_RECONNECT_INTERVAL_MS),
            ping_interval: env_period("TASTING_PING_INTERVAL_MS", DEFAULT_PING_INTERVAL_MS),
            roster_interval: env_period("TASTING_ROSTER_INTERVAL_MS", DEFAULT_ROSTER_INTERVAL_MS),
            autosave_interval: env_period("TASTING_AUTOSAVE_INTERVAL_MS", DEFAULT_AUTOSAVE_INTERVAL_MS),
            draft_snapshot_timeout: env_millis("TASTING_DRAFT_SNAPSHOT_TIMEOUT_MS", DEFAULT_DRAFT_SNAPSHOT_TIMEOUT_MS),
            flush_confirm_timeout: env_millis("TASTING_FLUSH_CONFIRM_TIMEOUT_MS", DEFAULT_FLUSH_CONFIRM_TIMEOUT_MS),
            log_capacity: env_parse("TASTING_LOG_CAPACITY", DEFAULT_LOG_CAPACITY),
            http_timeout: Duration::from_secs(env_parse("TASTING_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(key, default_ms))
}

fn env_period(key: &str, default_ms: u64) -> Duration {
    match env_parse(key, default_ms) {
        0 => Duration::from_millis(default_ms),
        ms => Duration::from_millis(ms),
    }
}

/// Period for a repeating timer; a zero period would never yield.
pub(crate) fn timer_period(period: Duration) -> Duration {
    period.max(MIN_TIMER_PERIOD)
}

fn env_url(key: &str, default: &str) -> String {
    let value = match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_owned(),
        _ => default.to_owned(),
    };
    value.trim_end_matches('/').to_owned()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
