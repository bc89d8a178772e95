//! Runtime configuration loaded from the environment.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a submitted report affects the ring
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EliminationPolicy {
    /// Report waits for confirm/dispute, auto-approved after the review window
    #[default]
    Staged,
    /// Report is approved in the same transaction that creates it
    Immediate,
}

impl EliminationPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "staged" => Some(Self::Staged),
            "immediate" => Some(Self::Immediate),
            _ => None,
        }
    }
}

/// Game timing and policy
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub policy: EliminationPolicy,
    /// Pending window for a staged report; also the confirm/dispute token TTL
    pub review_window: Duration,
    /// TTL for target/report tokens
    pub play_token_ttl: Duration,
    pub verify_token_ttl: Duration,
    /// Base URL used to build capability links
    pub base_url: String,
    /// Receives dispute notices
    pub admin_email: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            policy: EliminationPolicy::Staged,
            review_window: Duration::minutes(10),
            play_token_ttl: Duration::days(7),
            verify_token_ttl: Duration::minutes(120),
            base_url: "http://localhost:3000".to_string(),
            admin_email: None,
        }
    }
}

impl GameConfig {
    /// Load game config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let policy = match env_string("ELIMINATION_POLICY") {
            Some(raw) => EliminationPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("Unknown ELIMINATION_POLICY '{}', using staged", raw);
                EliminationPolicy::Staged
            }),
            None => defaults.policy,
        };

        let review_window = env_parse::<i64>("REVIEW_WINDOW_MINUTES")
            .map(Duration::minutes)
            .unwrap_or(defaults.review_window);
        let play_token_ttl = env_parse::<i64>("PLAY_TOKEN_TTL_MINUTES")
            .map(Duration::minutes)
            .unwrap_or(defaults.play_token_ttl);
        let verify_token_ttl = env_parse::<i64>("VERIFY_TOKEN_TTL_MINUTES")
            .map(Duration::minutes)
            .unwrap_or(defaults.verify_token_ttl);

        let base_url = env_string("APP_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        Self {
            policy,
            review_window,
            play_token_ttl,
            verify_token_ttl,
            base_url,
            admin_email: env_string("ADMIN_EMAIL"),
        }
    }

    /// Build a capability link, e.g. `link("/target", token)`
    pub fn link(&self, path: &str, token: &str) -> String {
        format!("{}{}?token={}", self.base_url, path, token)
    }
}

/// Server-level settings that are not part of game semantics
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Shared secret for the auto-approve trigger (None = open)
    pub cron_secret: Option<String>,
    /// Interval of the in-process sweeper (None = rely on an external scheduler)
    pub sweep_interval: Option<std::time::Duration>,
    pub state_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let sweep_interval = env_parse::<u64>("SWEEP_INTERVAL_SECS")
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs);

        Self {
            bind_addr: env_string("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            cron_secret: env_string("CRON_SECRET"),
            sweep_interval,
            state_file: env_string("STATE_FILE").map(PathBuf::from),
        }
    }
}

/// Read a non-empty, trimmed env var
pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}='{}', using default", key, raw);
            None
        }
    }
}
