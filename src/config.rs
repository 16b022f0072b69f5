//! Application-level configuration loading for session limits and the
//! operator identity.

use std::time::Duration;
use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the JSON configuration is looked up.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POISON_EXPRESS_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Hard cap on the roster size of one session.
    pub max_players: usize,
    /// Minimum roster size before the host may start the selection phase.
    pub min_players_to_start: usize,
    /// Number of entries the local recent-session history keeps.
    pub recent_sessions_cap: usize,
    /// Age after which local history entries are pruned.
    pub session_ttl: Duration,
    /// Buffer size of each change feed topic channel.
    pub feed_capacity: usize,
    /// Fixed well-known identity the host-handover maintenance path binds
    /// the new host to.
    pub operator_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_players: 20,
            min_players_to_start: 4,
            recent_sessions_cap: 5,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            feed_capacity: 16,
            operator_name: "THE CONDUCTOR".into(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// JSON representation of the configuration file; every field is optional
/// and merged over the defaults.
#[derive(Debug, Deserialize)]
struct RawConfig {
    max_players: Option<usize>,
    min_players_to_start: Option<usize>,
    recent_sessions_cap: Option<usize>,
    session_ttl_secs: Option<u64>,
    feed_capacity: Option<usize>,
    operator_name: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            max_players: raw.max_players.unwrap_or(defaults.max_players),
            min_players_to_start: raw
                .min_players_to_start
                .unwrap_or(defaults.min_players_to_start),
            recent_sessions_cap: raw
                .recent_sessions_cap
                .unwrap_or(defaults.recent_sessions_cap),
            session_ttl: raw
                .session_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            feed_capacity: raw.feed_capacity.unwrap_or(defaults.feed_capacity),
            operator_name: raw.operator_name.unwrap_or(defaults.operator_name),
        }
    }
}

/// Resolve the configuration path taking the environment override into
/// account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
