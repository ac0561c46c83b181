//! Application-level configuration loading: admin roster, handoff tuning and the competitive
//! ruleset written into every match artifact.

use std::{collections::HashSet, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{dto::validation::validate_map_pool, state::matches::PlayerId};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PUG_BACK_CONFIG_PATH";
/// Environment variable that overrides the `gateway_secret` of the file.
const GATEWAY_SECRET_ENV: &str = "PUG_BACK_GATEWAY_SECRET";

/// Reasons a parsed configuration is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("default map pool must hold an odd number of at least 3 maps, got {0}")]
    PoolSize(usize),
    #[error("default map pool lists `{0}` twice")]
    DuplicateMap(String),
    #[error("default map pool entry is invalid: {0}")]
    MapName(String),
    #[error("handoff.max_attempts must be at least 1")]
    NoHandoffAttempts,
    #[error("public_base_url must not be empty")]
    EmptyBaseUrl,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Players granted `is_admin` on every login.
    pub admin_ids: Vec<PlayerId>,
    /// Base URL the game server uses to download published artifacts.
    pub public_base_url: String,
    /// Directory where handoff artifacts are written and served from.
    pub configs_dir: PathBuf,
    /// Pool used when a create request omits one.
    pub default_map_pool: Vec<String>,
    pub handoff: HandoffConfig,
    /// Cvars copied verbatim into every artifact, in file order.
    pub ruleset: IndexMap<String, String>,
    /// Shared secret the login gateway presents; logins are refused while unset.
    pub gateway_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
/// Retry and timeout tuning of the remote-command channel.
pub struct HandoffConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub command_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl HandoffConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            command_timeout_ms: 3_000,
            connect_timeout_ms: 2_000,
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the built-in defaults.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        if let Some(secret) = env::var(GATEWAY_SECRET_ENV)
            .ok()
            .filter(|secret| !secret.trim().is_empty())
        {
            config.gateway_secret = Some(secret);
        }
        if config.gateway_secret.is_none() {
            warn!("no gateway secret configured; every login will be refused");
        }
        config
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        admins = config.admin_ids.len(),
                        maps = config.default_map_pool.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "config rejected; falling back to defaults"
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

    /// Parse and validate a JSON document; missing keys keep their default value.
    pub fn from_json(contents: &str) -> Result<Self, ConfigLoadError> {
        let config: Self = serde_json::from_str::<RawConfig>(contents)?.into();
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants other modules rely on without re-checking.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pool = &self.default_map_pool;
        if pool.len() < 3 || pool.len() % 2 == 0 {
            return Err(ConfigError::PoolSize(pool.len()));
        }
        validate_map_pool(pool).map_err(|err| ConfigError::MapName(err.to_string()))?;
        let mut seen = HashSet::new();
        if let Some(duplicate) = pool.iter().find(|map| !seen.insert(map.as_str())) {
            return Err(ConfigError::DuplicateMap(duplicate.clone()));
        }
        if self.handoff.max_attempts == 0 {
            return Err(ConfigError::NoHandoffAttempts);
        }
        if self.public_base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        Ok(())
    }

    pub fn is_admin(&self, player_id: PlayerId) -> bool {
        self.admin_ids.contains(&player_id)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admin_ids: Vec::new(),
            public_base_url: "http://127.0.0.1:8080".to_owned(),
            configs_dir: PathBuf::from("configs"),
            default_map_pool: default_map_pool(),
            handoff: HandoffConfig::default(),
            ruleset: default_ruleset(),
            gateway_secret: None,
        }
    }
}

/// Failure to turn a configuration file into an [`AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    admin_ids: Vec<PlayerId>,
    public_base_url: Option<String>,
    configs_dir: Option<PathBuf>,
    default_map_pool: Option<Vec<String>>,
    #[serde(default)]
    handoff: HandoffConfig,
    ruleset: Option<IndexMap<String, String>>,
    gateway_secret: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            admin_ids: value.admin_ids,
            public_base_url: value
                .public_base_url
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.public_base_url),
            configs_dir: value.configs_dir.unwrap_or(defaults.configs_dir),
            default_map_pool: value.default_map_pool.unwrap_or(defaults.default_map_pool),
            handoff: value.handoff,
            ruleset: value.ruleset.unwrap_or(defaults.ruleset),
            gateway_secret: value
                .gateway_secret
                .filter(|secret| !secret.trim().is_empty()),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn default_map_pool() -> Vec<String> {
    [
        "de_dust2",
        "de_mirage",
        "de_inferno",
        "de_nuke",
        "de_overpass",
        "de_ancient",
        "de_anubis",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn default_ruleset() -> IndexMap<String, String> {
    [
        ("mp_maxrounds", "24"),
        ("mp_overtime_enable", "1"),
        ("mp_overtime_maxrounds", "6"),
        ("mp_overtime_startmoney", "10000"),
        ("mp_freezetime", "15"),
        ("mp_buy_time", "20"),
        ("mp_round_restart_delay", "5"),
        ("sv_alltalk", "0"),
        ("sv_deadtalk", "1"),
        ("mp_teammates_are_enemies", "0"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value.to_owned()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "admin_ids": [76561198000000001],
                "public_base_url": "https://pug.example.org/",
                "handoff": { "max_attempts": 2 }
            }"#,
        )
        .unwrap();

        assert!(config.is_admin(76561198000000001));
        assert!(!config.is_admin(1));
        assert_eq!(config.public_base_url, "https://pug.example.org");
        assert_eq!(config.handoff.max_attempts, 2);
        assert_eq!(config.handoff.command_timeout_ms, 3_000);
        assert_eq!(config.default_map_pool.len(), 7);
        assert_eq!(config.ruleset.get_index(0).unwrap().0, "mp_maxrounds");
    }

    #[test]
    fn defaults_pass_validation() {
        assert_eq!(AppConfig::default().validate(), Ok(()));
    }

    #[test]
    fn invalid_files_are_refused_at_load() {
        let cases = [
            (
                r#"{ "default_map_pool": ["de_dust2", "de_mirage"] }"#,
                ConfigError::PoolSize(2),
            ),
            (
                r#"{ "default_map_pool": ["de_dust2", "de_nuke", "de_dust2"] }"#,
                ConfigError::DuplicateMap("de_dust2".into()),
            ),
            (
                r#"{ "handoff": { "max_attempts": 0 } }"#,
                ConfigError::NoHandoffAttempts,
            ),
        ];
        for (json, expected) in cases {
            match AppConfig::from_json(json) {
                Err(ConfigLoadError::Invalid(err)) => assert_eq!(err, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
        }

        assert!(matches!(
            AppConfig::from_json(r#"{ "default_map_pool": ["de dust"] }"#),
            Err(ConfigLoadError::Invalid(ConfigError::PoolSize(1)))
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{ "default_map_pool": ["de dust", "a", "b"] }"#),
            Err(ConfigLoadError::Invalid(ConfigError::MapName(_)))
        ));
        assert!(matches!(
            AppConfig::from_json("{ not json"),
            Err(ConfigLoadError::Parse(_))
        ));
    }

    #[test]
    fn blank_gateway_secret_counts_as_unset() {
        let config = AppConfig::from_json(r#"{ "gateway_secret": "  " }"#).unwrap();
        assert_eq!(config.gateway_secret, None);
        let config = AppConfig::from_json(r#"{ "gateway_secret": "k3y" }"#).unwrap();
        assert_eq!(config.gateway_secret.as_deref(), Some("k3y"));
    }
}
