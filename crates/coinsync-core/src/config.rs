//! Runtime configuration.
//!
//! Values resolve in order: built-in defaults, a `.env` file in the working
//! directory (loaded with `dotenvy`, never overriding real variables), process
//! environment, then whatever the CLI sets on the returned struct.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::coingecko::DEFAULT_BASE_URL;
use crate::sync::SyncSettings;

pub const ENV_HOME: &str = "COINSYNC_HOME";
pub const ENV_DB_PATH: &str = "COINSYNC_DB_PATH";
pub const ENV_API_KEY: &str = "COINSYNC_API_KEY";
pub const ENV_LEGACY_API_KEY: &str = "CRYPTO_API_KEY";
pub const ENV_PROVIDER_URL: &str = "COINSYNC_PROVIDER_URL";
pub const ENV_POLL_INTERVAL_SECS: &str = "COINSYNC_POLL_INTERVAL_SECS";
pub const ENV_SNAPSHOT_SIZE: &str = "COINSYNC_SNAPSHOT_SIZE";
pub const ENV_FETCH_TIMEOUT_MS: &str = "COINSYNC_FETCH_TIMEOUT_MS";
pub const ENV_STORE_TIMEOUT_MS: &str = "COINSYNC_STORE_TIMEOUT_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("no provider API key configured; set {ENV_API_KEY} (or {ENV_LEGACY_API_KEY})")]
    MissingApiKey,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub api_key: Option<String>,
    pub provider_url: String,
    pub poll_interval: Duration,
    pub snapshot_size: usize,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("home", &self.home)
            .field("db_path", &self.db_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider_url", &self.provider_url)
            .field("poll_interval", &self.poll_interval)
            .field("snapshot_size", &self.snapshot_size)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl AppConfig {
    /// Load `.env`, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let home = get(ENV_HOME)
            .map(PathBuf::from)
            .or_else(|| get("HOME").map(|home| PathBuf::from(home).join(".coinsync")))
            .unwrap_or_else(|| PathBuf::from(".coinsync"));
        let db_path = get(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("coinsync.duckdb"));

        let poll_secs: u64 = parse_positive(ENV_POLL_INTERVAL_SECS, get(ENV_POLL_INTERVAL_SECS), 5)?;
        let fetch_ms: u64 = parse_positive(ENV_FETCH_TIMEOUT_MS, get(ENV_FETCH_TIMEOUT_MS), 10_000)?;
        let store_ms: u64 = parse_positive(ENV_STORE_TIMEOUT_MS, get(ENV_STORE_TIMEOUT_MS), 5_000)?;

        Ok(Self {
            home,
            db_path,
            api_key: get(ENV_API_KEY).or_else(|| get(ENV_LEGACY_API_KEY)),
            provider_url: get(ENV_PROVIDER_URL).unwrap_or_else(|| String::from(DEFAULT_BASE_URL)),
            poll_interval: Duration::from_secs(poll_secs),
            snapshot_size: parse_positive(ENV_SNAPSHOT_SIZE, get(ENV_SNAPSHOT_SIZE), 50)?,
            fetch_timeout: Duration::from_millis(fetch_ms),
            store_timeout: Duration::from_millis(store_ms),
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            snapshot_size: self.snapshot_size,
            poll_interval: self.poll_interval,
            fetch_timeout: self.fetch_timeout,
            store_timeout: self.store_timeout,
        }
    }
}

fn parse_positive<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let parsed = raw
        .trim()
        .parse::<T>()
        .map_err(|error| ConfigError::InvalidValue {
            name,
            value: raw.clone(),
            reason: error.to_string(),
        })?;
    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            name,
            value: raw,
            reason: String::from("must be greater than zero"),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config(&[("HOME", "/home/test")]).expect("config");

        assert_eq!(config.home, PathBuf::from("/home/test/.coinsync"));
        assert_eq!(config.db_path, PathBuf::from("/home/test/.coinsync/coinsync.duckdb"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.snapshot_size, 50);
        assert_eq!(config.provider_url, DEFAULT_BASE_URL);
        assert_eq!(config.require_api_key(), Err(ConfigError::MissingApiKey));
    }

    #[test]
    fn legacy_key_is_a_fallback_only() {
        let legacy = config(&[(ENV_LEGACY_API_KEY, "old")]).expect("config");
        assert_eq!(legacy.require_api_key(), Ok("old"));

        let both = config(&[(ENV_LEGACY_API_KEY, "old"), (ENV_API_KEY, "new")]).expect("config");
        assert_eq!(both.require_api_key(), Ok("new"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = config(&[(ENV_POLL_INTERVAL_SECS, "0")]).expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: ENV_POLL_INTERVAL_SECS,
                ..
            }
        ));
    }

    #[test]
    fn non_numeric_size_is_rejected() {
        let err = config(&[(ENV_SNAPSHOT_SIZE, "fifty")]).expect_err("must fail");
        assert!(err.to_string().contains(ENV_SNAPSHOT_SIZE));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let config = config(&[(ENV_API_KEY, "secret-key")]).expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
