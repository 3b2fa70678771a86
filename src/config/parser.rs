use crate::config::types::{Config, CrawlerConfig, SiteConfig, StoreConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_BASE_URL: &str = "https://ksa.yallamotor.com";
pub const DEFAULT_COLLECTION: &str = "new_cars";

/// Loads configuration from the process environment
///
/// If `env_file` is given it must exist; otherwise a `.env` in the working
/// directory is loaded when present. Variables already set in the
/// environment win over the file.
pub fn load_config(env_file: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with_overrides(env_file, &HashMap::new())
}

/// Like [`load_config`], but values in `overrides` win over the environment
///
/// Keys are variable names such as `MAX_PAGES`. Used for command-line flags.
pub fn load_config_with_overrides(
    env_file: Option<&Path>,
    overrides: &HashMap<&'static str, String>,
) -> Result<Config, ConfigError> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => {
            // A missing .env is fine; a malformed one is not
            if let Err(e) = dotenvy::dotenv() {
                if !e.not_found() {
                    return Err(e.into());
                }
            }
        }
    }

    from_lookup(|key| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })
}

/// Builds and validates a configuration from a key lookup
///
/// The lookup returns the raw value for a variable name, or `None` when unset.
/// Empty values are treated as unset.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let defaults = CrawlerConfig::default();

    let config = Config {
        site: SiteConfig {
            base_url: get("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_agent: get("USER_AGENT").unwrap_or_else(default_user_agent),
        },
        crawler: CrawlerConfig {
            max_pages: match get("MAX_PAGES") {
                Some(raw) => parse_page_limit(&raw)?,
                None => defaults.max_pages,
            },
            concurrency: parse_or("CONCURRENCY", get("CONCURRENCY"), defaults.concurrency)?,
            skip_existing: match get("SKIP_EXISTING") {
                Some(raw) => parse_bool("SKIP_EXISTING", &raw)?,
                None => defaults.skip_existing,
            },
            request_timeout_ms: parse_or(
                "REQUEST_TIMEOUT_MS",
                get("REQUEST_TIMEOUT_MS"),
                defaults.request_timeout_ms,
            )?,
            settle_ms: parse_or("SETTLE_MS", get("SETTLE_MS"), defaults.settle_ms)?,
            max_retries: parse_or("MAX_RETRIES", get("MAX_RETRIES"), defaults.max_retries)?,
            retry_backoff_ms: parse_or(
                "RETRY_BACKOFF_MS",
                get("RETRY_BACKOFF_MS"),
                defaults.retry_backoff_ms,
            )?,
            repeat_interval_hours: get("REPEAT_INTERVAL_HOURS")
                .map(|raw| parse_value("REPEAT_INTERVAL_HOURS", &raw))
                .transpose()?,
        },
        store: StoreConfig {
            connection_uri: get("STORE_URI").ok_or(ConfigError::Missing("STORE_URI"))?,
            database_name: get("STORE_DB").ok_or(ConfigError::Missing("STORE_DB"))?,
            collection: get("STORE_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
        },
    };

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 fingerprint of the effective configuration
///
/// Logged at startup so runs with different settings can be told apart.
pub fn compute_config_hash(config: &Config) -> String {
    // Config only holds strings, integers and bools, so serialization cannot fail
    let content = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        message: format!("'{}': {}", raw, e),
    })
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

/// `0`, `unbounded` and `none` all mean "no page limit"
fn parse_page_limit(raw: &str) -> Result<Option<u32>, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "0" | "unbounded" | "none" => Ok(None),
        other => parse_value("MAX_PAGES", other).map(Some),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key,
            message: format!("'{}' is not a boolean", other),
        }),
    }
}
