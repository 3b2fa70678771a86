use crate::config::types::{Config, CrawlerConfig, SiteConfig, StoreConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_store_config(&config.store)?;
    Ok(())
}

/// Validates site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            config.base_url
        )));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.settle_ms >= config.request_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "settle_ms ({}ms) must be shorter than request_timeout_ms ({}ms)",
            config.settle_ms, config.request_timeout_ms
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.repeat_interval_hours == Some(0) {
        return Err(ConfigError::Validation(
            "repeat_interval_hours must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    let uri = config.connection_uri.as_str();
    let recognised = uri == "sqlite::memory:"
        || uri
            .strip_prefix("sqlite://")
            .is_some_and(|rest| !rest.is_empty());

    if !recognised {
        return Err(ConfigError::Validation(format!(
            "store_connection_uri must be 'sqlite::memory:' or 'sqlite://<directory>', got '{}'",
            uri
        )));
    }

    validate_identifier("store_database_name", &config.database_name)?;
    validate_identifier("store_collection", &config.collection)?;

    Ok(())
}

/// Database and collection names end up in file names and SQL, so keep them plain
fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "{} must contain only ASCII letters, digits and underscores, got '{}'",
            field, value
        )));
    }

    if value.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ConfigError::Validation(format!(
            "{} cannot start with a digit, got '{}'",
            field, value
        )));
    }

    Ok(())
}
