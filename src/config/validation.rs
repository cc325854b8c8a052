use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, PortalConfig, ProxyConfig, SessionConfig,
};
use crate::proxy::ProxyRecord;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_proxy_config(&config.proxy)?;
    validate_portal_config(&config.portal)?;
    if let Some(session) = &config.session {
        validate_session_config(session)?;
    }
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if !(1900..=2100).contains(&config.start_year) {
        return Err(ConfigError::Validation(format!(
            "start_year must be between 1900 and 2100, got {}",
            config.start_year
        )));
    }

    if let Some(end_year) = config.end_year {
        if end_year < config.start_year {
            return Err(ConfigError::Validation(format!(
                "end_year ({}) must not be before start_year ({})",
                end_year, config.start_year
            )));
        }
    }

    if config.code_prefix.trim().is_empty() {
        return Err(ConfigError::Validation(
            "code_prefix cannot be empty".to_string(),
        ));
    }

    if config.max_requests_per_minute < 1 {
        return Err(ConfigError::Validation(format!(
            "max_requests_per_minute must be >= 1, got {}",
            config.max_requests_per_minute
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.backoff_base_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "backoff_base_secs must be >= 1, got {}",
            config.backoff_base_secs
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.max_consecutive_misses < 1 {
        return Err(ConfigError::Validation(format!(
            "max_consecutive_misses must be >= 1, got {}",
            config.max_consecutive_misses
        )));
    }

    Ok(())
}

/// Validates proxy configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.max_requests_per_proxy < 1 {
        return Err(ConfigError::Validation(format!(
            "max_requests_per_proxy must be >= 1, got {}",
            config.max_requests_per_proxy
        )));
    }

    for entry in &config.list {
        ProxyRecord::parse_entry(entry, &config.username, &config.password)?;
    }

    validate_url("probe_url", &config.probe_url)?;

    if config.probe_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "probe_timeout_secs must be >= 1, got {}",
            config.probe_timeout_secs
        )));
    }

    Ok(())
}

/// Validates registry endpoints
fn validate_portal_config(config: &PortalConfig) -> Result<(), ConfigError> {
    validate_url("validate_url", &config.validate_url)?;
    validate_url("fetch_url", &config.fetch_url)?;
    if let Some(detail_url) = &config.detail_url {
        validate_url("detail_url", detail_url)?;
    }

    if config.validate_param.is_empty() {
        return Err(ConfigError::Validation(
            "validate_param cannot be empty".to_string(),
        ));
    }

    if config.fetch_field.is_empty() {
        return Err(ConfigError::Validation(
            "fetch_field cannot be empty".to_string(),
        ));
    }

    if !config.fetch_filter.contains("{code}") {
        return Err(ConfigError::Validation(format!(
            "fetch_filter must contain the {{code}} placeholder, got '{}'",
            config.fetch_filter
        )));
    }

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.primary_token.is_empty() || config.session_id.is_empty() {
        return Err(ConfigError::Validation(
            "session cookies cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates an absolute http(s) URL
fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, value
        )));
    }

    Ok(())
}
