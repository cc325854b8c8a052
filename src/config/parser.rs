use crate::config::types::{Config, SessionConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// Environment overrides (`PROXY_LIST`, `PROXY_USERNAME`, `PROXY_PASSWORD`,
/// `SESSION_PSUSR`, `SESSION_JSESSIONID`) are applied before validation.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use vntm_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Start year: {}", config.crawler.start_year);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Applies overrides looked up through `lookup`
///
/// Empty values are ignored. The session override only applies when both
/// cookies are provided.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(list) = lookup("PROXY_LIST") {
        config.proxy.list = list
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    if let Some(username) = lookup("PROXY_USERNAME") {
        config.proxy.username = username;
    }

    if let Some(password) = lookup("PROXY_PASSWORD") {
        config.proxy.password = password;
    }

    if let (Some(primary_token), Some(session_id)) =
        (lookup("SESSION_PSUSR"), lookup("SESSION_JSESSIONID"))
    {
        config.session = Some(SessionConfig {
            primary_token,
            session_id,
            expires_at: None,
        });
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded on every crawl run so runs made with different settings can be
/// told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
