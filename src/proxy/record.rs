use crate::ConfigError;
use chrono::{DateTime, Utc};
use url::Url;

/// A proxy the crawler can route requests through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Result of the most recent probe or request
    pub is_active: bool,
    /// Successful requests served since this proxy last became current
    pub request_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ProxyRecord {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            is_active: true,
            request_count: 0,
            last_used_at: None,
        }
    }

    /// Parses a `host:port` entry from configuration
    pub fn parse_entry(entry: &str, username: &str, password: &str) -> Result<Self, ConfigError> {
        let entry = entry.trim();
        let (host, port) = entry
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidProxy(format!("'{}' is not host:port", entry)))?;

        if host.is_empty() {
            return Err(ConfigError::InvalidProxy(format!(
                "'{}' has an empty host",
                entry
            )));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidProxy(format!("'{}' has an invalid port", entry)))?;

        Ok(Self::new(host, port, username, password))
    }

    /// Proxy URL, `http://{username}:{password}@{host}:{port}`
    ///
    /// Credentials are percent-encoded; they are left out entirely when no
    /// username is configured.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("http://{}:{}", self.host, self.port))?;
        if !self.username.is_empty() {
            // Setting credentials only fails for cannot-be-a-base URLs
            let _ = url.set_username(&self.username);
            let _ = url.set_password(Some(&self.password));
        }
        Ok(url)
    }

    /// `host:port`, safe to log
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
