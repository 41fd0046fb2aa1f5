//! CalDAV backend configuration.

use std::time::Duration;
use url::Url;

/// Configuration for talking to one CalDAV server.
#[derive(Debug, Clone)]
pub struct CalDavConfig {
    /// Base URL of the server (principal or calendar-home collection).
    pub url: Url,

    /// Username for authentication.
    pub username: Option<String>,

    /// Password for authentication.
    pub password: Option<String>,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl CalDavConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration for the given server URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(url.as_ref())?,
            username: None,
            password: None,
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("weekview/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Sets the credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Disables TLS verification (for testing only).
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL as a string.
    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    /// Returns true if credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_creation() {
        let config = CalDavConfig::new("https://caldav.example.com/calendars/user/").unwrap();
        assert_eq!(
            config.url.as_str(),
            "https://caldav.example.com/calendars/user/"
        );
        assert!(!config.has_credentials());
        assert!(config.verify_tls);
    }

    #[test]
    fn config_with_credentials() {
        let config = CalDavConfig::new("https://caldav.example.com/")
            .unwrap()
            .with_credentials("user", "pass");

        assert!(config.has_credentials());
        assert_eq!(config.username, Some("user".to_string()));
    }

    #[test]
    fn config_builder_methods() {
        let config = CalDavConfig::new("https://caldav.example.com/")
            .unwrap()
            .with_insecure_tls()
            .with_timeout(Duration::from_secs(60));

        assert!(!config.verify_tls);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_url_returns_error() {
        assert!(CalDavConfig::new("not a valid url").is_err());
    }
}
