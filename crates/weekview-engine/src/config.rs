//! Account configuration and engine constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weekview_caldav::{CalDavConfig, CalDavError, CalDavResult};

/// Default number of days to sync ahead.
pub const DEFAULT_DAYS_TO_SYNC: u32 = 7;
/// Minimum accepted days-to-sync value.
pub const MIN_DAYS_TO_SYNC: u32 = 1;
/// Maximum accepted days-to-sync value.
pub const MAX_DAYS_TO_SYNC: u32 = 30;

/// Interval between automatic refresh cycles.
pub const POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Connection setup attempts before giving up on a cycle.
pub const SETUP_ATTEMPTS: u32 = 3;
/// Delay between setup attempts.
pub const SETUP_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Configuration for one synced account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// CalDAV server URL (principal or calendar-home collection).
    pub url: String,
    /// Username for authentication.
    pub username: String,
    /// Password (for iCloud, an app-specific password).
    pub password: String,
    /// How many days ahead to sync; clamped to `[1, 30]`.
    #[serde(default = "default_days_to_sync")]
    pub days_to_sync: u32,
    /// Whether the scheduler refreshes automatically.
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

fn default_days_to_sync() -> u32 {
    DEFAULT_DAYS_TO_SYNC
}

fn default_auto_refresh() -> bool {
    true
}

impl AccountConfig {
    /// Creates a config with default sync options.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            days_to_sync: DEFAULT_DAYS_TO_SYNC,
            auto_refresh: true,
        }
    }

    /// The configured sync horizon, clamped into the accepted range.
    pub fn effective_days_to_sync(&self) -> u32 {
        self.days_to_sync.clamp(MIN_DAYS_TO_SYNC, MAX_DAYS_TO_SYNC)
    }

    /// Builds the CalDAV backend configuration for this account.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the URL is invalid or
    /// credentials are blank.
    pub fn caldav_config(&self) -> CalDavResult<CalDavConfig> {
        if self.username.trim().is_empty() || self.password.trim().is_empty() {
            return Err(CalDavError::configuration(
                "username and password must not be empty",
            ));
        }

        let config = CalDavConfig::new(&self.url)
            .map_err(|e| {
                CalDavError::configuration(format!("invalid server URL {:?}: {}", self.url, e))
            })?
            .with_credentials(&self.username, &self.password);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AccountConfig {
        AccountConfig::new("https://caldav.icloud.com/", "user@example.com", "app-pass")
    }

    #[test]
    fn defaults() {
        let config = sample();
        assert_eq!(config.days_to_sync, 7);
        assert!(config.auto_refresh);
    }

    #[test]
    fn days_to_sync_is_clamped() {
        let mut config = sample();

        config.days_to_sync = 0;
        assert_eq!(config.effective_days_to_sync(), 1);

        config.days_to_sync = 90;
        assert_eq!(config.effective_days_to_sync(), 30);

        config.days_to_sync = 14;
        assert_eq!(config.effective_days_to_sync(), 14);
    }

    #[test]
    fn caldav_config_from_account() {
        let config = sample().caldav_config().unwrap();
        assert_eq!(config.url_str(), "https://caldav.icloud.com/");
        assert!(config.has_credentials());
    }

    #[test]
    fn rejects_invalid_url() {
        let mut config = sample();
        config.url = "not a url".to_string();
        assert!(config.caldav_config().is_err());
    }

    #[test]
    fn rejects_blank_credentials() {
        let mut config = sample();
        config.password = "  ".to_string();
        assert!(config.caldav_config().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "url": "https://caldav.icloud.com/",
            "username": "user@example.com",
            "password": "secret"
        }"#;
        let config: AccountConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.days_to_sync, DEFAULT_DAYS_TO_SYNC);
        assert!(config.auto_refresh);
    }
}
