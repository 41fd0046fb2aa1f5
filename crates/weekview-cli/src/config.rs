//! Config file loading.
//!
//! The account config lives in a small TOML file:
//!
//! ```toml
//! url = "https://caldav.icloud.com/"
//! username = "user@example.com"
//! password = "app-specific-password"
//! days_to_sync = 7
//! auto_refresh = true
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;
use weekview_engine::AccountConfig;

/// Errors from config file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config path given and no default location available.
    #[error("no config file found; create {0} or pass --config")]
    Missing(String),

    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for an account config.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Returns the default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("weekview").join("config.toml"))
}

/// Loads the account config from `path`, or from the default location.
pub fn load_account(path: Option<&Path>) -> Result<AccountConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().ok_or_else(|| {
            ConfigError::Missing("<config dir>/weekview/config.toml".to_string())
        })?,
    };

    let display = path.display().to_string();

    if !path.exists() {
        return Err(ConfigError::Missing(display));
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
url = "https://caldav.icloud.com/"
username = "user@example.com"
password = "secret"
days_to_sync = 14
auto_refresh = false
"#
        )
        .unwrap();

        let config = load_account(Some(file.path())).unwrap();
        assert_eq!(config.url, "https://caldav.icloud.com/");
        assert_eq!(config.days_to_sync, 14);
        assert!(!config.auto_refresh);
    }

    #[test]
    fn optional_fields_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
url = "https://caldav.icloud.com/"
username = "user@example.com"
password = "secret"
"#
        )
        .unwrap();

        let config = load_account(Some(file.path())).unwrap();
        assert_eq!(config.days_to_sync, 7);
        assert!(config.auto_refresh);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_account(Some(Path::new("/nonexistent/weekview.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn invalid_toml_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "url = [not toml").unwrap();

        let err = load_account(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
