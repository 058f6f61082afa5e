//! Gateway configuration.
//!
//! Settings are read from `~/.config/sessiongate/config.json` (any missing
//! field takes its default) and can be overridden from the environment:
//!
//! | Variable                           | Field                  |
//! |------------------------------------|------------------------|
//! | `SESSIONGATE_API_URL`              | `api_url`              |
//! | `SESSIONGATE_REQUEST_TIMEOUT_SECS` | `request_timeout_secs` |
//! | `SESSIONGATE_RENEWAL_TIMEOUT_SECS` | `renewal_timeout_secs` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Application name used for the config directory path
const APP_NAME: &str = "sessiongate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:3000";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a single renewal call. Waiters are released with a
/// failure once it elapses.
const DEFAULT_RENEWAL_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find config directory")]
    NoConfigDir,

    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Backend paths for the session endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub refresh: String,
    pub logout: String,
    pub me: String,
    pub password_reset: String,
    pub password_reset_confirm: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
            me: "/auth/me".to_string(),
            password_reset: "/auth/password-reset/request".to_string(),
            password_reset_confirm: "/auth/password-reset/confirm".to_string(),
        }
    }
}

impl Endpoints {
    /// Endpoints that manage the session itself. A rejection from one of
    /// these never triggers a renewal.
    pub fn session_paths(&self) -> [&str; 5] {
        [
            self.login.as_str(),
            self.refresh.as_str(),
            self.logout.as_str(),
            self.password_reset.as_str(),
            self.password_reset_confirm.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_url: String,
    /// Status the backend uses for "credential invalid or expired".
    pub auth_rejected_status: u16,
    pub request_timeout_secs: u64,
    pub renewal_timeout_secs: u64,
    /// Extra path prefixes that bypass renewal, on top of the session
    /// endpoints.
    pub retry_excluded_prefixes: Vec<String>,
    pub endpoints: Endpoints,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_rejected_status: 401,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            renewal_timeout_secs: DEFAULT_RENEWAL_TIMEOUT_SECS,
            retry_excluded_prefixes: Vec::new(),
            endpoints: Endpoints::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, contents).map_err(io_err)
    }

    /// Override fields from environment-style lookups. Unparseable numbers
    /// are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SESSIONGATE_API_URL") {
            self.api_url = url;
        }
        if let Some(secs) = parse_secs(&lookup, "SESSIONGATE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "SESSIONGATE_RENEWAL_TIMEOUT_SECS") {
            self.renewal_timeout_secs = secs;
        }
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs)
    }

    /// Absolute URL for a backend path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Whether a path belongs to the session endpoints or an excluded prefix.
    pub fn is_retry_excluded(&self, path: &str) -> bool {
        self.endpoints.session_paths().contains(&path)
            || self
                .retry_excluded_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid timeout override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.api_url, "http://localhost:3000");
        assert_eq!(config.auth_rejected_status, 401);
        assert_eq!(config.renewal_timeout(), Duration::from_secs(10));
        assert_eq!(config.endpoints.refresh, "/auth/refresh");
        assert_eq!(config.endpoints.password_reset, "/auth/password-reset/request");
        assert_eq!(config.endpoints.password_reset_confirm, "/auth/password-reset/confirm");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_url": "https://api.shop.example", "endpoints": {"refresh": "/session/renew"}}"#,
        )
        .unwrap();

        let config = GatewayConfig::load_from(&path).unwrap();
        assert_eq!(config.api_url, "https://api.shop.example");
        assert_eq!(config.endpoints.refresh, "/session/renew");
        assert_eq!(config.endpoints.login, "/auth/login");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            GatewayConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = GatewayConfig {
            renewal_timeout_secs: 3,
            retry_excluded_prefixes: vec!["/public/".to_string()],
            ..GatewayConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(GatewayConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SESSIONGATE_API_URL", "https://staging.example"),
            ("SESSIONGATE_RENEWAL_TIMEOUT_SECS", "4"),
            ("SESSIONGATE_REQUEST_TIMEOUT_SECS", "soon"),
        ]);
        let mut config = GatewayConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_url, "https://staging.example");
        assert_eq!(config.renewal_timeout_secs, 4);
        // invalid value leaves the default
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_url_for_joins_cleanly() {
        let config = GatewayConfig {
            api_url: "http://localhost:3000/".to_string(),
            ..GatewayConfig::default()
        };
        assert_eq!(config.url_for("/products"), "http://localhost:3000/products");
    }

    #[test]
    fn test_retry_exclusion() {
        let mut config = GatewayConfig::default();
        assert!(config.is_retry_excluded("/auth/refresh"));
        assert!(config.is_retry_excluded("/auth/login"));
        assert!(config.is_retry_excluded("/auth/logout"));
        // session lookup goes through renewal like any resource
        assert!(!config.is_retry_excluded("/auth/me"));
        assert!(!config.is_retry_excluded("/products"));

        config.retry_excluded_prefixes.push("/public/".to_string());
        assert!(config.is_retry_excluded("/public/banners"));
    }
}
