use anyhow::{Context, Result};
use linode_api::{DEFAULT_API_URL, HttpConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "LINODE_TOKEN";
/// Environment variable overriding the API base URL.
pub const URL_ENV: &str = "LINODE_URL";

/// Get the default config file path (~/.config/linode-provider/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home
        .join(".config")
        .join("linode-provider")
        .join("config.toml"))
}

// ============================================================================
// Provider Config
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no API token configured; set `token` or {TOKEN_ENV}")]
    MissingToken,

    #[error("min_retry_delay_ms ({min}) must not exceed max_retry_delay_ms ({max})")]
    RetryDelays { min: u64, max: u64 },

    #[error("event_poll_ms must be greater than zero")]
    PollInterval,

    #[error("request_timeout_s must be greater than zero")]
    RequestTimeout,
}

/// Provider settings, loaded from TOML with environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default = "default_event_poll_ms")]
    pub event_poll_ms: u64,

    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,

    /// Never reboot an instance to apply an IP change.
    #[serde(default)]
    pub skip_implicit_reboots: bool,

    #[serde(default = "default_min_retry_delay_ms")]
    pub min_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// PEM bundle trusted for the API connection.
    #[serde(default)]
    pub api_ca_cert: Option<String>,
}

fn default_event_poll_ms() -> u64 {
    3000
}

fn default_request_timeout_s() -> u64 {
    120
}

fn default_min_retry_delay_ms() -> u64 {
    100
}

fn default_max_retry_delay_ms() -> u64 {
    2000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: None,
            event_poll_ms: default_event_poll_ms(),
            request_timeout_s: default_request_timeout_s(),
            skip_implicit_reboots: false,
            min_retry_delay_ms: default_min_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            api_ca_cert: None,
        }
    }
}

impl ProviderConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid provider config")
    }

    /// Load from `path`, or from the default location when `path` is None.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::read(&path)?
                } else {
                    log::debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log::debug!("Loaded provider config from {}", path.display());
        Ok(config)
    }

    /// Override token and API URL from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.token = token;
        }
        if let Some(url) = lookup(URL_ENV).filter(|u| !u.is_empty()) {
            self.api_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.min_retry_delay_ms > self.max_retry_delay_ms {
            return Err(ConfigError::RetryDelays {
                min: self.min_retry_delay_ms,
                max: self.max_retry_delay_ms,
            });
        }
        if self.event_poll_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        if self.request_timeout_s == 0 {
            return Err(ConfigError::RequestTimeout);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }

    /// Connection settings for the HTTP client.
    pub fn http_config(&self) -> Result<HttpConfig> {
        self.validate()?;
        let mut http = HttpConfig::new(self.token.trim());
        http.api_url = self
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        http.request_timeout = Duration::from_secs(self.request_timeout_s);
        http.retry = RetryConfig::from_delays(
            Duration::from_millis(self.min_retry_delay_ms),
            Duration::from_millis(self.max_retry_delay_ms),
        );
        http.ca_cert = self
            .api_ca_cert
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()));
        http.user_agent = format!("linode-provider/{}", env!("CARGO_PKG_VERSION"));
        Ok(http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::from_toml("token = \"abc\"").unwrap();
        assert_eq!(config.event_poll_ms, 3000);
        assert_eq!(config.request_timeout_s, 120);
        assert_eq!(config.min_retry_delay_ms, 100);
        assert_eq!(config.max_retry_delay_ms, 2000);
        assert!(!config.skip_implicit_reboots);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(ProviderConfig::from_toml("tokn = \"abc\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ProviderConfig::from_toml("token = \"file\"").unwrap();
        config.apply_env(env(&[(TOKEN_ENV, "env"), (URL_ENV, "http://localhost:8080/v4")]));
        assert_eq!(config.token, "env");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:8080/v4"));

        let mut config = ProviderConfig::from_toml("token = \"file\"").unwrap();
        config.apply_env(env(&[(TOKEN_ENV, "")]));
        assert_eq!(config.token, "file");
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            ProviderConfig::default().validate(),
            Err(ConfigError::MissingToken)
        );

        let config = ProviderConfig {
            token: "t".to_string(),
            min_retry_delay_ms: 5000,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::RetryDelays {
                min: 5000,
                max: 2000
            })
        );

        let config = ProviderConfig {
            token: "t".to_string(),
            event_poll_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::PollInterval));
    }

    #[test]
    fn test_http_config() {
        let config = ProviderConfig {
            token: " t ".to_string(),
            api_url: Some("http://localhost/v4/".to_string()),
            request_timeout_s: 30,
            ..Default::default()
        };
        let http = config.http_config().unwrap();
        assert_eq!(http.token, "t");
        assert_eq!(http.api_url, "http://localhost/v4");
        assert_eq!(http.request_timeout, Duration::from_secs(30));
        assert_eq!(http.retry.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "token = \"abc\"\nskip_implicit_reboots = true\n").unwrap();
        let config = ProviderConfig::read(&path).unwrap();
        assert!(config.skip_implicit_reboots);

        let missing = dir.path().join("missing.toml");
        assert!(ProviderConfig::load(Some(&missing)).is_err());
    }
}
