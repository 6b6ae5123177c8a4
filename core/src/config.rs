//! Client configuration loaded from environment variables.
//!
//! The API base URL is injected at deploy time, so it comes from the
//! environment (or a `.env` file in development) rather than being compiled
//! in.

use std::env;
use std::path::PathBuf;

use time::Duration;

use crate::credentials::DEFAULT_COOKIE_TTL;

/// Longest cookie lifetime browsers honor.
pub const MAX_COOKIE_TTL_DAYS: i64 = 400;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the remote API, without a trailing slash.
    pub api_base_url: String,
    /// Lifetime of the `authToken` cookie.
    pub cookie_ttl: Duration,
    /// JSON file backing the local store; in-memory when `None`.
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            cookie_ttl: DEFAULT_COOKIE_TTL,
            storage_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, reading `.env` first
    /// if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("NAVSITE_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("NAVSITE_API_URL"))?;
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "NAVSITE_API_URL",
                value: api_base_url,
            });
        }

        let cookie_ttl = match lookup("NAVSITE_COOKIE_TTL_DAYS") {
            Some(raw) => {
                let days: i64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "NAVSITE_COOKIE_TTL_DAYS",
                    value: raw.clone(),
                })?;
                if !(1..=MAX_COOKIE_TTL_DAYS).contains(&days) {
                    return Err(ConfigError::Invalid {
                        key: "NAVSITE_COOKIE_TTL_DAYS",
                        value: raw,
                    });
                }
                Duration::days(days)
            }
            None => DEFAULT_COOKIE_TTL,
        };

        let storage_path = lookup("NAVSITE_STORAGE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_base_url,
            cookie_ttl,
            storage_path,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config =
            ClientConfig::from_lookup(lookup(&[("NAVSITE_API_URL", "https://api.example.com/")]))
                .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.cookie_ttl, Duration::days(7));
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NAVSITE_API_URL")));
    }

    #[test]
    fn rejects_non_http_url_and_bad_ttl() {
        let err = ClientConfig::from_lookup(lookup(&[("NAVSITE_API_URL", "ftp://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "NAVSITE_API_URL", .. }));

        let err = ClientConfig::from_lookup(lookup(&[
            ("NAVSITE_API_URL", "http://x"),
            ("NAVSITE_COOKIE_TTL_DAYS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "NAVSITE_COOKIE_TTL_DAYS", .. }));
    }

    #[test]
    fn cookie_ttl_is_capped() {
        let with_ttl = |days: &str| {
            ClientConfig::from_lookup(lookup(&[
                ("NAVSITE_API_URL", "http://x"),
                ("NAVSITE_COOKIE_TTL_DAYS", days),
            ]))
        };
        assert_eq!(with_ttl("400").unwrap().cookie_ttl, Duration::days(400));
        for days in ["401", "1000000000", "9223372036854775807"] {
            let err = with_ttl(days).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: "NAVSITE_COOKIE_TTL_DAYS", .. }));
        }
    }

    #[test]
    fn optional_values_are_read() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("NAVSITE_API_URL", "http://localhost:8080"),
            ("NAVSITE_COOKIE_TTL_DAYS", "30"),
            ("NAVSITE_STORAGE_PATH", "/tmp/navsite.json"),
        ]))
        .unwrap();
        assert_eq!(config.cookie_ttl, Duration::days(30));
        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/navsite.json")));
    }
}
