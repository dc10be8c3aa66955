//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::backend::BackendConfig;
use crate::error::ConfigError;
use crate::workflow::DEFAULT_HISTORY_LIMIT;

/// Server configuration, read from `OUTREACH_FLOW_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// `None` when no backend URL is set; saves and preview refreshes are
    /// then refused.
    pub backend: Option<BackendConfig>,
    /// Undo snapshots kept per session.
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/outreach-flow.db"),
            backend: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port: u16 = var("OUTREACH_FLOW_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let db_path = var("OUTREACH_FLOW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let history_limit: usize = var("OUTREACH_FLOW_HISTORY_LIMIT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.history_limit);
        if history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_FLOW_HISTORY_LIMIT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let timeout_secs: u64 = var("OUTREACH_FLOW_BACKEND_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        let backend = match var("OUTREACH_FLOW_BACKEND_URL").filter(|s| !s.trim().is_empty()) {
            Some(base_url) => {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(ConfigError::InvalidValue {
                        key: "OUTREACH_FLOW_BACKEND_URL".to_string(),
                        message: format!("expected an http(s) URL, got {base_url}"),
                    });
                }
                Some(BackendConfig {
                    base_url,
                    token: var("OUTREACH_FLOW_BACKEND_TOKEN")
                        .filter(|s| !s.is_empty())
                        .map(SecretString::from),
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            None => None,
        };

        Ok(Self {
            port,
            db_path,
            backend,
            history_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, PathBuf::from("./data/outreach-flow.db"));
        assert_eq!(config.history_limit, 50);
        assert!(config.backend.is_none());
    }

    #[test]
    fn backend_settings_are_read() {
        let config = config(&[
            ("OUTREACH_FLOW_PORT", "9000"),
            ("OUTREACH_FLOW_BACKEND_URL", "https://api.example.com"),
            ("OUTREACH_FLOW_BACKEND_TOKEN", "tok"),
            ("OUTREACH_FLOW_BACKEND_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        let backend = config.backend.unwrap();
        assert_eq!(backend.base_url, "https://api.example.com");
        assert_eq!(backend.token.unwrap().expose_secret(), "tok");
        assert_eq!(backend.timeout, Duration::from_secs(3));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config(&[("OUTREACH_FLOW_PORT", "not-a-port")]).unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("OUTREACH_FLOW_HISTORY_LIMIT", "0")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config(&[("OUTREACH_FLOW_BACKEND_URL", "ftp://nope")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
