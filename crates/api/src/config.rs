//! Process configuration read from environment variables.

use std::net::SocketAddr;

use splitledger_observability::LogFormat;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_JWT_SECRET: &str = "dev-secret";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("BIND_ADDR '{0}' is not a socket address")]
    InvalidBindAddr(String),

    #[error("{var} '{value}' is not a positive integer")]
    InvalidNumber { var: &'static str, value: String },

    #[error("LOG_FORMAT: {0}")]
    InvalidLogFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_format: LogFormat,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_raw.clone()))?;

        let jwt_secret =
            non_empty("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string());

        let database_max_connections = match non_empty("DATABASE_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    var: "DATABASE_MAX_CONNECTIONS",
                    value: raw,
                })?,
        };

        let log_format = match non_empty("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => raw.parse().map_err(ConfigError::InvalidLogFormat)?,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: non_empty("DATABASE_URL"),
            database_max_connections,
            log_format,
        })
    }

    /// True when no `JWT_SECRET` was supplied.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(config.uses_dev_secret());
        assert_eq!(config.database_url, None);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn explicit_values_are_used() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("LOG_FORMAT", "pretty"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ledger"));
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let config = ApiConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn invalid_values_are_reported() {
        assert_eq!(
            ApiConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])),
            Err(ConfigError::InvalidBindAddr("nowhere".to_string()))
        );
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[("DATABASE_MAX_CONNECTIONS", "0")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }
}
