//! Runtime configuration, read from the environment (and `.env`).

use std::time::Duration;
use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8083;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CURRENCY: &str = "NGN";
const DEFAULT_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable '{0}'")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Postgres URL. Without one the service keeps everything in memory.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub nats_url: Option<String>,
    pub jwt_secret: String,
    pub request_timeout: Duration,
    pub rentals_enabled: bool,
    pub currency: String,
    pub default_page_limit: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid { name: "JWT_SECRET", reason: "must be at least 32 characters".into() });
        }
        let currency = get("CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()).to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid { name: "CURRENCY", reason: format!("'{currency}' is not an ISO 4217 code") });
        }
        let default_page_limit = parse(get("DEFAULT_PAGE_LIMIT"), "DEFAULT_PAGE_LIMIT", DEFAULT_PAGE_LIMIT)?;
        if default_page_limit == 0 {
            return Err(ConfigError::Invalid { name: "DEFAULT_PAGE_LIMIT", reason: "must be positive".into() });
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse(get("PORT"), "PORT", DEFAULT_PORT)?,
            database_url: get("DATABASE_URL"),
            max_connections: parse(get("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            nats_url: get("NATS_URL"),
            jwt_secret,
            request_timeout: Duration::from_secs(parse(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?),
            rentals_enabled: parse(get("RENTALS_ENABLED"), "RENTALS_ENABLED", false)?,
            currency,
            default_page_limit,
        })
    }

    pub fn bind_addr(&self) -> String { format!("{}:{}", self.host, self.port) }
}

fn parse<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid { name, reason: e.to_string() }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8083");
        assert!(cfg.database_url.is_none());
        assert!(!cfg.rentals_enabled);
        assert_eq!(cfg.currency, "NGN");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides_and_errors() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", SECRET), ("PORT", "9000"), ("RENTALS_ENABLED", "true"), ("CURRENCY", "usd"),
            ("DATABASE_URL", "postgres://localhost/shop"),
        ])).unwrap();
        assert_eq!(cfg.port, 9000);
        assert!(cfg.rentals_enabled);
        assert_eq!(cfg.currency, "USD");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/shop"));

        assert!(matches!(AppConfig::from_lookup(lookup(&[])), Err(ConfigError::Missing("JWT_SECRET"))));
        assert!(matches!(AppConfig::from_lookup(lookup(&[("JWT_SECRET", "short")])), Err(ConfigError::Invalid { name: "JWT_SECRET", .. })));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("JWT_SECRET", SECRET), ("PORT", "http")])),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
    }
}
