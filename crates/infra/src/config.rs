//! Configuration loading and representation.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Runtime settings for the ledger engine and its stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Postgres URL. Only the Postgres store needs it.
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Upper bound on one transaction (lock wait + statements).
    pub tx_timeout: Duration,
    /// Retries after a concurrency conflict before the error surfaces.
    pub max_retries: u32,
    /// Base backoff; doubled on every retry.
    pub retry_backoff: Duration,
    /// Top-N cap for low-stock alerts.
    pub alert_limit: usize,
    /// Supplier name used for automatically created inbound plans.
    pub default_supplier: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            tx_timeout: Duration::from_millis(5_000),
            max_retries: 3,
            retry_backoff: Duration::from_millis(20),
            alert_limit: 50,
            default_supplier: "default-supplier".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Read `DATABASE_URL` and `STOCKLEDGER_*` variables, falling back to
    /// [`LedgerConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let default_supplier = std::env::var("STOCKLEDGER_DEFAULT_SUPPLIER")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.default_supplier);

        Self {
            database_url,
            max_connections: env_or("STOCKLEDGER_DB_MAX_CONNECTIONS", defaults.max_connections),
            tx_timeout: Duration::from_millis(env_or(
                "STOCKLEDGER_TX_TIMEOUT_MS",
                defaults.tx_timeout.as_millis() as u64,
            )),
            max_retries: env_or("STOCKLEDGER_MAX_RETRIES", defaults.max_retries),
            retry_backoff: Duration::from_millis(env_or(
                "STOCKLEDGER_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )),
            alert_limit: env_or("STOCKLEDGER_ALERT_LIMIT", defaults.alert_limit),
            default_supplier,
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_or(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(variable = name, value = raw, fallback = %default, "invalid config value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = LedgerConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.tx_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(20));
        assert_eq!(config.alert_limit, 50);
        assert_eq!(config.default_supplier, "default-supplier");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn unparsable_values_fall_back() {
        assert_eq!(parse_or("STOCKLEDGER_MAX_RETRIES", "lots", 3u32), 3);
        assert_eq!(parse_or("STOCKLEDGER_MAX_RETRIES", " 7 ", 3u32), 7);
        assert_eq!(parse_or("STOCKLEDGER_ALERT_LIMIT", "-1", 50usize), 50);
    }
}
