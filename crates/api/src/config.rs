//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::{RetryPolicy, TaxRate};
use query::PageSettings;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` — PostgreSQL URL; unset means the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `TAX_RATE_BPS` — tax rate in basis points (default: `1000`, i.e. 10%)
/// - `DEFAULT_PAGE_SIZE` / `MAX_PAGE_SIZE` — listing page sizes (default: `10` / `100`)
/// - `NOTIFY_MAX_ATTEMPTS` — confirmation delivery attempts (default: `3`)
/// - `NOTIFY_RETRY_DELAY_MS` — delay before the first retry (default: `200`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub tax_rate_bps: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub notify_max_attempts: u32,
    pub notify_retry_delay_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(lookup("PORT")).unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            database_max_connections: parsed(lookup("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            tax_rate_bps: parsed(lookup("TAX_RATE_BPS")).unwrap_or(defaults.tax_rate_bps),
            default_page_size: parsed(lookup("DEFAULT_PAGE_SIZE"))
                .unwrap_or(defaults.default_page_size),
            max_page_size: parsed(lookup("MAX_PAGE_SIZE")).unwrap_or(defaults.max_page_size),
            notify_max_attempts: parsed(lookup("NOTIFY_MAX_ATTEMPTS"))
                .unwrap_or(defaults.notify_max_attempts),
            notify_retry_delay_ms: parsed(lookup("NOTIFY_RETRY_DELAY_MS"))
                .unwrap_or(defaults.notify_retry_delay_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_basis_points(self.tax_rate_bps)
    }

    pub fn page_settings(&self) -> PageSettings {
        PageSettings {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.notify_max_attempts,
            Duration::from_millis(self.notify_retry_delay_ms),
        )
    }
}

/// Parses a raw value, treating unparseable input as unset.
fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            tax_rate_bps: 1000,
            default_page_size: 10,
            max_page_size: 100,
            notify_max_attempts: 3,
            notify_retry_delay_ms: 200,
        }
    }
}
