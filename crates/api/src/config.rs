//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on the in-memory store
/// - `PAYMENT_MIN_DELAY_MS` / `PAYMENT_MAX_DELAY_MS`: simulated gateway delay bounds (default: 2000 / 5000)
/// - `PAYMENT_SUCCESS_RATE`: simulated approval probability (default: `0.9`)
/// - `PAYMENT_STALL_THRESHOLD_SECS`: age after which an unsettled payment is re-driven at start-up (default: 300)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub payment_min_delay: Duration,
    pub payment_max_delay: Duration,
    pub payment_success_rate: f64,
    pub payment_stall_threshold: Duration,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            payment_min_delay: env_parse("PAYMENT_MIN_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.payment_min_delay),
            payment_max_delay: env_parse("PAYMENT_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.payment_max_delay),
            payment_success_rate: env_parse("PAYMENT_SUCCESS_RATE")
                .unwrap_or(defaults.payment_success_rate),
            payment_stall_threshold: env_parse("PAYMENT_STALL_THRESHOLD_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.payment_stall_threshold),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            payment_min_delay: Duration::from_millis(2000),
            payment_max_delay: Duration::from_millis(5000),
            payment_success_rate: 0.9,
            payment_stall_threshold: Duration::from_secs(300),
        }
    }
}
