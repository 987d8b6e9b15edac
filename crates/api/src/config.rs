//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::{Money, PricingPolicy};
use fanout::HubConfig;
use saga::CoordinatorConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory gateway
/// - `STEP_TIMEOUT_MS`: per-step timeout (default: `5000`)
/// - `COMPENSATION_RETRIES`: retries for a transient compensation failure (default: `3`)
/// - `COMPENSATION_BACKOFF_MS`: pause between compensation attempts (default: `100`)
/// - `RECENT_RECORDS`: records per collection in an initial snapshot (default: `20`)
/// - `OBSERVER_BUFFER`: per-observer queue capacity (default: `256`)
/// - `CHANGE_POLL_INTERVAL_MS`: PostgreSQL change feed poll interval (default: `500`)
/// - `SERVICE_FEE_CENTS`: flat booking service fee (default: `500`)
/// - `REQUIRE_GUIDE_VERIFICATION`: roll back onboarding when the
///   verification record fails (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub step_timeout: Duration,
    pub compensation_retries: u32,
    pub compensation_backoff: Duration,
    pub recent_records: usize,
    pub observer_buffer: usize,
    pub change_poll_interval: Duration,
    pub service_fee_cents: i64,
    pub require_guide_verification: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            step_timeout: Duration::from_millis(env_or("STEP_TIMEOUT_MS", 5_000)),
            compensation_retries: env_or("COMPENSATION_RETRIES", defaults.compensation_retries),
            compensation_backoff: Duration::from_millis(env_or("COMPENSATION_BACKOFF_MS", 100)),
            recent_records: env_or("RECENT_RECORDS", defaults.recent_records),
            observer_buffer: env_or("OBSERVER_BUFFER", defaults.observer_buffer),
            change_poll_interval: Duration::from_millis(env_or("CHANGE_POLL_INTERVAL_MS", 500)),
            service_fee_cents: env_or("SERVICE_FEE_CENTS", defaults.service_fee_cents),
            require_guide_verification: env_or(
                "REQUIRE_GUIDE_VERIFICATION",
                defaults.require_guide_verification,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            step_timeout: self.step_timeout,
            compensation_retries: self.compensation_retries,
            compensation_backoff: self.compensation_backoff,
            ..CoordinatorConfig::default()
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            recent_records: self.recent_records,
            observer_buffer: self.observer_buffer,
            ..HubConfig::default()
        }
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy::with_service_fee(Money::from_cents(self.service_fee_cents))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            step_timeout: Duration::from_millis(5_000),
            compensation_retries: 3,
            compensation_backoff: Duration::from_millis(100),
            recent_records: 20,
            observer_buffer: 256,
            change_poll_interval: Duration::from_millis(500),
            service_fee_cents: domain::pricing::DEFAULT_SERVICE_FEE_CENTS,
            require_guide_verification: false,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
