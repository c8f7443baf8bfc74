//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LEDGER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `LEDGER_HOST` - Bind address (default: 127.0.0.1)
//! - `LEDGER_PORT` - Listen port (default: 3002)
//! - `COMMISSION_RATE` - Platform commission as a fraction (default: 0.05)
//! - `COMMISSION_CAP` - Commission ceiling per order (default: 50000)
//! - `WITHDRAWAL_STORE_SINGLE_OPEN` - Refuse a second open store withdrawal (default: false)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! ## Optional (scheduler)
//! - `SCHEDULER_ENABLED` - Run job loops inside the server (default: true)
//! - `PICKING_SWEEP_SECS` - Picking sweep interval and age threshold (default: 180)
//! - `DELIVERY_SWEEP_SECS` - Delivery sweep interval and age threshold (default: 300)
//! - `ESTIMATE_BACKFILL_SECS` - Estimate backfill interval (default: 600)
//! - `PAYOUT_RELEASE_SECS` - Payout release interval (default: 3600)
//! - `PAYOUT_HOLD_HOURS` - How long a payout stays pending after delivery (default: 168)
//!
//! ## Optional (collaborators)
//! - `NOTIFY_WEBHOOK_URL` - Deliver notifications as JSON POSTs (default: log only)
//! - `PAYMENT_GATEWAY_URL` / `PAYMENT_GATEWAY_API_KEY` - Refund gateway (both or neither)
//! - `ESTIMATE_SAME_REGION_DAYS` / `ESTIMATE_CROSS_REGION_DAYS` - Estimator (default: 2 / 4)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use parcel_ledger_core::FeePolicy;
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Platform commission policy
    pub fees: FeePolicy,
    /// Scheduled transition driver settings
    pub scheduler: SchedulerConfig,
    /// Refuse a second open withdrawal request for stores as well as buyers
    pub withdrawal_store_single_open: bool,
    /// Notification webhook (optional, logs only when absent)
    pub notify_webhook_url: Option<Url>,
    /// Payment gateway for refunds (optional, wallet credit when absent)
    pub payment_gateway: Option<PaymentGatewayConfig>,
    /// Region estimator settings
    pub estimator: EstimatorConfig,
    /// Emit JSON logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Intervals and thresholds for the scheduled jobs.
///
/// The picking and delivery sweeps use the same duration both as their tick
/// interval and as the age a shipment must reach before it is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub picking_after: Duration,
    pub delivery_after: Duration,
    pub backfill_every: Duration,
    pub payout_release_every: Duration,
    pub payout_hold: Duration,
    /// Maximum candidates one sweep selects.
    pub batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            picking_after: Duration::from_secs(180),
            delivery_after: Duration::from_secs(300),
            backfill_every: Duration::from_secs(600),
            payout_release_every: Duration::from_secs(3600),
            payout_hold: Duration::from_secs(168 * 3600),
            batch_size: 200,
        }
    }
}

/// Payment gateway configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PaymentGatewayConfig {
    /// Base URL of the gateway's refund API
    pub base_url: Url,
    /// Bearer key
    pub api_key: SecretString,
}

impl std::fmt::Debug for PaymentGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGatewayConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl PaymentGatewayConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let base_url = get_optional_env("PAYMENT_GATEWAY_URL");
        let api_key = get_optional_env("PAYMENT_GATEWAY_API_KEY");

        match (base_url, api_key) {
            (Some(url), Some(key)) => {
                validate_secret_strength(&key, "PAYMENT_GATEWAY_API_KEY")?;
                Ok(Some(Self {
                    base_url: parse_url("PAYMENT_GATEWAY_URL", &url)?,
                    api_key: SecretString::from(key),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "PAYMENT_GATEWAY_*".to_string(),
                "Both PAYMENT_GATEWAY_URL and PAYMENT_GATEWAY_API_KEY must be set together"
                    .to_string(),
            )),
        }
    }
}

/// Delivery estimate in days, by whether both ends share a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorConfig {
    pub same_region_days: u32,
    pub cross_region_days: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            same_region_days: 2,
            cross_region_days: 4,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("LEDGER_DATABASE_URL")?;
        let host = parse_env("LEDGER_HOST", "127.0.0.1")?;
        let port = parse_env("LEDGER_PORT", "3002")?;

        let rate: Decimal = parse_env("COMMISSION_RATE", "0.05")?;
        let cap: Decimal = parse_env("COMMISSION_CAP", "50000")?;
        let fees = FeePolicy::new(rate, cap)
            .map_err(|e| ConfigError::InvalidEnvVar("COMMISSION_*".to_string(), e.to_string()))?;

        let scheduler = SchedulerConfig {
            enabled: parse_bool("SCHEDULER_ENABLED", true)?,
            picking_after: parse_secs("PICKING_SWEEP_SECS", 180)?,
            delivery_after: parse_secs("DELIVERY_SWEEP_SECS", 300)?,
            backfill_every: parse_secs("ESTIMATE_BACKFILL_SECS", 600)?,
            payout_release_every: parse_secs("PAYOUT_RELEASE_SECS", 3600)?,
            payout_hold: Duration::from_secs(parse_env::<u64>("PAYOUT_HOLD_HOURS", "168")? * 3600),
            ..SchedulerConfig::default()
        };

        let notify_webhook_url = get_optional_env("NOTIFY_WEBHOOK_URL")
            .map(|url| parse_url("NOTIFY_WEBHOOK_URL", &url))
            .transpose()?;

        let estimator = EstimatorConfig {
            same_region_days: parse_env("ESTIMATE_SAME_REGION_DAYS", "2")?,
            cross_region_days: parse_env("ESTIMATE_CROSS_REGION_DAYS", "4")?,
        };

        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            fees,
            scheduler,
            withdrawal_store_single_open: parse_bool("WITHDRAWAL_STORE_SINGLE_OPEN", false)?,
            notify_webhook_url,
            payment_gateway: PaymentGatewayConfig::from_env()?,
            estimator,
            log_json: get_env_or_default("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a positive number of seconds.
fn parse_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_env(key, &default.to_string())?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| parse_flag(key, &raw))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated key."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_gateway_key_placeholder_rejected() {
        let err = validate_secret_strength("your-gateway-key", "PAYMENT_GATEWAY_API_KEY")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_gateway_key_low_entropy_rejected() {
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "KEY").is_err());
    }

    #[test]
    fn test_gateway_key_random_accepted() {
        assert!(validate_secret_strength("gk_9fQ2xLr7TzVb4NmW8cYhJ3", "KEY").is_ok());
    }

    #[test]
    fn test_parse_flag_variants() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(parse_flag("X", " on ").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(matches!(
            parse_flag("X", "maybe"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<u16>("LEDGER_PORT", "99999").unwrap_err();
        assert!(err.to_string().contains("LEDGER_PORT"));
        assert_eq!(parse_value::<Decimal>("COMMISSION_RATE", "0.05").unwrap(), Decimal::new(5, 2));
    }

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.picking_after, Duration::from_secs(180));
        assert_eq!(config.delivery_after, Duration::from_secs(300));
        assert_eq!(config.payout_hold, Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn test_payment_gateway_debug_redacts_key() {
        let config = PaymentGatewayConfig {
            base_url: Url::parse("https://pay.test/").unwrap(),
            api_key: SecretString::from("gk_live_super_private"),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("pay.test"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("gk_live_super_private"));
    }
}
