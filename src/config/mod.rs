//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in `secrecy::SecretString` so it
//! never lands in logs.

pub mod secrets;

use std::path::PathBuf;

use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// TOML authorization policy. Without one, the CLI allows everything.
    pub policy_path: Option<PathBuf>,
    pub service: ServiceConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ServiceConfig::default();

        let max_date_range_days = parse_var(
            &lookup,
            "CAPITAL_CALL_MAX_RANGE_DAYS",
            defaults.limits.max_date_range_days,
        )?;
        let count_concurrency = parse_var(
            &lookup,
            "CAPITAL_CALL_COUNT_CONCURRENCY",
            defaults.count_concurrency,
        )?;
        if count_concurrency == 0 {
            return Err(Error::Config(
                "CAPITAL_CALL_COUNT_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: SecretString::from(
                lookup("DATABASE_URL").ok_or_else(|| missing("DATABASE_URL"))?,
            ),
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            policy_path: lookup("CAPITAL_CALL_POLICY").map(PathBuf::from),
            service: ServiceConfig {
                limits: ValidationLimits {
                    max_date_range_days,
                    ..defaults.limits
                },
                count_concurrency,
            },
        })
    }
}

/// Input-rule limits handed to the validator at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Longest allowed `to_date - from_date`, in days.
    pub max_date_range_days: i64,
    /// Fractional digits kept on calculated amounts.
    pub amount_precision: u32,
    /// Ceiling on the sum of breakdown percentages.
    pub max_percentage_total: Decimal,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_date_range_days: 365,
            amount_precision: 2,
            max_percentage_total: Decimal::ONE_HUNDRED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub limits: ValidationLimits,
    /// How many queue counts run at once.
    pub count_concurrency: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: ValidationLimits::default(),
            count_concurrency: 5,
        }
    }
}

fn missing(name: &str) -> Error {
    Error::Config(format!("required environment variable {name} is not set"))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}
