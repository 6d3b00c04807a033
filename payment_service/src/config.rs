use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
}

/// Configuración del servicio, leída del entorno al arrancar.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub gateway_url: String,
    pub gateway_timeout: Duration,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub processing_timeout: Duration,
    pub worker_concurrency: usize,
    pub fee_rate: Decimal,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let fee_percent = parse_var("TRANSACTION_FEE_PERCENT", Decimal::from(2))?;

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8000)?,
            gateway_url: require("PAYMENT_GATEWAY_URL")?,
            gateway_timeout: parse_duration("PAYMENT_GATEWAY_TIMEOUT_S", 2.0)?,
            retry: RetryPolicy {
                max_attempts: parse_var("GATEWAY_MAX_ATTEMPTS", 3)?,
                backoff_base: parse_duration("GATEWAY_BACKOFF_BASE_S", 1.0)?,
                backoff_max: parse_duration("GATEWAY_BACKOFF_MAX_S", 30.0)?,
                jitter: parse_duration("GATEWAY_BACKOFF_JITTER_S", 0.5)?,
            },
            poll_interval: parse_duration("WORKER_POLL_INTERVAL_S", 0.5)?,
            processing_timeout: parse_duration("WORKER_PROCESSING_TIMEOUT_S", 30.0)?,
            worker_concurrency: parse_var("WORKER_CONCURRENCY", 2)?,
            fee_rate: fee_percent / Decimal::ONE_HUNDRED,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        Err(_) => Ok(default),
    }
}

fn parse_duration(name: &'static str, default_secs: f64) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_var(name, default_secs)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::InvalidVar {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}
