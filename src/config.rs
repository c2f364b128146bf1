use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_DELAY_MS: u64 = 20_000;
const DEFAULT_GATEWAY_SUCCESS_RATE: f64 = 0.9;
const DEV_DEFAULT_CALLBACK_SECRET: &str =
    "this_is_a_development_callback_secret_do_not_use_in_production";

/// Simulated payment gateway configuration.
///
/// The delay and success rate exist so tests can make settlement
/// deterministic (zero delay, forced outcome) while production-like
/// environments keep the 20s round-trip the gateways simulate.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Simulated gateway round-trip duration in milliseconds
    #[serde(default = "default_gateway_delay_ms")]
    pub gateway_delay_ms: u64,

    /// Probability in [0, 1] that a simulated settlement succeeds
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_gateway_success_rate")]
    pub gateway_success_rate: f64,

    /// Shared secret for HMAC verification of gateway callbacks
    #[validate(length(min = 32))]
    #[serde(default = "default_callback_secret")]
    pub callback_secret: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            gateway_delay_ms: default_gateway_delay_ms(),
            gateway_success_rate: default_gateway_success_rate(),
            callback_secret: default_callback_secret(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Application environment (development, test, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Payment gateway knobs
    #[serde(default)]
    #[validate]
    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Loads configuration from layered sources: `config/default.toml`,
    /// `config/{environment}.toml`, then `APP_`-prefixed environment
    /// variables (e.g. `APP_DATABASE_URL`, `APP_PAYMENT__CALLBACK_SECRET`).
    pub fn load() -> Result<Self, ConfigError> {
        let run_env =
            std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("environment", run_env.clone())?
            .add_source(
                File::with_name(&format!("{}/default", CONFIG_DIR)).required(false),
            );

        let env_file = format!("{}/{}", CONFIG_DIR, run_env);
        if Path::new(&format!("{}.toml", env_file)).exists() {
            builder = builder.add_source(File::with_name(&env_file));
        }

        let cfg: AppConfig = builder
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

        info!(environment = %cfg.environment, "configuration loaded");
        Ok(cfg)
    }

    /// Constructs a configuration programmatically. Used by tests and
    /// embedded hosts that do not read config files.
    pub fn new(database_url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: environment.into(),
            log_level: default_log_level(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            payment: PaymentConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_gateway_delay_ms() -> u64 {
    DEFAULT_GATEWAY_DELAY_MS
}

fn default_gateway_success_rate() -> f64 {
    DEFAULT_GATEWAY_SUCCESS_RATE
}

fn default_callback_secret() -> String {
    DEV_DEFAULT_CALLBACK_SECRET.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmatic_config_has_sane_defaults() {
        let cfg = AppConfig::new("sqlite::memory:", "test");
        assert_eq!(cfg.environment, "test");
        assert!(!cfg.auto_migrate);
        assert_eq!(cfg.payment.gateway_delay_ms, DEFAULT_GATEWAY_DELAY_MS);
        assert!(cfg.payment.gateway_success_rate > 0.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn success_rate_out_of_range_is_rejected() {
        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        cfg.payment.gateway_success_rate = 1.5;
        assert!(cfg.validate().is_err());
    }
}
