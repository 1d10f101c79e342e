use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// What to do when FEFO allocation cannot cover a sale line.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShortagePolicy {
    /// Park the event with `INVENTORY_SHORTAGE`.
    Hold,
    /// Post the uncovered quantity as a lot-less backorder at standard cost.
    Backorder,
}

/// Worker, retry and posting settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PostingConfig {
    #[serde(default = "default_worker_count")]
    #[validate(range(min = 1, max = 256))]
    pub worker_count: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Events drained per tenant before yielding to the next tenant.
    #[serde(default = "default_batch_limit")]
    #[validate(range(min = 1))]
    pub batch_limit: u64,

    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: i32,

    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// `processing` claims older than this are returned to `pending`.
    #[serde(default = "default_processing_lease_secs")]
    pub processing_lease_secs: u64,

    #[serde(default = "default_shortage_policy")]
    pub shortage_policy: ShortagePolicy,

    #[serde(default = "default_usd_tolerance")]
    pub usd_tolerance: Decimal,

    #[serde(default = "default_lbp_tolerance")]
    pub lbp_tolerance: Decimal,

    #[serde(default = "default_match_qty_tolerance_pct")]
    pub match_qty_tolerance_pct: Decimal,

    #[serde(default = "default_match_cost_tolerance_pct")]
    pub match_cost_tolerance_pct: Decimal,

    /// Absolute USD tolerance on supplier invoice tax.
    #[serde(default = "default_match_tax_tolerance")]
    pub match_tax_tolerance: Decimal,

    #[serde(default = "default_scheduler_interval_secs")]
    pub scheduler_interval_secs: u64,

    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_rate_type")]
    #[validate(length(min = 1))]
    pub default_rate_type: String,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_limit: default_batch_limit(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            processing_lease_secs: default_processing_lease_secs(),
            shortage_policy: default_shortage_policy(),
            usd_tolerance: default_usd_tolerance(),
            lbp_tolerance: default_lbp_tolerance(),
            match_qty_tolerance_pct: default_match_qty_tolerance_pct(),
            match_cost_tolerance_pct: default_match_cost_tolerance_pct(),
            match_tax_tolerance: default_match_tax_tolerance(),
            scheduler_interval_secs: default_scheduler_interval_secs(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            default_rate_type: default_rate_type(),
        }
    }
}

impl PostingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn processing_lease(&self) -> Duration {
        Duration::from_secs(self.processing_lease_secs)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Run pending migrations at startup.
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub posting: PostingConfig,
}

impl AppConfig {
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            posting: PostingConfig::default(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Cross-field checks `validator` attributes cannot express.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let posting = &self.posting;

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        for (field, value) in [
            ("posting.usd_tolerance", posting.usd_tolerance),
            ("posting.lbp_tolerance", posting.lbp_tolerance),
            ("posting.match_qty_tolerance_pct", posting.match_qty_tolerance_pct),
            ("posting.match_cost_tolerance_pct", posting.match_cost_tolerance_pct),
            ("posting.match_tax_tolerance", posting.match_tax_tolerance),
        ] {
            if value < Decimal::ZERO {
                let mut err = ValidationError::new("negative_tolerance");
                err.message = Some(format!("{field} must not be negative").into());
                errors.add("posting", err);
            }
        }

        if posting.backoff_cap_secs < posting.backoff_base_secs {
            let mut err = ValidationError::new("backoff_cap_secs");
            err.message = Some("backoff_cap_secs must be at least backoff_base_secs".into());
            errors.add("posting", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    300
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_worker_count() -> usize {
    4
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_batch_limit() -> u64 {
    100
}
fn default_max_attempts() -> i32 {
    5
}
fn default_backoff_base_secs() -> u64 {
    2
}
fn default_backoff_cap_secs() -> u64 {
    300
}
fn default_processing_lease_secs() -> u64 {
    300
}
fn default_shortage_policy() -> ShortagePolicy {
    ShortagePolicy::Hold
}
fn default_usd_tolerance() -> Decimal {
    dec!(0.05)
}
fn default_lbp_tolerance() -> Decimal {
    dec!(5000)
}
fn default_match_qty_tolerance_pct() -> Decimal {
    Decimal::ZERO
}
fn default_match_cost_tolerance_pct() -> Decimal {
    dec!(1)
}
fn default_match_tax_tolerance() -> Decimal {
    dec!(0.05)
}
fn default_scheduler_interval_secs() -> u64 {
    60
}
fn default_expiry_sweep_interval_secs() -> u64 {
    3600
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_rate_type() -> String {
    "market".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("posting_engine={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://posting.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new("sqlite::memory:".into(), "test".into())
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.posting.max_attempts, 5);
        assert_eq!(cfg.posting.shortage_policy, ShortagePolicy::Hold);
        assert_eq!(cfg.posting.usd_tolerance, dec!(0.05));
        assert_eq!(cfg.posting.lbp_tolerance, dec!(5000));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = base_config();
        cfg.posting.worker_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut cfg = base_config();
        cfg.posting.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_tolerance_rejected() {
        let mut cfg = base_config();
        cfg.posting.usd_tolerance = dec!(-0.01);
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn unknown_log_level_rejected() {
        let mut cfg = base_config();
        cfg.log_level = "loud".into();
        assert!(cfg.validate().is_err());
    }
}
