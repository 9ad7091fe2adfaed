//! Configuration.
//!
//! Settings come from an optional TOML file and can be overridden through
//! environment variables (a `.env` file is read first when present):
//!
//! | Variable | Default |
//! |----------|---------|
//! | CLINIC_DATABASE_PATH | clinic.db |
//! | CLINIC_STORAGE_DIR | documents |
//! | CLINIC_LOG_LEVEL | info |
//! | CLINIC_LOG_JSON | false |
//! | CLINIC_LOG_DIR | (none) |

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inventory::ExpiryThresholds;
use crate::procurement::ProcurementOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    /// Root directory for logos and attached documents
    pub storage_dir: String,
    pub log_level: String,
    pub log_json: bool,
    /// Daily rolling log files are written here when set and present
    pub log_dir: Option<String>,
    pub expiry: ExpiryThresholds,
    /// Receipt cost variance (percent) that raises a warning
    pub cost_variance_alert_percent: f64,
    pub po_number_prefix: String,
    pub rfq_number_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "clinic.db".into(),
            storage_dir: "documents".into(),
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            expiry: ExpiryThresholds::default(),
            cost_variance_alert_percent: 10.0,
            po_number_prefix: "PO".into(),
            rfq_number_prefix: "RFQ".into(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        dotenv::dotenv().ok();
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLINIC_DATABASE_PATH") {
            self.database_path = v;
        }
        if let Some(v) = lookup("CLINIC_STORAGE_DIR") {
            self.storage_dir = v;
        }
        if let Some(v) = lookup("CLINIC_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("CLINIC_LOG_JSON") {
            self.log_json = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("CLINIC_LOG_DIR") {
            self.log_dir = if v.trim().is_empty() { None } else { Some(v) };
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".into()));
        }
        if self.storage_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_dir is empty".into()));
        }
        if self.expiry.critical_days < 0 || self.expiry.warning_days < 0 {
            return Err(ConfigError::Invalid("expiry thresholds must not be negative".into()));
        }
        if self.expiry.critical_days > self.expiry.warning_days {
            return Err(ConfigError::Invalid(format!(
                "critical_days ({}) exceeds warning_days ({})",
                self.expiry.critical_days, self.expiry.warning_days
            )));
        }
        if !(self.cost_variance_alert_percent >= 0.0) {
            return Err(ConfigError::Invalid(
                "cost_variance_alert_percent must be a non-negative number".into(),
            ));
        }
        if self.po_number_prefix.trim().is_empty() || self.rfq_number_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("document number prefixes must not be empty".into()));
        }
        Ok(())
    }

    pub fn procurement_options(&self) -> ProcurementOptions {
        ProcurementOptions {
            po_number_prefix: self.po_number_prefix.clone(),
            rfq_number_prefix: self.rfq_number_prefix.clone(),
            cost_variance_alert_percent: self.cost_variance_alert_percent,
        }
    }
}
