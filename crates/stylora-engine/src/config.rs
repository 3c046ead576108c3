//! # Engine Configuration
//!
//! Settings for the database, commission evaluation and usage billing.
//!
//! ## Configuration Sources (later overrides earlier)
//! 1. Defaults (this file)
//! 2. Config file (`stylora.toml`, explicit path or platform config dir)
//! 3. Environment variables (`STYLORA_*`)
//!
//! ## Example
//! ```toml
//! [database]
//! path = "/var/lib/stylora/stylora.db"
//! max_connections = 8
//! busy_timeout_secs = 5
//!
//! [commission]
//! default_rate_fallback = false
//!
//! [billing]
//! vat_rate = "25.00"
//! currency = "NOK"
//! invoice_due_day = 15
//! default_sms_overage_rate = "1.00"
//! default_email_overage_rate = "0.10"
//! ```
//!
//! Read-only after loading; services receive a clone.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stylora_core::calculator::CalculatorOptions;
use stylora_core::usage::InvoiceTerms;
use stylora_core::{
    Money, Rate, DEFAULT_CURRENCY, DEFAULT_EMAIL_OVERAGE_RATE, DEFAULT_INVOICE_DUE_DAY,
    DEFAULT_SMS_OVERAGE_RATE, DEFAULT_VAT_RATE,
};
use stylora_db::DbConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for [`EngineConfig`].
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment variable could not be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// A loaded value is outside its allowed range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first start.
    pub path: PathBuf,

    /// Pool size. SQLite serializes writers, so a handful is plenty.
    pub max_connections: u32,

    /// How long a writer waits on the SQLite lock before the operation
    /// fails with `CONFLICT`.
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: PathBuf::from("./stylora.db"),
            max_connections: 5,
            busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionSettings {
    /// Pay the employee's default rate when no rule matches a sale.
    /// Default: false (no rule, no commission)
    pub default_rate_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    /// VAT on usage invoices, in percent.
    pub vat_rate: Rate,

    /// ISO 4217 code stamped on invoices.
    pub currency: String,

    /// Day of the following month an invoice falls due.
    pub invoice_due_day: u32,

    /// Overage rate for newly registered tenants.
    pub default_sms_overage_rate: Money,

    pub default_email_overage_rate: Money,
}

impl Default for BillingSettings {
    fn default() -> Self {
        BillingSettings {
            vat_rate: DEFAULT_VAT_RATE,
            currency: DEFAULT_CURRENCY.to_string(),
            invoice_due_day: DEFAULT_INVOICE_DUE_DAY,
            default_sms_overage_rate: DEFAULT_SMS_OVERAGE_RATE,
            default_email_overage_rate: DEFAULT_EMAIL_OVERAGE_RATE,
        }
    }
}

impl BillingSettings {
    pub fn invoice_terms(&self) -> InvoiceTerms {
        InvoiceTerms {
            vat_rate: self.vat_rate,
            due_day: self.invoice_due_day,
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub commission: CommissionSettings,

    #[serde(default)]
    pub billing: BillingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections and keys take defaults.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Checks ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.billing.vat_rate > Rate::hundred_percent() {
            return Err(ConfigError::Invalid(format!(
                "billing.vat_rate must be at most 100, got {}",
                self.billing.vat_rate
            )));
        }

        if !(1..=31).contains(&self.billing.invoice_due_day) {
            return Err(ConfigError::Invalid(format!(
                "billing.invoice_due_day must be between 1 and 31, got {}",
                self.billing.invoice_due_day
            )));
        }

        let currency = &self.billing.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid(format!(
                "billing.currency must be a three-letter ISO code, got '{}'",
                currency
            )));
        }

        for (key, rate) in [
            ("billing.default_sms_overage_rate", self.billing.default_sms_overage_rate),
            ("billing.default_email_overage_rate", self.billing.default_email_overage_rate),
        ] {
            if rate.is_negative() {
                return Err(ConfigError::Invalid(format!("{} must not be negative", key)));
            }
        }

        Ok(())
    }

    /// Applies `STYLORA_*` overrides read through `var`.
    ///
    /// ## Environment Variables
    /// - `STYLORA_DATABASE_PATH`, `STYLORA_MAX_CONNECTIONS`
    /// - `STYLORA_DEFAULT_RATE_FALLBACK` (`true`/`false`)
    /// - `STYLORA_VAT_RATE` (e.g. `"25"`), `STYLORA_CURRENCY`,
    ///   `STYLORA_INVOICE_DUE_DAY`
    /// - `STYLORA_SMS_OVERAGE_RATE`, `STYLORA_EMAIL_OVERAGE_RATE` (e.g. `"0.10"`)
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var("STYLORA_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(v) = var("STYLORA_MAX_CONNECTIONS") {
            self.database.max_connections = parse_var("STYLORA_MAX_CONNECTIONS", &v)?;
        }

        if let Some(v) = var("STYLORA_DEFAULT_RATE_FALLBACK") {
            self.commission.default_rate_fallback = parse_var("STYLORA_DEFAULT_RATE_FALLBACK", &v)?;
        }

        if let Some(v) = var("STYLORA_VAT_RATE") {
            self.billing.vat_rate = parse_var("STYLORA_VAT_RATE", &v)?;
        }

        if let Some(v) = var("STYLORA_CURRENCY") {
            self.billing.currency = v.trim().to_uppercase();
        }

        if let Some(v) = var("STYLORA_INVOICE_DUE_DAY") {
            self.billing.invoice_due_day = parse_var("STYLORA_INVOICE_DUE_DAY", &v)?;
        }

        if let Some(v) = var("STYLORA_SMS_OVERAGE_RATE") {
            self.billing.default_sms_overage_rate = parse_var("STYLORA_SMS_OVERAGE_RATE", &v)?;
        }

        if let Some(v) = var("STYLORA_EMAIL_OVERAGE_RATE") {
            self.billing.default_email_overage_rate = parse_var("STYLORA_EMAIL_OVERAGE_RATE", &v)?;
        }

        Ok(())
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("no", "stylora", "stylora")
            .map(|dirs| dirs.config_dir().join("stylora.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool settings for [`stylora_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    pub fn calculator_options(&self) -> CalculatorOptions {
        CalculatorOptions {
            default_rate_fallback: self.commission.default_rate_fallback,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.commission.default_rate_fallback);
        assert_eq!(config.billing.vat_rate, Rate::from_percent(25));
        assert_eq!(config.billing.currency, "NOK");
        assert_eq!(config.billing.invoice_due_day, 15);
        assert_eq!(config.billing.default_sms_overage_rate, Money::from_cents(100));
        assert_eq!(config.billing.default_email_overage_rate, Money::from_cents(10));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [commission]
            default_rate_fallback = true

            [billing]
            vat_rate = "12.5"
            "#,
        )
        .unwrap();

        assert!(config.commission.default_rate_fallback);
        assert_eq!(config.billing.vat_rate, Rate::from_bps(1250));
        assert_eq!(config.billing.currency, "NOK");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STYLORA_VAT_RATE", "15"),
            ("STYLORA_CURRENCY", "sek"),
            ("STYLORA_SMS_OVERAGE_RATE", "0.85"),
            ("STYLORA_DEFAULT_RATE_FALLBACK", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.billing.vat_rate, Rate::from_percent(15));
        assert_eq!(config.billing.currency, "SEK");
        assert_eq!(config.billing.default_sms_overage_rate, Money::from_cents(85));
        assert!(config.commission.default_rate_fallback);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|k| (k == "STYLORA_INVOICE_DUE_DAY").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "STYLORA_INVOICE_DUE_DAY"));
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.billing.invoice_due_day = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.billing.currency = "kr".to_string();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_from_database_section() {
        let config = EngineConfig::from_toml(
            r#"
            [database]
            path = "/var/lib/stylora/stylora.db"
            busy_timeout_secs = 2
            "#,
        )
        .unwrap();

        let db = config.db_config();
        assert_eq!(db.database_path, PathBuf::from("/var/lib/stylora/stylora.db"));
        assert_eq!(db.max_connections, 5);
        assert_eq!(db.busy_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[billing]"));
        assert!(toml_str.contains("vat_rate = \"25.00\""));
    }
}
