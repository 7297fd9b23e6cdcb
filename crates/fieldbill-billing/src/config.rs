use crate::domain::line_items::BuildOptions;
use crate::domain::rates::{RateCatalog, RateTable};
use crate::domain::types::DocumentKind;
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "fieldbill.toml";
pub const ENV_PREFIX: &str = "FIELDBILL_";

/// Billing engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub pricing: PricingConfig,
    pub invoicing: InvoicingConfig,
    pub numbering: NumberingConfig,
    pub database: DatabaseConfig,
    pub rate_tables: RateCatalog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub enforce_min_rental_days: bool,
    pub include_cleaning_fee: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let options = BuildOptions::default();
        Self {
            enforce_min_rental_days: options.enforce_min_rental_days,
            include_cleaning_fee: options.include_cleaning_fee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoicingConfig {
    /// Percent value; `8` means 8%.
    pub default_tax_rate_pct: Decimal,
    pub payment_terms_days: u32,
    /// Attempts per payment before a stale-state conflict is surfaced.
    pub max_payment_retries: u32,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            default_tax_rate_pct: Decimal::ZERO,
            payment_terms_days: 30,
            max_payment_retries: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    pub invoice_prefix: String,
    pub quote_prefix: String,
    pub order_prefix: String,
    /// Minimum digits in the rendered sequence.
    pub sequence_width: usize,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV".to_string(),
            quote_prefix: "QT".to_string(),
            order_prefix: "ORD".to_string(),
            sequence_width: 4,
        }
    }
}

impl NumberingConfig {
    pub fn prefix_for(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Invoice => &self.invoice_prefix,
            DocumentKind::Quote => &self.quote_prefix,
            DocumentKind::Order => &self.order_prefix,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.sequence_width == 0 {
            return Err(BillingError::ConfigError {
                message: "numbering.sequence_width must be at least 1".to_string(),
            });
        }

        for (field, prefix) in [
            ("invoice_prefix", &self.invoice_prefix),
            ("quote_prefix", &self.quote_prefix),
            ("order_prefix", &self.order_prefix),
        ] {
            if prefix.is_empty() {
                return Err(BillingError::ConfigError {
                    message: format!("numbering.{} must not be empty", field),
                });
            }
            // Rendered numbers are split at the first digit.
            if prefix.chars().any(|c| c.is_ascii_digit() || c == '/') {
                return Err(BillingError::ConfigError {
                    message: format!(
                        "numbering.{} must not contain digits or '/': {}",
                        field, prefix
                    ),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://fieldbill@localhost:5432/fieldbill".to_string(),
            max_connections: 5,
        }
    }
}

impl BillingConfig {
    /// Load defaults, then `path` (or `fieldbill.toml` if present), then
    /// `FIELDBILL_*` environment variables, e.g.
    /// `FIELDBILL_INVOICING__PAYMENT_TERMS_DAYS=14`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(BillingConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(BillingError::ConfigError {
                        message: format!("config file not found: {}", path.display()),
                    });
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: BillingConfig = figment.extract().map_err(|e| BillingError::ConfigError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.invoicing.default_tax_rate_pct.is_sign_negative()
            && !self.invoicing.default_tax_rate_pct.is_zero()
        {
            return Err(BillingError::ConfigError {
                message: "invoicing.default_tax_rate_pct must not be negative".to_string(),
            });
        }
        if self.invoicing.max_payment_retries == 0 {
            return Err(BillingError::ConfigError {
                message: "invoicing.max_payment_retries must be at least 1".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(BillingError::ConfigError {
                message: "database.max_connections must be at least 1".to_string(),
            });
        }
        self.numbering.validate()?;
        self.rate_tables
            .validate()
            .map_err(|e| BillingError::ConfigError {
                message: format!("rate_tables: {}", e),
            })
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            enforce_min_rental_days: self.pricing.enforce_min_rental_days,
            include_cleaning_fee: self.pricing.include_cleaning_fee,
        }
    }

    /// Default configuration with one sample rate table, rendered as TOML.
    pub fn generate_example() -> Result<String> {
        let mut config = Self::default();
        let sample = RateTable::daily(
            dec!(150),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        )
        .with_weekly_rate(dec!(900))
        .with_monthly_rate(dec!(3000))
        .with_fees(dec!(75), dec!(75));
        config.rate_tables.insert("excavator", sample)?;

        toml::to_string_pretty(&config).map_err(|e| BillingError::ConfigError {
            message: format!("failed to render example config: {}", e),
        })
    }
}
