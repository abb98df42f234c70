//! Runtime configuration

use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::path::Path;

use crate::types::AccountId;

/// Engine configuration; every field has a default
#[derive(Debug, Clone, Deserialize)]
pub struct ErpConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub accounts: ChartConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

fn default_app_name() -> String {
    "property-billing".to_string()
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            audit: AuditConfig::default(),
            accounts: ChartConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Append-only side log file
    #[serde(default = "default_worm_log_path")]
    pub worm_log_path: String,
}

fn default_worm_log_path() -> String {
    "worm_audit.log".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            worm_log_path: default_worm_log_path(),
        }
    }
}

/// Account ids of the standard chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_cash")]
    pub cash: AccountId,
    #[serde(default = "default_fee_income")]
    pub fee_income: AccountId,
    /// Liability backing every room's prepaid balance
    #[serde(default = "default_advance_receipts")]
    pub advance_receipts: AccountId,
    #[serde(default = "default_discounts")]
    pub discounts: AccountId,
    #[serde(default = "default_output_tax")]
    pub output_tax: AccountId,
}

fn default_cash() -> AccountId {
    1
}

fn default_fee_income() -> AccountId {
    2
}

fn default_advance_receipts() -> AccountId {
    3
}

fn default_discounts() -> AccountId {
    4
}

fn default_output_tax() -> AccountId {
    5
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            cash: default_cash(),
            fee_income: default_fee_income(),
            advance_receipts: default_advance_receipts(),
            discounts: default_discounts(),
            output_tax: default_output_tax(),
        }
    }
}

/// Billing and invoicing limits
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Upper bound for invoice tax rates, in percent
    #[serde(default = "default_max_tax_rate_percent")]
    pub max_tax_rate_percent: u32,
    /// Rows per page for paged bill and audit listings
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_max_tax_rate_percent() -> u32 {
    13
}

fn default_page_size() -> usize {
    50
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            max_tax_rate_percent: default_max_tax_rate_percent(),
            page_size: default_page_size(),
        }
    }
}

impl BillingConfig {
    /// Maximum tax rate as a fraction (13 percent is `0.13`)
    pub fn max_tax_rate(&self) -> BigDecimal {
        BigDecimal::new(self.max_tax_rate_percent.into(), 2)
    }
}

impl ErpConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Reads optional `config/default` and `config/{RUN_MODE}` files, then
    /// `ERP__SECTION__FIELD` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source exists but cannot be parsed.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`ErpConfig::load`] with the `config/` directory under `base`
    pub fn load_from(base: &Path) -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        let dir = base.join("config");

        let config = config::Config::builder()
            .add_source(config::File::with_name(&dir.join("default").display().to_string()).required(false))
            .add_source(
                config::File::with_name(&dir.join(&run_mode).display().to_string()).required(false),
            )
            .add_source(config::Environment::with_prefix("ERP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ErpConfig::default();
        assert_eq!(config.accounts.advance_receipts, 3);
        assert_eq!(config.audit.worm_log_path, "worm_audit.log");
        assert_eq!(config.billing.max_tax_rate(), dec("0.13"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ErpConfig::from_toml(
            r#"
            app_name = "estate-a"

            [accounts]
            cash = 1001

            [billing]
            max_tax_rate_percent = 9
            "#,
        )
        .unwrap();

        assert_eq!(config.app_name, "estate-a");
        assert_eq!(config.accounts.cash, 1001);
        assert_eq!(config.accounts.fee_income, 2);
        assert_eq!(config.billing.max_tax_rate(), dec("0.09"));
        assert_eq!(config.billing.page_size, 50);
    }

    #[test]
    fn test_files_then_environment_layering() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("default.toml"),
            "app_name = \"estate-default\"\n[audit]\nworm_log_path = \"from-file.log\"\n[billing]\npage_size = 20\n",
        )
        .unwrap();
        std::fs::write(config_dir.join("staging.toml"), "app_name = \"estate-staging\"\n").unwrap();

        std::env::set_var("RUN_MODE", "staging");
        std::env::set_var("ERP__AUDIT__WORM_LOG_PATH", "/var/log/erp/worm.log");
        let loaded = ErpConfig::load_from(dir.path());
        std::env::remove_var("ERP__AUDIT__WORM_LOG_PATH");
        std::env::remove_var("RUN_MODE");

        let config = loaded.unwrap();
        assert_eq!(config.app_name, "estate-staging");
        assert_eq!(config.audit.worm_log_path, "/var/log/erp/worm.log");
        assert_eq!(config.billing.page_size, 20);
        assert_eq!(config.accounts.output_tax, 5);
    }
}
