//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{LedgerError, LedgerResult};

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Decimal places a transaction's sum is rounded to before it must equal zero
    pub balance_scale: i64,

    /// Same-day cascade length above which an insert is logged as a warning
    pub cascade_warn_threshold: usize,

    /// Maximum transaction description length
    pub max_description_len: usize,

    /// Minor-unit exponents added to (or overriding) the built-in currency table
    pub currency_exponents: HashMap<String, u32>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            balance_scale: 2,
            cascade_warn_threshold: 32,
            max_description_len: 500,
            currency_exponents: HashMap::new(),
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> LedgerResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if !(0..=18).contains(&self.balance_scale) {
            return Err(LedgerError::Config(format!(
                "balance_scale must be between 0 and 18, got {}",
                self.balance_scale
            )));
        }

        if self.max_description_len == 0 {
            return Err(LedgerError::Config(
                "max_description_len must be greater than 0".to_string(),
            ));
        }

        for (code, exponent) in &self.currency_exponents {
            if code.trim().len() != 3 || *exponent > 18 {
                return Err(LedgerError::Config(format!(
                    "invalid currency exponent {} = {}",
                    code, exponent
                )));
            }
        }

        Ok(())
    }
}
