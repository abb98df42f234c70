//! Price-inclusive tax split for invoices

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::types::LedgerError;
use crate::utils::money::to_money;

/// Tax rate as a fraction (`0.06` is six percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRate(BigDecimal);

impl TaxRate {
    /// Accept rates from zero up to and including `max_rate`
    pub fn new(rate: BigDecimal, max_rate: &BigDecimal) -> Result<Self, TaxError> {
        if rate < BigDecimal::zero() {
            return Err(TaxError::InvalidRate(format!("{rate} is negative")));
        }
        if rate > *max_rate {
            return Err(TaxError::InvalidRate(format!(
                "{rate} exceeds the maximum of {max_rate}"
            )));
        }
        Ok(Self(rate))
    }

    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    pub fn value(&self) -> &BigDecimal {
        &self.0
    }
}

/// An amount including tax broken into its net and tax parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSplit {
    pub rate: BigDecimal,
    pub amount_incl_tax: BigDecimal,
    pub amount_excl_tax: BigDecimal,
    pub tax_amount: BigDecimal,
}

impl TaxSplit {
    /// Work back from a tax-inclusive amount
    ///
    /// The net part is rounded to cents and the tax is the remainder, so the
    /// parts always add up to the inclusive amount.
    pub fn from_inclusive(amount_incl_tax: BigDecimal, rate: &TaxRate) -> Result<Self, TaxError> {
        if amount_incl_tax < BigDecimal::zero() {
            return Err(TaxError::Calculation(format!(
                "Inclusive amount {amount_incl_tax} is negative"
            )));
        }

        let amount_incl_tax = to_money(&amount_incl_tax);
        let divisor = BigDecimal::from(1) + rate.value();
        let amount_excl_tax = to_money(&(&amount_incl_tax / divisor));
        let tax_amount = &amount_incl_tax - &amount_excl_tax;

        Ok(Self {
            rate: rate.value().clone(),
            amount_incl_tax,
            amount_excl_tax,
            tax_amount,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaxError {
    #[error("Invalid tax rate: {0}")]
    InvalidRate(String),
    #[error("Calculation error: {0}")]
    Calculation(String),
}

impl From<TaxError> for LedgerError {
    fn from(err: TaxError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}
