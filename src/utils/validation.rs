//! Validation utilities

use bigdecimal::BigDecimal;
use std::collections::HashSet;

use crate::property::types::{FeeItem, MAX_FEE_ITEMS};
use crate::traits::*;
use crate::utils::money::is_whole_cents;
use crate::types::*;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Positive and in whole cents; used for money that moves
pub fn validate_money_amount(amount: &BigDecimal) -> LedgerResult<()> {
    validate_positive_amount(amount)?;
    if !is_whole_cents(amount) {
        return Err(LedgerError::Validation(format!(
            "Amount {amount} has more than two decimal places"
        )));
    }
    Ok(())
}

/// Validate that an amount is zero or more
pub fn validate_non_negative(amount: &BigDecimal, field: &str) -> LedgerResult<()> {
    if *amount < BigDecimal::from(0) {
        return Err(LedgerError::Validation(format!(
            "{field} cannot be negative"
        )));
    }
    Ok(())
}

/// Operators must be named on every audited operation
pub fn validate_actor(actor: &str) -> LedgerResult<()> {
    if actor.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Operator cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validate a display name or code
pub fn validate_name(value: &str, field: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::Validation(format!("{field} cannot be empty")));
    }

    if value.len() > 100 {
        return Err(LedgerError::Validation(format!(
            "{field} cannot exceed 100 characters"
        )));
    }

    Ok(())
}

/// At most three items, unique trimmed names, non-negative standards
pub fn validate_fee_items(items: &[FeeItem]) -> LedgerResult<()> {
    if items.len() > MAX_FEE_ITEMS {
        return Err(LedgerError::Validation(format!(
            "A room can carry at most {MAX_FEE_ITEMS} fee items"
        )));
    }

    let mut names = HashSet::new();
    for item in items {
        validate_name(&item.name, "Fee item name")?;
        validate_non_negative(&item.standard, "Fee standard")?;
        if !names.insert(item.name.trim()) {
            return Err(LedgerError::Validation(format!(
                "Fee item '{}' appears more than once",
                item.name.trim()
            )));
        }
    }

    Ok(())
}

/// Enhanced account validator with detailed checks
pub struct EnhancedAccountValidator;

impl AccountValidator for EnhancedAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        DefaultAccountValidator.validate_account(account)?;
        validate_name(&account.name, "Account name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, standard: i32) -> FeeItem {
        FeeItem::new(name, BigDecimal::from(standard))
    }

    #[test]
    fn test_fee_items_limits() {
        assert!(validate_fee_items(&[item("Property", 120), item("Water", 0)]).is_ok());

        let four = [item("A", 1), item("B", 1), item("C", 1), item("D", 1)];
        assert!(validate_fee_items(&four).is_err());

        let duplicate = [item("Property", 1), item(" Property ", 2)];
        assert!(validate_fee_items(&duplicate).is_err());

        assert!(validate_fee_items(&[item("Property", -1)]).is_err());
    }

    #[test]
    fn test_money_amount_precision() {
        assert!(validate_money_amount(&"10.25".parse().unwrap()).is_ok());
        assert!(validate_money_amount(&"0.001".parse().unwrap()).is_err());
        assert!(validate_money_amount(&BigDecimal::from(0)).is_err());
    }

    #[test]
    fn test_enhanced_account_validator() {
        let long = Account::new(9, "x".repeat(101), AccountNature::Asset);
        assert!(EnhancedAccountValidator.validate_account(&long).is_err());
        let ok = Account::new(9, "Petty cash".to_string(), AccountNature::Asset);
        assert!(EnhancedAccountValidator.validate_account(&ok).is_ok());
    }
}
