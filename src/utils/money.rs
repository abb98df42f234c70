//! Money helpers; amounts are `BigDecimal` throughout

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use std::str::FromStr;

use crate::types::*;

/// Tolerance below which an owed amount counts as settled (0.01)
pub fn settlement_epsilon() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

/// Round to cents, half-up
pub fn to_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

/// True when the amount has nothing below the cent
pub fn is_whole_cents(value: &BigDecimal) -> bool {
    to_money(value) == *value
}

/// An owed amount below one cent is settled
pub fn is_settled(owed: &BigDecimal) -> bool {
    *owed < settlement_epsilon()
}

/// Parse a decimal amount from user input
pub fn parse_money(text: &str) -> LedgerResult<BigDecimal> {
    BigDecimal::from_str(text.trim())
        .map_err(|_| LedgerError::Validation(format!("Invalid amount '{}'", text.trim())))
}

/// Render as `¥1,234.56`
pub fn format_money(value: &BigDecimal) -> String {
    let rounded = to_money(value);
    let negative = rounded < BigDecimal::zero();
    let plain = rounded.abs().to_string();
    let (whole, cents) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}¥{grouped}.{cents}", if negative { "-" } else { "" })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_to_money_rounds_half_up() {
        assert_eq!(to_money(&dec("1.005")), dec("1.01"));
        assert_eq!(to_money(&dec("1.004")), dec("1.00"));
        assert_eq!(to_money(&dec("2.5")).to_string(), "2.50");
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(&dec("1234.5")), "¥1,234.50");
        assert_eq!(format_money(&dec("1234567.891")), "¥1,234,567.89");
        assert_eq!(format_money(&dec("12")), "¥12.00");
        assert_eq!(format_money(&dec("-950")), "-¥950.00");
    }

    #[test]
    fn test_whole_cents() {
        assert!(is_whole_cents(&dec("12.30")));
        assert!(is_whole_cents(&dec("7")));
        assert!(!is_whole_cents(&dec("0.001")));
    }

    #[test]
    fn test_settlement_epsilon() {
        assert!(is_settled(&dec("0.009")));
        assert!(is_settled(&dec("-5")));
        assert!(!is_settled(&dec("0.01")));
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money(" 12.30 ").unwrap(), dec("12.3"));
        assert!(matches!(
            parse_money("twelve"),
            Err(LedgerError::Validation(_))
        ));
    }
}
