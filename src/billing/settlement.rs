//! Bill settlement arithmetic
//!
//! owed = due - paid - discount. A bill is paid once the owed amount drops
//! below one cent. Status only moves forward: unpaid, partially paid, paid.

use bigdecimal::{BigDecimal, Zero};

use super::types::{Bill, BillStatus};
use crate::types::*;
use crate::utils::money::is_settled;

pub fn owed(bill: &Bill) -> BigDecimal {
    &bill.amount_due - &bill.amount_paid - &bill.discount
}

/// Status implied by the amounts alone
pub fn settlement_status(
    amount_due: &BigDecimal,
    amount_paid: &BigDecimal,
    discount: &BigDecimal,
) -> BillStatus {
    let owed = amount_due - amount_paid - discount;
    if is_settled(&owed) {
        BillStatus::Paid
    } else if *amount_paid > BigDecimal::zero() {
        BillStatus::PartiallyPaid
    } else {
        BillStatus::Unpaid
    }
}

fn rank(status: BillStatus) -> u8 {
    match status {
        BillStatus::Unpaid => 0,
        BillStatus::PartiallyPaid => 1,
        BillStatus::Paid => 2,
        BillStatus::Void => 3,
    }
}

fn ensure_open(bill: &Bill) -> LedgerResult<()> {
    if !bill.status.is_open() {
        return Err(LedgerError::InvalidState(format!(
            "Bill {} is {:?}",
            bill.id, bill.status
        )));
    }
    Ok(())
}

fn recompute(bill: &mut Bill) {
    let next = settlement_status(&bill.amount_due, &bill.amount_paid, &bill.discount);
    if rank(next) > rank(bill.status) {
        bill.status = next;
    }
}

/// Add a payment to an open bill
pub fn apply_payment(bill: &mut Bill, amount: &BigDecimal) -> LedgerResult<()> {
    ensure_open(bill)?;
    if *amount <= BigDecimal::zero() {
        return Err(LedgerError::Validation(format!(
            "Payment for bill {} must be positive",
            bill.id
        )));
    }
    let owed = owed(bill);
    if *amount > owed {
        return Err(LedgerError::Validation(format!(
            "Payment {amount} exceeds the {owed} owed on bill {}",
            bill.id
        )));
    }

    bill.amount_paid += amount;
    recompute(bill);
    Ok(())
}

/// Add an approved discount to an open bill
pub fn apply_discount(bill: &mut Bill, amount: &BigDecimal) -> LedgerResult<()> {
    ensure_open(bill)?;
    if *amount <= BigDecimal::zero() {
        return Err(LedgerError::Validation(
            "Discount must be positive".to_string(),
        ));
    }
    let owed = owed(bill);
    if *amount > owed {
        return Err(LedgerError::Validation(format!(
            "Discount {amount} exceeds the {owed} owed on bill {}",
            bill.id
        )));
    }

    bill.discount += amount;
    recompute(bill);
    Ok(())
}

/// Void an unpaid bill that has no payment or discount on it
pub fn void(bill: &mut Bill) -> LedgerResult<()> {
    if bill.status != BillStatus::Unpaid
        || !bill.amount_paid.is_zero()
        || !bill.discount.is_zero()
    {
        return Err(LedgerError::InvalidState(format!(
            "Only untouched unpaid bills can be voided; bill {} is {:?}",
            bill.id, bill.status
        )));
    }
    bill.status = BillStatus::Void;
    Ok(())
}
