//! Double-entry posting

use bigdecimal::{BigDecimal, Zero};
use serde_json::Value;

use super::account::require_active_account;
use super::period::ensure_period_open;
use crate::traits::*;
use crate::types::*;

/// A debit/credit pair to be written for one period
#[derive(Debug, Clone)]
pub struct PostingRequest {
    pub period: Period,
    pub debit_account: AccountId,
    pub credit_account: AccountId,
    pub amount: BigDecimal,
    pub room_id: Option<RoomId>,
    pub bill_id: Option<BillId>,
    pub payment_id: Option<PaymentId>,
    pub details: Value,
}

impl PostingRequest {
    pub fn new(
        period: Period,
        debit_account: AccountId,
        credit_account: AccountId,
        amount: BigDecimal,
    ) -> Self {
        Self {
            period,
            debit_account,
            credit_account,
            amount,
            room_id: None,
            bill_id: None,
            payment_id: None,
            details: Value::Null,
        }
    }

    pub fn room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn bill(mut self, bill_id: BillId) -> Self {
        self.bill_id = Some(bill_id);
        self
    }

    pub fn payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    fn entry(&self, account_id: AccountId, side: EntryType) -> LedgerEntry {
        LedgerEntry {
            id: 0,
            room_id: self.room_id,
            account_id,
            amount: self.amount.clone(),
            period: self.period,
            side,
            ref_bill_id: self.bill_id,
            ref_payment_id: self.payment_id,
            details: self.details.clone(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// The two rows written by one posting
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

/// Write a balanced debit/credit pair
///
/// The period lock is checked first, then the amount (must be positive),
/// then the accounts (distinct, existing, active). Both rows share the
/// request's room, bill, payment and details.
pub async fn post_double_entry<T: ErpStorage + ?Sized>(
    store: &mut T,
    request: &PostingRequest,
) -> LedgerResult<Posting> {
    ensure_period_open(store, request.period).await?;

    if request.amount <= BigDecimal::zero() {
        return Err(LedgerError::Validation(format!(
            "Posting amount must be positive, got {}",
            request.amount
        )));
    }
    if request.debit_account == request.credit_account {
        return Err(LedgerError::Validation(format!(
            "Debit and credit account must differ (both {})",
            request.debit_account
        )));
    }
    require_active_account(store, request.debit_account).await?;
    require_active_account(store, request.credit_account).await?;

    let debit = store
        .insert_ledger_entry(request.entry(request.debit_account, EntryType::Debit))
        .await?;
    let credit = store
        .insert_ledger_entry(request.entry(request.credit_account, EntryType::Credit))
        .await?;

    tracing::info!(
        period = %request.period,
        debit = request.debit_account,
        credit = request.credit_account,
        amount = %request.amount,
        bill = ?request.bill_id,
        payment = ?request.payment_id,
        "Posted double entry"
    );
    Ok(Posting { debit, credit })
}

/// One-sided posting kept for imports and manual corrections
#[derive(Debug, Clone)]
pub struct SinglePosting {
    pub period: Period,
    pub account_id: AccountId,
    /// Signed amount; a negative amount flips the side
    pub amount: BigDecimal,
    /// Side for a non-negative amount; derived from the account nature when unset
    pub side: Option<EntryType>,
    pub room_id: Option<RoomId>,
    pub bill_id: Option<BillId>,
    pub payment_id: Option<PaymentId>,
    pub details: Value,
}

impl SinglePosting {
    pub fn new(period: Period, account_id: AccountId, amount: BigDecimal) -> Self {
        Self {
            period,
            account_id,
            amount,
            side: None,
            room_id: None,
            bill_id: None,
            payment_id: None,
            details: Value::Null,
        }
    }

    pub fn side(mut self, side: EntryType) -> Self {
        self.side = Some(side);
        self
    }

    pub fn room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }
}

/// Write a single ledger row
///
/// Assets default to the debit side, every other nature to credit.
pub async fn post_single<T: ErpStorage + ?Sized>(
    store: &mut T,
    posting: &SinglePosting,
) -> LedgerResult<LedgerEntry> {
    ensure_period_open(store, posting.period).await?;

    if posting.amount.is_zero() {
        return Err(LedgerError::Validation(
            "Posting amount cannot be zero".to_string(),
        ));
    }
    let account = require_active_account(store, posting.account_id).await?;

    let base = posting.side.unwrap_or(match account.nature {
        AccountNature::Asset => EntryType::Debit,
        _ => EntryType::Credit,
    });
    let negative = posting.amount < BigDecimal::zero();
    let side = if negative { base.opposite() } else { base };

    let entry = store
        .insert_ledger_entry(LedgerEntry {
            id: 0,
            room_id: posting.room_id,
            account_id: posting.account_id,
            amount: posting.amount.abs(),
            period: posting.period,
            side,
            ref_bill_id: posting.bill_id,
            ref_payment_id: posting.payment_id,
            details: posting.details.clone(),
            created_at: chrono::Utc::now().naive_utc(),
        })
        .await?;

    tracing::info!(
        period = %posting.period,
        account = posting.account_id,
        direction = side.direction(),
        amount = %entry.amount,
        "Posted single entry"
    );
    Ok(entry)
}

/// Postings used by the billing workflows
pub mod patterns {
    use super::*;
    use crate::billing::types::Bill;
    use crate::config::ChartConfig;

    /// Cash received into a room's prepaid balance
    pub fn recharge(
        chart: &ChartConfig,
        period: Period,
        room_id: RoomId,
        payment_id: PaymentId,
        amount: BigDecimal,
    ) -> PostingRequest {
        PostingRequest::new(period, chart.cash, chart.advance_receipts, amount)
            .room(room_id)
            .payment(payment_id)
    }

    /// Bill paid out of the prepaid balance
    pub fn balance_settlement(
        chart: &ChartConfig,
        bill: &Bill,
        payment_id: PaymentId,
        amount: BigDecimal,
    ) -> PostingRequest {
        PostingRequest::new(bill.period, chart.advance_receipts, chart.fee_income, amount)
            .room(bill.room_id)
            .bill(bill.id)
            .payment(payment_id)
    }

    /// Bill paid directly in cash or by transfer
    pub fn direct_settlement(
        chart: &ChartConfig,
        bill: &Bill,
        payment_id: PaymentId,
        amount: BigDecimal,
    ) -> PostingRequest {
        PostingRequest::new(bill.period, chart.cash, chart.fee_income, amount)
            .room(bill.room_id)
            .bill(bill.id)
            .payment(payment_id)
    }

    /// Approved fee discount
    pub fn discount(chart: &ChartConfig, bill: &Bill, amount: BigDecimal) -> PostingRequest {
        PostingRequest::new(bill.period, chart.discounts, chart.fee_income, amount)
            .room(bill.room_id)
            .bill(bill.id)
    }

    /// Tax portion of an invoiced bill moved out of income
    pub fn tax_reclass(
        chart: &ChartConfig,
        period: Period,
        bill: &Bill,
        tax: BigDecimal,
    ) -> PostingRequest {
        PostingRequest::new(period, chart.fee_income, chart.output_tax, tax)
            .room(bill.room_id)
            .bill(bill.id)
    }
}
