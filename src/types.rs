//! Core types and data structures for the billing ledger

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AccountId = u64;
pub type LedgerEntryId = u64;
pub type PropertyId = u64;
pub type RoomId = u64;
pub type ParkingSpaceId = u64;
pub type MeterId = u64;
pub type ReadingId = u64;
pub type BillId = u64;
pub type PaymentId = u64;
pub type InvoiceId = u64;
pub type DiscountRequestId = u64;

/// One page of a listing; pages are numbered from 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    /// Rows across all pages
    pub total: usize,
}

impl<T> Page<T> {
    /// Cut page `page` out of an ordered listing
    pub fn slice(items: Vec<T>, page: usize, page_size: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = items.len();
        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Self {
            items,
            page,
            page_size,
            total,
        }
    }

    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size)
    }
}

/// Accounting period keyed by year and month, written `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Create a period, rejecting months outside 1-12 and years outside 1-9999
    pub fn new(year: i32, month: u32) -> LedgerResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Validation(format!(
                "Period month must be between 1 and 12, got {month}"
            )));
        }
        if !(1..=9999).contains(&year) {
            return Err(LedgerError::Validation(format!(
                "Period year must be between 1 and 9999, got {year}"
            )));
        }
        Ok(Self { year, month })
    }

    /// The period containing a calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The period of today's local date
    pub fn current() -> Self {
        Self::from_date(chrono::Local::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following month; fails past 9999-12
    pub fn next(&self) -> LedgerResult<Self> {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// The preceding month; fails before 0001-01
    pub fn previous(&self) -> LedgerResult<Self> {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::Validation(format!("Invalid period '{s}', expected YYYY-MM"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;

        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        if !year.chars().chain(month.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// Account natures following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountNature {
    /// What the property office holds (cash, bank)
    Asset,
    /// What it owes (advance receipts, tax payable)
    Liability,
    Equity,
    /// Fee income
    Income,
    /// Costs, including fee discounts granted
    Expense,
}

impl AccountNature {
    /// Assets and expenses carry debit balances, everything else credit
    pub fn normal_balance(&self) -> EntryType {
        match self {
            AccountNature::Asset | AccountNature::Expense => EntryType::Debit,
            AccountNature::Liability | AccountNature::Equity | AccountNature::Income => {
                EntryType::Credit
            }
        }
    }
}

/// Side of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    /// Signed direction stored with each entry: +1 for debit, -1 for credit
    pub fn direction(&self) -> i8 {
        match self {
            EntryType::Debit => 1,
            EntryType::Credit => -1,
        }
    }

    pub fn from_direction(direction: i8) -> LedgerResult<Self> {
        match direction {
            1 => Ok(EntryType::Debit),
            -1 => Ok(EntryType::Credit),
            other => Err(LedgerError::Validation(format!(
                "Entry direction must be 1 or -1, got {other}"
            ))),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

/// Ledger account in the chart of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub nature: AccountNature,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Account {
    pub fn new(id: AccountId, name: String, nature: AccountNature) -> Self {
        Self {
            id,
            name,
            nature,
            is_active: true,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// One side of a posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub room_id: Option<RoomId>,
    pub account_id: AccountId,
    /// Always stored positive for double-entry postings; the side carries the sign
    pub amount: BigDecimal,
    pub period: Period,
    pub side: EntryType,
    pub ref_bill_id: Option<BillId>,
    pub ref_payment_id: Option<PaymentId>,
    pub details: serde_json::Value,
    pub created_at: NaiveDateTime,
}

impl LedgerEntry {
    pub fn direction(&self) -> i8 {
        self.side.direction()
    }

    /// Amount with the direction applied (debits positive)
    pub fn signed_amount(&self) -> BigDecimal {
        match self.side {
            EntryType::Debit => self.amount.clone(),
            EntryType::Credit => -self.amount.clone(),
        }
    }
}

/// Close flag record for an accounting period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodClose {
    pub period: Period,
    pub closed: bool,
    pub created_at: NaiveDateTime,
    pub closed_at: Option<NaiveDateTime>,
    pub remark: Option<String>,
}

/// Errors that can occur in the billing ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Accounting period {0} is closed")]
    PeriodClosed(Period),
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: BigDecimal,
        available: BigDecimal,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Concurrent modification detected, please retry")]
    ConcurrentModification,
    #[error("Audit log error: {0}")]
    Audit(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable code for callers rendering errors
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::PeriodClosed(_) => "PERIOD_CLOSED",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::InvalidState(_) => "INVALID_STATE",
            LedgerError::ConcurrentModification => "CONCURRENT_MODIFICATION",
            LedgerError::Audit(_) => "AUDIT_ERROR",
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
