//! Bills, payments, invoices and discount requests

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Void,
}

impl BillStatus {
    /// Bills that still accept payments and discounts
    pub fn is_open(&self) -> bool {
        matches!(self, BillStatus::Unpaid | BillStatus::PartiallyPaid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub room_id: RoomId,
    pub parking_space_id: Option<ParkingSpaceId>,
    pub fee_type: String,
    pub period: Period,
    pub amount_due: BigDecimal,
    pub amount_paid: BigDecimal,
    pub discount: BigDecimal,
    pub status: BillStatus,
    pub operator: String,
    pub remark: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Bill {
    /// Fresh unpaid bill; the storage assigns the id
    pub fn new(
        room_id: RoomId,
        fee_type: &str,
        period: Period,
        amount_due: BigDecimal,
        operator: &str,
    ) -> Self {
        Self {
            id: 0,
            room_id,
            parking_space_id: None,
            fee_type: fee_type.trim().to_string(),
            period,
            amount_due,
            amount_paid: BigDecimal::from(0),
            discount: BigDecimal::from(0),
            status: BillStatus::Unpaid,
            operator: operator.to_string(),
            remark: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Query over stored bills; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub room_id: Option<RoomId>,
    pub parking_space_id: Option<ParkingSpaceId>,
    pub period: Option<Period>,
    pub fee_type: Option<String>,
    pub open_only: bool,
}

impl BillFilter {
    pub fn room(room_id: RoomId) -> Self {
        Self {
            room_id: Some(room_id),
            ..Self::default()
        }
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn fee_type(mut self, fee_type: impl Into<String>) -> Self {
        self.fee_type = Some(fee_type.into());
        self
    }

    pub fn open(mut self) -> Self {
        self.open_only = true;
        self
    }

    pub fn matches(&self, bill: &Bill) -> bool {
        self.room_id.is_none_or(|id| bill.room_id == id)
            && self
                .parking_space_id
                .is_none_or(|id| bill.parking_space_id == Some(id))
            && self.period.is_none_or(|p| bill.period == p)
            && self
                .fee_type
                .as_deref()
                .is_none_or(|f| bill.fee_type.trim() == f.trim())
            && (!self.open_only || bill.status.is_open())
    }
}

/// Configured fee category with its invoicing tax rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeType {
    pub name: String,
    pub tax_rate: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BizType {
    Recharge,
    BillPayment,
    BatchPayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayMethod {
    /// Deduct from the room's prepaid balance
    Balance,
    Cash,
    WeChat,
    Alipay,
    BankTransfer,
}

impl PayMethod {
    pub fn is_balance(&self) -> bool {
        matches!(self, PayMethod::Balance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub room_id: RoomId,
    pub amount: BigDecimal,
    pub biz_type: BizType,
    pub pay_method: PayMethod,
    pub operator: String,
    pub remark: Option<String>,
    pub trace_id: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub bill_id: BillId,
    pub invoice_no: String,
    pub title: String,
    pub tax_rate: BigDecimal,
    pub amount_excl_tax: BigDecimal,
    pub tax_amount: BigDecimal,
    pub amount_incl_tax: BigDecimal,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRequest {
    pub id: DiscountRequestId,
    pub bill_id: BillId,
    pub requested_by: String,
    pub amount: BigDecimal,
    pub reason: Option<String>,
    pub status: DiscountStatus,
    pub created_at: NaiveDateTime,
    pub decided_by: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub remark: Option<String>,
}

/// Approved change to a bill's discount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentEntry {
    pub id: u64,
    pub bill_id: BillId,
    pub amount: BigDecimal,
    pub reason: Option<String>,
    pub approved_by: String,
    pub approved_at: NaiveDateTime,
}
