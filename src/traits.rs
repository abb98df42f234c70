//! Traits for storage abstraction and extensibility

use async_trait::async_trait;

use crate::audit::{AuditEntry, AuditFilter, DataChange};
use crate::billing::types::*;
use crate::property::types::*;
use crate::types::*;

/// Query over ledger entries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct LedgerEntryFilter {
    pub account_id: Option<AccountId>,
    pub period: Option<Period>,
    pub room_id: Option<RoomId>,
    pub ref_bill_id: Option<BillId>,
    pub ref_payment_id: Option<PaymentId>,
}

impl LedgerEntryFilter {
    pub fn account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn bill(mut self, bill_id: BillId) -> Self {
        self.ref_bill_id = Some(bill_id);
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.account_id.is_none_or(|id| entry.account_id == id)
            && self.period.is_none_or(|p| entry.period == p)
            && self.room_id.is_none_or(|id| entry.room_id == Some(id))
            && self.ref_bill_id.is_none_or(|id| entry.ref_bill_id == Some(id))
            && self
                .ref_payment_id
                .is_none_or(|id| entry.ref_payment_id == Some(id))
    }
}

/// Storage abstraction for the billing ledger
///
/// Implementations back the relational schema: accounts, ledger entries,
/// period locks, property units, bills, payments and the audit tables.
/// `insert_*` methods assign the id and return the stored row.
#[async_trait]
pub trait ErpStorage: Send + Sync {
    // Chart of accounts
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()>;
    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>>;
    async fn list_accounts(&self) -> LedgerResult<Vec<Account>>;
    async fn update_account(&mut self, account: &Account) -> LedgerResult<()>;

    // Ledger entries are append-only
    async fn insert_ledger_entry(&mut self, entry: LedgerEntry) -> LedgerResult<LedgerEntry>;
    async fn list_ledger_entries(
        &self,
        filter: &LedgerEntryFilter,
    ) -> LedgerResult<Vec<LedgerEntry>>;

    // Period locks
    async fn get_period_close(&self, period: Period) -> LedgerResult<Option<PeriodClose>>;
    async fn save_period_close(&mut self, record: &PeriodClose) -> LedgerResult<()>;
    async fn list_period_closes(&self) -> LedgerResult<Vec<PeriodClose>>;

    // Property units
    async fn insert_property(&mut self, property: Property) -> LedgerResult<Property>;
    async fn get_property(&self, property_id: PropertyId) -> LedgerResult<Option<Property>>;
    async fn list_properties(&self) -> LedgerResult<Vec<Property>>;

    async fn insert_room(&mut self, room: Room) -> LedgerResult<Room>;
    async fn get_room(&self, room_id: RoomId) -> LedgerResult<Option<Room>>;
    async fn update_room(&mut self, room: &Room) -> LedgerResult<()>;
    /// All rooms, soft-deleted included, optionally restricted to one property
    async fn list_rooms(&self, property_id: Option<PropertyId>) -> LedgerResult<Vec<Room>>;

    async fn insert_parking_space(&mut self, space: ParkingSpace) -> LedgerResult<ParkingSpace>;
    async fn get_parking_space(
        &self,
        space_id: ParkingSpaceId,
    ) -> LedgerResult<Option<ParkingSpace>>;
    async fn list_parking_spaces(&self) -> LedgerResult<Vec<ParkingSpace>>;

    async fn insert_meter(&mut self, meter: UtilityMeter) -> LedgerResult<UtilityMeter>;
    async fn get_meter(&self, meter_id: MeterId) -> LedgerResult<Option<UtilityMeter>>;
    async fn update_meter(&mut self, meter: &UtilityMeter) -> LedgerResult<()>;
    async fn list_meters(&self) -> LedgerResult<Vec<UtilityMeter>>;

    async fn insert_reading(&mut self, reading: UtilityReading) -> LedgerResult<UtilityReading>;
    /// Readings ordered by date then id
    async fn list_readings(
        &self,
        meter_id: Option<MeterId>,
        period: Option<Period>,
    ) -> LedgerResult<Vec<UtilityReading>>;

    // Billing
    async fn save_fee_type(&mut self, fee_type: &FeeType) -> LedgerResult<()>;
    async fn get_fee_type(&self, name: &str) -> LedgerResult<Option<FeeType>>;
    async fn list_fee_types(&self) -> LedgerResult<Vec<FeeType>>;

    async fn insert_bill(&mut self, bill: Bill) -> LedgerResult<Bill>;
    async fn get_bill(&self, bill_id: BillId) -> LedgerResult<Option<Bill>>;
    async fn update_bill(&mut self, bill: &Bill) -> LedgerResult<()>;
    async fn list_bills(&self, filter: &BillFilter) -> LedgerResult<Vec<Bill>>;

    async fn insert_payment(&mut self, payment: PaymentRecord) -> LedgerResult<PaymentRecord>;
    async fn list_payments(&self, room_id: Option<RoomId>) -> LedgerResult<Vec<PaymentRecord>>;

    async fn insert_invoice(&mut self, invoice: Invoice) -> LedgerResult<Invoice>;
    async fn find_invoice_for_bill(&self, bill_id: BillId) -> LedgerResult<Option<Invoice>>;
    async fn find_invoice_by_number(&self, invoice_no: &str) -> LedgerResult<Option<Invoice>>;
    async fn list_invoices(&self) -> LedgerResult<Vec<Invoice>>;

    async fn insert_discount_request(
        &mut self,
        request: DiscountRequest,
    ) -> LedgerResult<DiscountRequest>;
    async fn get_discount_request(
        &self,
        request_id: DiscountRequestId,
    ) -> LedgerResult<Option<DiscountRequest>>;
    async fn update_discount_request(&mut self, request: &DiscountRequest) -> LedgerResult<()>;
    async fn list_discount_requests(
        &self,
        status: Option<DiscountStatus>,
    ) -> LedgerResult<Vec<DiscountRequest>>;

    async fn insert_adjustment(&mut self, entry: AdjustmentEntry) -> LedgerResult<AdjustmentEntry>;
    async fn list_adjustments(&self, bill_id: Option<BillId>)
        -> LedgerResult<Vec<AdjustmentEntry>>;

    // Audit tables
    async fn insert_audit_entry(&mut self, entry: AuditEntry) -> LedgerResult<AuditEntry>;
    /// Matching audit rows in insertion order
    async fn list_audit_entries(&self, filter: &AuditFilter) -> LedgerResult<Vec<AuditEntry>>;

    async fn insert_data_change(&mut self, change: DataChange) -> LedgerResult<DataChange>;
    async fn list_data_changes(
        &self,
        table_name: Option<&str>,
        record_id: Option<u64>,
    ) -> LedgerResult<Vec<DataChange>>;
}

/// Storage that can stage writes in a transaction
///
/// `begin` hands out a working copy implementing [`ErpStorage`]; nothing it
/// writes is visible until `commit`. Dropping the transaction rolls back.
#[async_trait]
pub trait TransactionalStorage: ErpStorage + Clone {
    type Transaction: ErpStorage;

    async fn begin(&self) -> LedgerResult<Self::Transaction>;

    async fn commit(&self, transaction: Self::Transaction) -> LedgerResult<()>;
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before saving
    fn validate_account(&self, account: &Account) -> LedgerResult<()>;
}

/// Default account validator with basic rules
pub struct DefaultAccountValidator;

impl AccountValidator for DefaultAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        if account.id == 0 {
            return Err(LedgerError::Validation(
                "Account ID must be positive".to_string(),
            ));
        }

        if account.name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Account name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
