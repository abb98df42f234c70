//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::audit::{AuditEntry, AuditFilter, DataChange};
use crate::billing::types::*;
use crate::property::types::*;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    ledger_entries: BTreeMap<LedgerEntryId, LedgerEntry>,
    period_closes: BTreeMap<Period, PeriodClose>,
    properties: BTreeMap<PropertyId, Property>,
    rooms: BTreeMap<RoomId, Room>,
    parking_spaces: BTreeMap<ParkingSpaceId, ParkingSpace>,
    meters: BTreeMap<MeterId, UtilityMeter>,
    readings: BTreeMap<ReadingId, UtilityReading>,
    fee_types: BTreeMap<String, FeeType>,
    bills: BTreeMap<BillId, Bill>,
    payments: BTreeMap<PaymentId, PaymentRecord>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    discount_requests: BTreeMap<DiscountRequestId, DiscountRequest>,
    adjustments: BTreeMap<u64, AdjustmentEntry>,
    audit_entries: BTreeMap<u64, AuditEntry>,
    data_changes: BTreeMap<u64, DataChange>,
    sequences: HashMap<&'static str, u64>,
    /// Bumped on every write; commit compares it against the snapshot
    version: u64,
}

impl Tables {
    fn allocate(&mut self, table: &'static str) -> u64 {
        let next = self.sequences.entry(table).or_insert(0);
        *next += 1;
        *next
    }
}

/// In-memory storage implementation for testing and development
///
/// Clones share the same tables. A transaction from [`begin`] works on a
/// private snapshot that [`commit`] swaps in, provided nothing else was
/// written in the meantime.
///
/// [`begin`]: TransactionalStorage::begin
/// [`commit`]: TransactionalStorage::commit
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    base_version: u64,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            base_version: 0,
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        let mut tables = self.write()?;
        let version = tables.version + 1;
        *tables = Tables::default();
        tables.version = version;
        Ok(())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| LedgerError::Storage("Memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| LedgerError::Storage("Memory storage lock poisoned".to_string()))
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Tables) -> LedgerResult<R>) -> LedgerResult<R> {
        let mut tables = self.write()?;
        let result = f(&mut tables)?;
        tables.version += 1;
        Ok(result)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn replace<K: Ord, V>(
    table: &mut BTreeMap<K, V>,
    key: K,
    value: V,
    entity: &'static str,
    id: impl ToString,
) -> LedgerResult<()> {
    match table.get_mut(&key) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(LedgerError::not_found(entity, id)),
    }
}

#[async_trait]
impl ErpStorage for MemoryStorage {
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        self.mutate(|t| {
            t.accounts.insert(account.id, account.clone());
            Ok(())
        })
    }

    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(&account_id).cloned())
    }

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        Ok(self.read()?.accounts.values().cloned().collect())
    }

    async fn update_account(&mut self, account: &Account) -> LedgerResult<()> {
        self.mutate(|t| {
            replace(
                &mut t.accounts,
                account.id,
                account.clone(),
                "Account",
                account.id,
            )
        })
    }

    async fn insert_ledger_entry(&mut self, mut entry: LedgerEntry) -> LedgerResult<LedgerEntry> {
        self.mutate(|t| {
            entry.id = t.allocate("ledger_entries");
            t.ledger_entries.insert(entry.id, entry.clone());
            Ok(entry)
        })
    }

    async fn list_ledger_entries(
        &self,
        filter: &LedgerEntryFilter,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .ledger_entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    async fn get_period_close(&self, period: Period) -> LedgerResult<Option<PeriodClose>> {
        Ok(self.read()?.period_closes.get(&period).cloned())
    }

    async fn save_period_close(&mut self, record: &PeriodClose) -> LedgerResult<()> {
        self.mutate(|t| {
            t.period_closes.insert(record.period, record.clone());
            Ok(())
        })
    }

    async fn list_period_closes(&self) -> LedgerResult<Vec<PeriodClose>> {
        Ok(self.read()?.period_closes.values().cloned().collect())
    }

    async fn insert_property(&mut self, mut property: Property) -> LedgerResult<Property> {
        self.mutate(|t| {
            property.id = t.allocate("properties");
            t.properties.insert(property.id, property.clone());
            Ok(property)
        })
    }

    async fn get_property(&self, property_id: PropertyId) -> LedgerResult<Option<Property>> {
        Ok(self.read()?.properties.get(&property_id).cloned())
    }

    async fn list_properties(&self) -> LedgerResult<Vec<Property>> {
        Ok(self.read()?.properties.values().cloned().collect())
    }

    async fn insert_room(&mut self, mut room: Room) -> LedgerResult<Room> {
        self.mutate(|t| {
            room.id = t.allocate("rooms");
            t.rooms.insert(room.id, room.clone());
            Ok(room)
        })
    }

    async fn get_room(&self, room_id: RoomId) -> LedgerResult<Option<Room>> {
        Ok(self.read()?.rooms.get(&room_id).cloned())
    }

    async fn update_room(&mut self, room: &Room) -> LedgerResult<()> {
        self.mutate(|t| replace(&mut t.rooms, room.id, room.clone(), "Room", room.id))
    }

    async fn list_rooms(&self, property_id: Option<PropertyId>) -> LedgerResult<Vec<Room>> {
        Ok(self
            .read()?
            .rooms
            .values()
            .filter(|room| property_id.is_none_or(|id| room.property_id == id))
            .cloned()
            .collect())
    }

    async fn insert_parking_space(&mut self, mut space: ParkingSpace) -> LedgerResult<ParkingSpace> {
        self.mutate(|t| {
            space.id = t.allocate("parking_spaces");
            t.parking_spaces.insert(space.id, space.clone());
            Ok(space)
        })
    }

    async fn get_parking_space(
        &self,
        space_id: ParkingSpaceId,
    ) -> LedgerResult<Option<ParkingSpace>> {
        Ok(self.read()?.parking_spaces.get(&space_id).cloned())
    }

    async fn list_parking_spaces(&self) -> LedgerResult<Vec<ParkingSpace>> {
        Ok(self.read()?.parking_spaces.values().cloned().collect())
    }

    async fn insert_meter(&mut self, mut meter: UtilityMeter) -> LedgerResult<UtilityMeter> {
        self.mutate(|t| {
            meter.id = t.allocate("meters");
            t.meters.insert(meter.id, meter.clone());
            Ok(meter)
        })
    }

    async fn get_meter(&self, meter_id: MeterId) -> LedgerResult<Option<UtilityMeter>> {
        Ok(self.read()?.meters.get(&meter_id).cloned())
    }

    async fn update_meter(&mut self, meter: &UtilityMeter) -> LedgerResult<()> {
        self.mutate(|t| replace(&mut t.meters, meter.id, meter.clone(), "Meter", meter.id))
    }

    async fn list_meters(&self) -> LedgerResult<Vec<UtilityMeter>> {
        Ok(self.read()?.meters.values().cloned().collect())
    }

    async fn insert_reading(&mut self, mut reading: UtilityReading) -> LedgerResult<UtilityReading> {
        self.mutate(|t| {
            reading.id = t.allocate("readings");
            t.readings.insert(reading.id, reading.clone());
            Ok(reading)
        })
    }

    async fn list_readings(
        &self,
        meter_id: Option<MeterId>,
        period: Option<Period>,
    ) -> LedgerResult<Vec<UtilityReading>> {
        let mut readings: Vec<UtilityReading> = self
            .read()?
            .readings
            .values()
            .filter(|r| meter_id.is_none_or(|id| r.meter_id == id))
            .filter(|r| period.is_none_or(|p| r.period == p))
            .cloned()
            .collect();
        readings.sort_by(|a, b| (a.reading_date, a.id).cmp(&(b.reading_date, b.id)));
        Ok(readings)
    }

    async fn save_fee_type(&mut self, fee_type: &FeeType) -> LedgerResult<()> {
        self.mutate(|t| {
            t.fee_types
                .insert(fee_type.name.trim().to_string(), fee_type.clone());
            Ok(())
        })
    }

    async fn get_fee_type(&self, name: &str) -> LedgerResult<Option<FeeType>> {
        Ok(self.read()?.fee_types.get(name.trim()).cloned())
    }

    async fn list_fee_types(&self) -> LedgerResult<Vec<FeeType>> {
        Ok(self.read()?.fee_types.values().cloned().collect())
    }

    async fn insert_bill(&mut self, mut bill: Bill) -> LedgerResult<Bill> {
        self.mutate(|t| {
            bill.id = t.allocate("bills");
            t.bills.insert(bill.id, bill.clone());
            Ok(bill)
        })
    }

    async fn get_bill(&self, bill_id: BillId) -> LedgerResult<Option<Bill>> {
        Ok(self.read()?.bills.get(&bill_id).cloned())
    }

    async fn update_bill(&mut self, bill: &Bill) -> LedgerResult<()> {
        self.mutate(|t| replace(&mut t.bills, bill.id, bill.clone(), "Bill", bill.id))
    }

    async fn list_bills(&self, filter: &BillFilter) -> LedgerResult<Vec<Bill>> {
        Ok(self
            .read()?
            .bills
            .values()
            .filter(|bill| filter.matches(bill))
            .cloned()
            .collect())
    }

    async fn insert_payment(&mut self, mut payment: PaymentRecord) -> LedgerResult<PaymentRecord> {
        self.mutate(|t| {
            payment.id = t.allocate("payments");
            t.payments.insert(payment.id, payment.clone());
            Ok(payment)
        })
    }

    async fn list_payments(&self, room_id: Option<RoomId>) -> LedgerResult<Vec<PaymentRecord>> {
        Ok(self
            .read()?
            .payments
            .values()
            .filter(|p| room_id.is_none_or(|id| p.room_id == id))
            .cloned()
            .collect())
    }

    async fn insert_invoice(&mut self, mut invoice: Invoice) -> LedgerResult<Invoice> {
        self.mutate(|t| {
            invoice.id = t.allocate("invoices");
            t.invoices.insert(invoice.id, invoice.clone());
            Ok(invoice)
        })
    }

    async fn find_invoice_for_bill(&self, bill_id: BillId) -> LedgerResult<Option<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .find(|invoice| invoice.bill_id == bill_id)
            .cloned())
    }

    async fn find_invoice_by_number(&self, invoice_no: &str) -> LedgerResult<Option<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .find(|invoice| invoice.invoice_no == invoice_no)
            .cloned())
    }

    async fn list_invoices(&self) -> LedgerResult<Vec<Invoice>> {
        Ok(self.read()?.invoices.values().cloned().collect())
    }

    async fn insert_discount_request(
        &mut self,
        mut request: DiscountRequest,
    ) -> LedgerResult<DiscountRequest> {
        self.mutate(|t| {
            request.id = t.allocate("discount_requests");
            t.discount_requests.insert(request.id, request.clone());
            Ok(request)
        })
    }

    async fn get_discount_request(
        &self,
        request_id: DiscountRequestId,
    ) -> LedgerResult<Option<DiscountRequest>> {
        Ok(self.read()?.discount_requests.get(&request_id).cloned())
    }

    async fn update_discount_request(&mut self, request: &DiscountRequest) -> LedgerResult<()> {
        self.mutate(|t| {
            replace(
                &mut t.discount_requests,
                request.id,
                request.clone(),
                "Discount request",
                request.id,
            )
        })
    }

    async fn list_discount_requests(
        &self,
        status: Option<DiscountStatus>,
    ) -> LedgerResult<Vec<DiscountRequest>> {
        Ok(self
            .read()?
            .discount_requests
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }

    async fn insert_adjustment(
        &mut self,
        mut entry: AdjustmentEntry,
    ) -> LedgerResult<AdjustmentEntry> {
        self.mutate(|t| {
            entry.id = t.allocate("adjustments");
            t.adjustments.insert(entry.id, entry.clone());
            Ok(entry)
        })
    }

    async fn list_adjustments(
        &self,
        bill_id: Option<BillId>,
    ) -> LedgerResult<Vec<AdjustmentEntry>> {
        Ok(self
            .read()?
            .adjustments
            .values()
            .filter(|a| bill_id.is_none_or(|id| a.bill_id == id))
            .cloned()
            .collect())
    }

    async fn insert_audit_entry(&mut self, mut entry: AuditEntry) -> LedgerResult<AuditEntry> {
        self.mutate(|t| {
            if t
                .audit_entries
                .values()
                .any(|existing| existing.trace_id == entry.trace_id)
            {
                return Err(LedgerError::Validation(format!(
                    "Audit trace id '{}' is already recorded",
                    entry.trace_id
                )));
            }
            entry.id = t.allocate("audit_entries");
            t.audit_entries.insert(entry.id, entry.clone());
            Ok(entry)
        })
    }

    async fn list_audit_entries(&self, filter: &AuditFilter) -> LedgerResult<Vec<AuditEntry>> {
        Ok(self
            .read()?
            .audit_entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    async fn insert_data_change(&mut self, mut change: DataChange) -> LedgerResult<DataChange> {
        self.mutate(|t| {
            change.id = t.allocate("data_changes");
            t.data_changes.insert(change.id, change.clone());
            Ok(change)
        })
    }

    async fn list_data_changes(
        &self,
        table_name: Option<&str>,
        record_id: Option<u64>,
    ) -> LedgerResult<Vec<DataChange>> {
        Ok(self
            .read()?
            .data_changes
            .values()
            .filter(|c| table_name.is_none_or(|name| c.table_name == name))
            .filter(|c| record_id.is_none_or(|id| c.record_id == id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransactionalStorage for MemoryStorage {
    type Transaction = MemoryStorage;

    async fn begin(&self) -> LedgerResult<Self::Transaction> {
        let snapshot = self.read()?.clone();
        let base_version = snapshot.version;
        Ok(MemoryStorage {
            tables: Arc::new(RwLock::new(snapshot)),
            base_version,
        })
    }

    async fn commit(&self, transaction: Self::Transaction) -> LedgerResult<()> {
        let staged = transaction.read()?.clone();
        let mut tables = self.write()?;
        if tables.version != transaction.base_version {
            return Err(LedgerError::ConcurrentModification);
        }
        let version = tables.version + 1;
        *tables = staged;
        tables.version = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn bill(room_id: RoomId, fee_type: &str) -> Bill {
        let period = Period::new(2026, 3).unwrap();
        Bill::new(room_id, fee_type, period, BigDecimal::from(100), "tester")
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let mut storage = MemoryStorage::new();
        let first = storage.insert_bill(bill(1, "Property")).await.unwrap();
        let second = storage.insert_bill(bill(1, "Water")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let water = storage
            .list_bills(&BillFilter::room(1).fee_type(" Water "))
            .await
            .unwrap();
        assert_eq!(water.len(), 1);
        assert_eq!(water[0].id, 2);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let mut storage = MemoryStorage::new();
        let mut missing = bill(1, "Property");
        missing.id = 42;
        let err = storage.update_bill(&missing).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "Bill", .. }));
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let storage = MemoryStorage::new();

        let mut tx = storage.begin().await.unwrap();
        tx.insert_bill(bill(1, "Property")).await.unwrap();
        drop(tx);
        assert!(storage
            .list_bills(&BillFilter::default())
            .await
            .unwrap()
            .is_empty());

        let mut tx = storage.begin().await.unwrap();
        tx.insert_bill(bill(1, "Property")).await.unwrap();
        assert!(storage.get_bill(1).await.unwrap().is_none());
        storage.commit(tx).await.unwrap();
        assert!(storage.get_bill(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_rejected() {
        let storage = MemoryStorage::new();
        let mut first = storage.begin().await.unwrap();
        let mut second = storage.begin().await.unwrap();

        first.insert_bill(bill(1, "Property")).await.unwrap();
        second.insert_bill(bill(2, "Property")).await.unwrap();

        storage.commit(first).await.unwrap();
        let err = storage.commit(second).await.unwrap_err();
        assert!(matches!(err, LedgerError::ConcurrentModification));
        assert_eq!(
            storage.list_bills(&BillFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_audit_trace_ids_are_unique() {
        use crate::audit::AuditRecord;

        let mut storage = MemoryStorage::new();
        let (first, _) = AuditRecord::new("alice", "recharge", "A-101")
            .trace("till-42")
            .seal()
            .unwrap();
        let (second, _) = AuditRecord::new("alice", "pay_bills", "A-101")
            .trace("till-42")
            .seal()
            .unwrap();

        storage.insert_audit_entry(first).await.unwrap();
        let err = storage.insert_audit_entry(second).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let rows = storage
            .list_audit_entries(&AuditFilter::trace("till-42"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "recharge");
    }
}
