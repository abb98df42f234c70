//! Periodic bill generation, arrears and voiding

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use super::settlement::{self, owed};
use super::types::*;
use crate::audit::{record_data_change, AuditRecord, FieldChange};
use crate::ledger::ensure_period_open;
use crate::property::types::{MeterStatus, ParkingStatus, Room};
use crate::scope::ErpContext;
use crate::tax::TaxRate;
use crate::traits::*;
use crate::types::*;
use crate::utils::money::to_money;
use crate::utils::validation::*;

/// Which amounts a generation run bills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenerationMode {
    /// Every fee item on the room with a positive standard
    AllFeeItems,
    /// One named fee item
    FeeItem(String),
    /// Room area times a unit price
    UnitPriceByArea {
        fee_type: String,
        unit_price: BigDecimal,
    },
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub period: Period,
    pub mode: GenerationMode,
    pub property_id: Option<PropertyId>,
}

impl GenerationRequest {
    pub fn new(period: Period, mode: GenerationMode) -> Self {
        Self {
            period,
            mode,
            property_id: None,
        }
    }

    pub fn property(mut self, property_id: PropertyId) -> Self {
        self.property_id = Some(property_id);
        self
    }
}

/// Outcome of a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub count: usize,
    pub total: BigDecimal,
    /// Candidates that already had a bill for the period
    pub skipped: usize,
    pub bills: Vec<Bill>,
}

impl GenerationSummary {
    fn new() -> Self {
        Self {
            count: 0,
            total: BigDecimal::zero(),
            skipped: 0,
            bills: Vec::new(),
        }
    }

    fn add(&mut self, bill: Bill) {
        self.count += 1;
        self.total += &bill.amount_due;
        self.bills.push(bill);
    }
}

fn candidates(room: &Room, mode: &GenerationMode) -> Vec<(String, BigDecimal)> {
    let positive = |amount: &BigDecimal| *amount > BigDecimal::zero();
    match mode {
        GenerationMode::AllFeeItems => room
            .fee_items
            .iter()
            .filter(|item| positive(&item.standard))
            .map(|item| (item.name.trim().to_string(), to_money(&item.standard)))
            .collect(),
        GenerationMode::FeeItem(name) => room
            .fee_standard(name)
            .filter(|standard| positive(standard))
            .map(|standard| vec![(name.trim().to_string(), to_money(standard))])
            .unwrap_or_default(),
        GenerationMode::UnitPriceByArea {
            fee_type,
            unit_price,
        } => {
            let amount = to_money(&(&room.area * unit_price));
            if positive(&amount) {
                vec![(fee_type.trim().to_string(), amount)]
            } else {
                Vec::new()
            }
        }
    }
}

/// Whether a live bill already covers this room, fee type and period
async fn room_bill_exists<T: ErpStorage + ?Sized>(
    store: &T,
    room_id: RoomId,
    fee_type: &str,
    period: Period,
) -> LedgerResult<bool> {
    let filter = BillFilter::room(room_id).period(period).fee_type(fee_type);
    Ok(store
        .list_bills(&filter)
        .await?
        .iter()
        .any(|bill| bill.parking_space_id.is_none() && bill.status != BillStatus::Void))
}

/// Bill generation and queries
pub struct BillingService<S: TransactionalStorage> {
    ctx: ErpContext<S>,
}

impl<S: TransactionalStorage> BillingService<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self { ctx }
    }

    /// Create or update a fee type and its invoicing tax rate
    pub async fn define_fee_type(
        &self,
        actor: &str,
        name: &str,
        tax_rate: BigDecimal,
    ) -> LedgerResult<FeeType> {
        validate_actor(actor)?;
        validate_name(name, "Fee type")?;
        let rate = TaxRate::new(tax_rate, &self.ctx.config.billing.max_tax_rate())?;

        let fee_type = FeeType {
            name: name.trim().to_string(),
            tax_rate: rate.value().clone(),
        };
        let mut scope = self.ctx.begin().await?;
        scope.store().save_fee_type(&fee_type).await?;
        scope
            .audit(
                AuditRecord::new(actor, "define_fee_type", &fee_type.name)
                    .details(json!({ "tax_rate": fee_type.tax_rate.to_string() })),
            )
            .await?;
        scope.commit().await?;
        Ok(fee_type)
    }

    pub async fn fee_types(&self) -> LedgerResult<Vec<FeeType>> {
        self.ctx.storage.list_fee_types().await
    }

    /// Raise room fee bills for a period
    pub async fn generate_bills_for_period(
        &self,
        actor: &str,
        request: &GenerationRequest,
    ) -> LedgerResult<GenerationSummary> {
        validate_actor(actor)?;
        if let GenerationMode::UnitPriceByArea { fee_type, unit_price } = &request.mode {
            validate_name(fee_type, "Fee type")?;
            validate_positive_amount(unit_price)?;
        }

        let mut scope = self.ctx.begin().await?;
        ensure_period_open(scope.store(), request.period).await?;

        let rooms = scope.store().list_rooms(request.property_id).await?;
        let mut summary = GenerationSummary::new();
        for room in rooms.iter().filter(|room| room.is_billable()) {
            for (fee_type, amount) in candidates(room, &request.mode) {
                if room_bill_exists(scope.store(), room.id, &fee_type, request.period).await? {
                    summary.skipped += 1;
                    continue;
                }
                let bill = scope
                    .store()
                    .insert_bill(Bill::new(room.id, &fee_type, request.period, amount, actor))
                    .await?;
                summary.add(bill);
            }
        }

        scope
            .audit(
                AuditRecord::new(actor, "generate_bills", request.period).details(json!({
                    "mode": request.mode,
                    "property_id": request.property_id,
                    "count": summary.count,
                    "total": summary.total.to_string(),
                    "skipped": summary.skipped,
                })),
            )
            .await?;
        scope.commit().await?;

        tracing::info!(
            period = %request.period,
            count = summary.count,
            skipped = summary.skipped,
            total = %summary.total,
            "Bills generated"
        );
        Ok(summary)
    }

    /// Monthly fees for occupied parking spaces linked to a room
    pub async fn generate_parking_bills(
        &self,
        actor: &str,
        period: Period,
        fee_type: &str,
    ) -> LedgerResult<GenerationSummary> {
        validate_actor(actor)?;
        validate_name(fee_type, "Fee type")?;
        let fee_type = fee_type.trim();

        let mut scope = self.ctx.begin().await?;
        ensure_period_open(scope.store(), period).await?;

        let spaces = scope.store().list_parking_spaces().await?;
        let mut summary = GenerationSummary::new();
        for space in spaces {
            let Some(room_id) = space.room_id else {
                continue;
            };
            if space.is_deleted
                || space.status == ParkingStatus::Idle
                || space.fee_monthly <= BigDecimal::zero()
            {
                continue;
            }
            let room_live = scope
                .store()
                .get_room(room_id)
                .await?
                .is_some_and(|room| !room.is_deleted);
            if !room_live {
                continue;
            }

            let filter = BillFilter {
                parking_space_id: Some(space.id),
                period: Some(period),
                fee_type: Some(fee_type.to_string()),
                ..BillFilter::default()
            };
            let exists = scope
                .store()
                .list_bills(&filter)
                .await?
                .iter()
                .any(|bill| bill.status != BillStatus::Void);
            if exists {
                summary.skipped += 1;
                continue;
            }

            let mut bill = Bill::new(room_id, fee_type, period, to_money(&space.fee_monthly), actor);
            bill.parking_space_id = Some(space.id);
            bill.remark = Some(format!("Parking space {}", space.space_number));
            summary.add(scope.store().insert_bill(bill).await?);
        }

        scope
            .audit(
                AuditRecord::new(actor, "generate_parking_bills", period).details(json!({
                    "fee_type": fee_type,
                    "count": summary.count,
                    "total": summary.total.to_string(),
                    "skipped": summary.skipped,
                })),
            )
            .await?;
        scope.commit().await?;
        Ok(summary)
    }

    /// Water and electricity bills from a period's readings
    ///
    /// Readings of all meters of one kind on a room are billed together.
    pub async fn generate_utility_bills(
        &self,
        actor: &str,
        period: Period,
    ) -> LedgerResult<GenerationSummary> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        ensure_period_open(scope.store(), period).await?;

        let mut amounts: BTreeMap<(RoomId, &'static str), BigDecimal> = BTreeMap::new();
        let readings = scope.store().list_readings(None, Some(period)).await?;
        for reading in readings {
            let meter = scope.store().get_meter(reading.meter_id).await?;
            let Some(meter) = meter.filter(|m| !m.is_deleted && m.status == MeterStatus::Normal)
            else {
                continue;
            };
            let Some(room_id) = meter.room_id else {
                continue;
            };
            *amounts.entry((room_id, meter.kind.fee_type())).or_default() += &reading.amount;
        }

        let mut summary = GenerationSummary::new();
        for ((room_id, fee_type), amount) in amounts {
            let room_live = scope
                .store()
                .get_room(room_id)
                .await?
                .is_some_and(|room| !room.is_deleted);
            if !room_live || amount <= BigDecimal::zero() {
                continue;
            }
            if room_bill_exists(scope.store(), room_id, fee_type, period).await? {
                summary.skipped += 1;
                continue;
            }
            let bill = Bill::new(room_id, fee_type, period, to_money(&amount), actor);
            summary.add(scope.store().insert_bill(bill).await?);
        }

        scope
            .audit(
                AuditRecord::new(actor, "generate_utility_bills", period).details(json!({
                    "count": summary.count,
                    "total": summary.total.to_string(),
                    "skipped": summary.skipped,
                })),
            )
            .await?;
        scope.commit().await?;
        Ok(summary)
    }

    /// Total still owed on a room's unpaid and partially paid bills
    pub async fn calculate_arrears(&self, room_id: RoomId) -> LedgerResult<BigDecimal> {
        Ok(self
            .ctx
            .storage
            .list_bills(&BillFilter::room(room_id).open())
            .await?
            .iter()
            .map(owed)
            .sum())
    }

    /// Cancel a bill nobody has paid or discounted
    pub async fn void_bill(&self, actor: &str, bill_id: BillId, reason: &str) -> LedgerResult<Bill> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut bill = scope
            .store()
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bill", bill_id))?;
        ensure_period_open(scope.store(), bill.period).await?;
        let before = bill.status;
        settlement::void(&mut bill)?;

        scope.store().update_bill(&bill).await?;
        let change = FieldChange {
            table_name: "bills",
            record_id: bill.id,
            field_name: "status",
            old_value: Some(format!("{before:?}")),
            new_value: Some(format!("{:?}", bill.status)),
        };
        record_data_change(scope.store(), change, actor, Some(reason)).await?;
        scope
            .audit(
                AuditRecord::new(actor, "void_bill", bill.id)
                    .details(json!({ "reason": reason, "amount_due": bill.amount_due.to_string() })),
            )
            .await?;
        scope.commit().await?;
        Ok(bill)
    }

    pub async fn get_bill(&self, bill_id: BillId) -> LedgerResult<Bill> {
        self.ctx
            .storage
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bill", bill_id))
    }

    pub async fn list_bills(&self, filter: &BillFilter) -> LedgerResult<Vec<Bill>> {
        self.ctx.storage.list_bills(filter).await
    }

    /// One page of matching bills in id order, sized by `billing.page_size`
    pub async fn list_bills_page(&self, filter: &BillFilter, page: usize) -> LedgerResult<Page<Bill>> {
        let bills = self.ctx.storage.list_bills(filter).await?;
        Ok(Page::slice(bills, page, self.ctx.config.billing.page_size))
    }
}
