//! Cashier desk: recharges, bill payments and batch collection

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

use super::settlement::{apply_payment, owed};
use super::types::*;
use crate::audit::AuditRecord;
use crate::config::ChartConfig;
use crate::ledger::{patterns, post_double_entry};
use crate::property::types::Room;
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;
use crate::utils::money::is_settled;
use crate::utils::validation::*;

#[derive(Debug, Clone)]
pub struct RechargeRequest {
    pub room_id: RoomId,
    pub amount: BigDecimal,
    pub pay_method: PayMethod,
    /// Defaults to the current month
    pub period: Option<Period>,
    pub remark: Option<String>,
    pub trace_id: Option<String>,
}

impl RechargeRequest {
    pub fn new(room_id: RoomId, amount: BigDecimal, pay_method: PayMethod) -> Self {
        Self {
            room_id,
            amount,
            pay_method,
            period: None,
            remark: None,
            trace_id: None,
        }
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }
}

/// One bill in a payment; `amount` defaults to everything owed
#[derive(Debug, Clone)]
pub struct BillPayment {
    pub bill_id: BillId,
    pub amount: Option<BigDecimal>,
}

impl BillPayment {
    pub fn full(bill_id: BillId) -> Self {
        Self {
            bill_id,
            amount: None,
        }
    }

    pub fn partial(bill_id: BillId, amount: BigDecimal) -> Self {
        Self {
            bill_id,
            amount: Some(amount),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayBillsRequest {
    pub room_id: RoomId,
    pub bills: Vec<BillPayment>,
    pub pay_method: PayMethod,
    pub remark: Option<String>,
    pub trace_id: Option<String>,
}

impl PayBillsRequest {
    pub fn new(room_id: RoomId, bills: Vec<BillPayment>, pay_method: PayMethod) -> Self {
        Self {
            room_id,
            bills,
            pay_method,
            remark: None,
            trace_id: None,
        }
    }
}

/// A payment and the bills it settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub payment: PaymentRecord,
    pub bills: Vec<Bill>,
    /// Room balance after the payment
    pub balance_after: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct BatchPayRequest {
    pub period: Period,
    pub room_ids: Vec<RoomId>,
    pub pay_method: PayMethod,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPaymentSummary {
    pub payments: Vec<PaymentOutcome>,
    /// Rooms with nothing owed in the period
    pub skipped_rooms: Vec<RoomId>,
    pub total: BigDecimal,
}

async fn live_room<T: ErpStorage + ?Sized>(store: &T, room_id: RoomId) -> LedgerResult<Room> {
    store
        .get_room(room_id)
        .await?
        .filter(|room| !room.is_deleted)
        .ok_or_else(|| LedgerError::not_found("Room", room_id))
}

/// Record one payment over already-validated bills and post each settlement
#[allow(clippy::too_many_arguments)]
async fn settle<T: ErpStorage + ?Sized>(
    store: &mut T,
    chart: &ChartConfig,
    mut room: Room,
    settlements: Vec<(Bill, BigDecimal)>,
    pay_method: PayMethod,
    biz_type: BizType,
    actor: &str,
    remark: Option<String>,
    trace_id: Option<String>,
) -> LedgerResult<PaymentOutcome> {
    let total: BigDecimal = settlements.iter().map(|(_, amount)| amount).sum();
    if pay_method.is_balance() && room.balance < total {
        return Err(LedgerError::InsufficientBalance {
            required: total,
            available: room.balance,
        });
    }

    let payment = store
        .insert_payment(PaymentRecord {
            id: 0,
            room_id: room.id,
            amount: total.clone(),
            biz_type,
            pay_method,
            operator: actor.to_string(),
            remark,
            trace_id,
            created_at: chrono::Utc::now().naive_utc(),
        })
        .await?;

    let mut bills = Vec::with_capacity(settlements.len());
    for (mut bill, amount) in settlements {
        apply_payment(&mut bill, &amount)?;
        let request = if pay_method.is_balance() {
            patterns::balance_settlement(chart, &bill, payment.id, amount)
        } else {
            patterns::direct_settlement(chart, &bill, payment.id, amount)
        };
        post_double_entry(store, &request).await?;
        store.update_bill(&bill).await?;
        bills.push(bill);
    }

    if pay_method.is_balance() {
        room.balance -= &total;
        store.update_room(&room).await?;
    }

    Ok(PaymentOutcome {
        payment,
        bills,
        balance_after: room.balance,
    })
}

/// Takes money in and settles bills
pub struct Cashier<S: TransactionalStorage> {
    ctx: ErpContext<S>,
}

impl<S: TransactionalStorage> Cashier<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self { ctx }
    }

    /// Top up a room's prepaid balance
    pub async fn recharge(&self, actor: &str, request: RechargeRequest) -> LedgerResult<PaymentRecord> {
        validate_actor(actor)?;
        validate_money_amount(&request.amount)?;
        if request.pay_method.is_balance() {
            return Err(LedgerError::Validation(
                "A recharge cannot be paid from the balance it tops up".to_string(),
            ));
        }
        let period = request.period.unwrap_or_else(Period::current);

        let mut scope = self.ctx.begin().await?;
        let mut room = live_room(scope.store(), request.room_id).await?;
        room.balance += &request.amount;
        scope.store().update_room(&room).await?;

        let payment = scope
            .store()
            .insert_payment(PaymentRecord {
                id: 0,
                room_id: room.id,
                amount: request.amount.clone(),
                biz_type: BizType::Recharge,
                pay_method: request.pay_method,
                operator: actor.to_string(),
                remark: request.remark,
                trace_id: request.trace_id.clone(),
                created_at: chrono::Utc::now().naive_utc(),
            })
            .await?;
        let posting = patterns::recharge(self.ctx.chart(), period, room.id, payment.id, request.amount);
        post_double_entry(scope.store(), &posting).await?;

        let mut record = AuditRecord::new(actor, "recharge", &room.room_number).details(json!({
            "room_id": room.id,
            "payment_id": payment.id,
            "amount": payment.amount.to_string(),
            "pay_method": payment.pay_method,
            "balance_after": room.balance.to_string(),
        }));
        if let Some(trace) = request.trace_id {
            record = record.trace(trace);
        }
        scope.audit(record).await?;
        scope.commit().await?;

        tracing::info!(room = %room.room_number, amount = %payment.amount, "Recharge recorded");
        Ok(payment)
    }

    /// Pay some of one room's bills
    ///
    /// Paying from the balance fails as a whole when the balance does not
    /// cover the total.
    pub async fn pay_bills(&self, actor: &str, request: PayBillsRequest) -> LedgerResult<PaymentOutcome> {
        validate_actor(actor)?;
        if request.bills.is_empty() {
            return Err(LedgerError::Validation(
                "Select at least one bill to pay".to_string(),
            ));
        }

        let mut scope = self.ctx.begin().await?;
        let room = live_room(scope.store(), request.room_id).await?;

        let mut seen = HashSet::new();
        let mut settlements = Vec::with_capacity(request.bills.len());
        for item in &request.bills {
            if !seen.insert(item.bill_id) {
                return Err(LedgerError::Validation(format!(
                    "Bill {} is selected twice",
                    item.bill_id
                )));
            }
            let bill = scope
                .store()
                .get_bill(item.bill_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Bill", item.bill_id))?;
            if bill.room_id != room.id {
                return Err(LedgerError::Validation(format!(
                    "Bill {} does not belong to room {}",
                    bill.id, room.room_number
                )));
            }
            let amount = match &item.amount {
                Some(amount) => {
                    validate_money_amount(amount)?;
                    amount.clone()
                }
                None => owed(&bill),
            };
            settlements.push((bill, amount));
        }

        let outcome = settle(
            scope.store(),
            self.ctx.chart(),
            room,
            settlements,
            request.pay_method,
            BizType::BillPayment,
            actor,
            request.remark,
            request.trace_id.clone(),
        )
        .await?;

        let bill_ids: Vec<BillId> = outcome.bills.iter().map(|b| b.id).collect();
        let mut record = AuditRecord::new(actor, "pay_bills", request.room_id).details(json!({
            "payment_id": outcome.payment.id,
            "bills": bill_ids,
            "amount": outcome.payment.amount.to_string(),
            "pay_method": request.pay_method,
        }));
        if let Some(trace) = request.trace_id {
            record = record.trace(trace);
        }
        scope.audit(record).await?;
        scope.commit().await?;

        tracing::info!(
            room_id = request.room_id,
            amount = %outcome.payment.amount,
            bills = bill_ids.len(),
            "Bills paid"
        );
        Ok(outcome)
    }

    /// Settle every open bill of a period for each selected room
    pub async fn batch_pay(&self, actor: &str, request: BatchPayRequest) -> LedgerResult<BatchPaymentSummary> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut payments = Vec::new();
        let mut skipped_rooms = Vec::new();
        let mut total = BigDecimal::zero();

        let mut seen = HashSet::new();
        for room_id in request.room_ids.iter().copied() {
            if !seen.insert(room_id) {
                continue;
            }
            let room = live_room(scope.store(), room_id).await?;
            let filter = BillFilter::room(room_id).period(request.period).open();
            let settlements: Vec<(Bill, BigDecimal)> = scope
                .store()
                .list_bills(&filter)
                .await?
                .into_iter()
                .map(|bill| {
                    let amount = owed(&bill);
                    (bill, amount)
                })
                .filter(|(_, amount)| !is_settled(amount))
                .collect();
            if settlements.is_empty() {
                skipped_rooms.push(room_id);
                continue;
            }

            let outcome = settle(
                scope.store(),
                self.ctx.chart(),
                room,
                settlements,
                request.pay_method,
                BizType::BatchPayment,
                actor,
                Some(format!("Batch collection {}", request.period)),
                request.trace_id.clone(),
            )
            .await?;
            total += &outcome.payment.amount;
            payments.push(outcome);
        }

        let mut record = AuditRecord::new(actor, "batch_pay", request.period).details(json!({
            "rooms": payments.iter().map(|p| p.payment.room_id).collect::<Vec<_>>(),
            "payments": payments.iter().map(|p| p.payment.id).collect::<Vec<_>>(),
            "skipped": skipped_rooms,
            "total": total.to_string(),
            "pay_method": request.pay_method,
        }));
        if let Some(trace) = request.trace_id {
            record = record.trace(trace);
        }
        scope.audit(record).await?;
        scope.commit().await?;

        tracing::info!(period = %request.period, rooms = payments.len(), total = %total, "Batch payment recorded");
        Ok(BatchPaymentSummary {
            payments,
            skipped_rooms,
            total,
        })
    }

    pub async fn payments(&self, room_id: Option<RoomId>) -> LedgerResult<Vec<PaymentRecord>> {
        self.ctx.storage.list_payments(room_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::generation::{BillingService, GenerationMode, GenerationRequest};
    use crate::config::ErpConfig;
    use crate::ledger::{AccountManager, PeriodManager};
    use crate::property::types::NewRoom;
    use crate::property::PropertyRegistry;
    use crate::utils::MemoryStorage;
    use tempfile::TempDir;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn march() -> Period {
        Period::new(2026, 3).unwrap()
    }

    struct Fixture {
        ctx: ErpContext<MemoryStorage>,
        cashier: Cashier<MemoryStorage>,
        rooms: Vec<Room>,
        bills: Vec<Bill>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = ErpConfig::default();
        config.audit.worm_log_path = dir.path().join("worm.log").display().to_string();
        let ctx = ErpContext::new(MemoryStorage::new(), config);
        AccountManager::new(ctx.clone())
            .setup_standard_chart("admin")
            .await
            .unwrap();

        let registry = PropertyRegistry::new(ctx.clone());
        let property = registry
            .create_property("admin", "Harbour View", "HV", None)
            .await
            .unwrap();
        let mut rooms = Vec::new();
        for number in ["2-201", "2-202"] {
            let room = registry
                .add_room(
                    "admin",
                    NewRoom::new(property.id, number, dec("90")).fee_item("Property", dec("300")),
                )
                .await
                .unwrap();
            rooms.push(room);
        }
        let bills = BillingService::new(ctx.clone())
            .generate_bills_for_period(
                "admin",
                &GenerationRequest::new(march(), GenerationMode::AllFeeItems),
            )
            .await
            .unwrap()
            .bills;

        Fixture {
            cashier: Cashier::new(ctx.clone()),
            ctx,
            rooms,
            bills,
            _dir: dir,
        }
    }

    async fn account_entries(f: &Fixture, account_id: AccountId) -> Vec<LedgerEntry> {
        f.ctx
            .storage
            .list_ledger_entries(&LedgerEntryFilter::account(account_id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_recharge_then_pay_from_balance() {
        let f = fixture().await;
        let room = &f.rooms[0];

        let payment = f
            .cashier
            .recharge(
                "cashier",
                RechargeRequest::new(room.id, dec("500"), PayMethod::Cash).period(march()),
            )
            .await
            .unwrap();
        assert_eq!(payment.biz_type, BizType::Recharge);
        let cash = account_entries(&f, 1).await;
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].ref_payment_id, Some(payment.id));

        let outcome = f
            .cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room.id, vec![BillPayment::full(f.bills[0].id)], PayMethod::Balance),
            )
            .await
            .unwrap();
        assert_eq!(outcome.bills[0].status, BillStatus::Paid);
        assert_eq!(outcome.balance_after, dec("200"));

        let advance = account_entries(&f, 3).await;
        assert_eq!(advance.len(), 2);
        assert_eq!(advance[1].side, EntryType::Debit);
        assert_eq!(advance[1].ref_bill_id, Some(f.bills[0].id));
        assert_eq!(account_entries(&f, 2).await.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance_rolls_back() {
        let f = fixture().await;
        let room = &f.rooms[0];
        f.cashier
            .recharge(
                "cashier",
                RechargeRequest::new(room.id, dec("100"), PayMethod::WeChat).period(march()),
            )
            .await
            .unwrap();

        let err = f
            .cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room.id, vec![BillPayment::full(f.bills[0].id)], PayMethod::Balance),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

        let bill = f.ctx.storage.get_bill(f.bills[0].id).await.unwrap().unwrap();
        assert_eq!(bill.status, BillStatus::Unpaid);
        assert_eq!(f.cashier.payments(Some(room.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_direct_payment_and_paid_bill_rejection() {
        let f = fixture().await;
        let room = &f.rooms[0];
        let bill_id = f.bills[0].id;

        let outcome = f
            .cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room.id, vec![BillPayment::partial(bill_id, dec("120"))], PayMethod::Cash),
            )
            .await
            .unwrap();
        assert_eq!(outcome.bills[0].status, BillStatus::PartiallyPaid);
        let cash = account_entries(&f, 1).await;
        assert_eq!(cash[0].side, EntryType::Debit);
        assert!(account_entries(&f, 3).await.is_empty());

        let over = f
            .cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room.id, vec![BillPayment::partial(bill_id, dec("180.01"))], PayMethod::Cash),
            )
            .await;
        assert!(matches!(over, Err(LedgerError::Validation(_))));

        f.cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room.id, vec![BillPayment::full(bill_id)], PayMethod::Cash),
            )
            .await
            .unwrap();
        let again = f
            .cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room.id, vec![BillPayment::full(bill_id)], PayMethod::Cash),
            )
            .await;
        assert!(matches!(again, Err(LedgerError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_payment_into_closed_period_fails() {
        let f = fixture().await;
        PeriodManager::new(f.ctx.clone())
            .close_period("admin", march(), None)
            .await
            .unwrap();

        let err = f
            .cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(f.rooms[0].id, vec![BillPayment::full(f.bills[0].id)], PayMethod::Cash),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PeriodClosed(_)));
        assert!(f.cashier.payments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_pay_skips_settled_rooms() {
        let f = fixture().await;
        f.cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(f.rooms[1].id, vec![BillPayment::full(f.bills[1].id)], PayMethod::Cash),
            )
            .await
            .unwrap();

        let summary = f
            .cashier
            .batch_pay(
                "cashier",
                BatchPayRequest {
                    period: march(),
                    room_ids: vec![f.rooms[0].id, f.rooms[1].id],
                    pay_method: PayMethod::BankTransfer,
                    trace_id: Some("batch-7".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(summary.payments.len(), 1);
        assert_eq!(summary.skipped_rooms, vec![f.rooms[1].id]);
        assert_eq!(summary.total, dec("300"));
        assert_eq!(summary.payments[0].payment.biz_type, BizType::BatchPayment);

        let audits = f
            .ctx
            .storage
            .list_audit_entries(&crate::audit::AuditFilter::action("batch_pay"))
            .await
            .unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].trace_id, "batch-7");
    }

    #[tokio::test]
    async fn test_sub_cent_amounts_are_rejected() {
        let f = fixture().await;
        let room = &f.rooms[0];

        let err = f
            .cashier
            .recharge(
                "cashier",
                RechargeRequest::new(room.id, dec("0.001"), PayMethod::Cash).period(march()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let partial = f
            .cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room.id, vec![BillPayment::partial(f.bills[0].id, dec("10.005"))], PayMethod::Cash),
            )
            .await;
        assert!(matches!(partial, Err(LedgerError::Validation(_))));

        let stored = f.ctx.storage.get_room(room.id).await.unwrap().unwrap();
        assert!(stored.balance.is_zero());
        assert!(f.cashier.payments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reused_trace_id_is_rejected() {
        let f = fixture().await;
        let room = &f.rooms[0];
        let mut request = RechargeRequest::new(room.id, dec("80"), PayMethod::Cash).period(march());
        request.trace_id = Some("till-42".to_string());

        f.cashier.recharge("cashier", request.clone()).await.unwrap();
        let err = f.cashier.recharge("cashier", request).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(f.cashier.payments(Some(room.id)).await.unwrap().len(), 1);
        let stored = f.ctx.storage.get_room(room.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec("80"));

        let audit = crate::audit::AuditService::new(f.ctx.clone());
        let report = audit.verify_log().await.unwrap();
        assert!(report.is_intact());
        assert!(report.orphaned.is_empty());
    }
}
