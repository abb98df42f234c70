//! Reconciliation views for financial staff
//!
//! The workbench summarises a period's collection per room and fee type, the
//! three-way check ties prepaid room balances to the ledger, and the
//! financial check lists anomalies worth a second look.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::billing::settlement::owed;
use crate::billing::types::*;
use crate::ledger::Ledger;
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;
use crate::utils::money::{is_settled, to_money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionStatus {
    Settled,
    Partial,
    Unpaid,
}

impl CollectionStatus {
    fn classify(arrears: &BigDecimal, paid: &BigDecimal) -> Self {
        if is_settled(&arrears.abs()) {
            CollectionStatus::Settled
        } else if *paid > BigDecimal::zero() {
            CollectionStatus::Partial
        } else {
            CollectionStatus::Unpaid
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbenchRow {
    pub room_id: RoomId,
    pub room_number: String,
    pub fee_type: String,
    pub amount_due: BigDecimal,
    pub amount_paid: BigDecimal,
    pub discount: BigDecimal,
    pub arrears: BigDecimal,
    pub status: CollectionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workbench {
    pub period: Period,
    pub fee_type: Option<String>,
    pub rows: Vec<WorkbenchRow>,
    pub total_due: BigDecimal,
    pub total_paid: BigDecimal,
    pub total_discount: BigDecimal,
    pub total_arrears: BigDecimal,
    /// Paid as a percentage of due, two decimals
    pub collection_rate: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodTotal {
    pub pay_method: PayMethod,
    pub count: usize,
    pub total: BigDecimal,
}

/// Room balances against the advance receipts ledger account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeWayReport {
    pub room_balance_total: BigDecimal,
    pub ledger_advance_balance: BigDecimal,
    pub difference: BigDecimal,
    pub matched: bool,
    pub outstanding_arrears: BigDecimal,
    pub payments_by_method: Vec<MethodTotal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckLevel {
    Pass,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckItem {
    pub name: String,
    pub level: CheckLevel,
    pub findings: Vec<String>,
}

impl CheckItem {
    fn from_findings(name: &str, findings: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            level: if findings.is_empty() {
                CheckLevel::Pass
            } else {
                CheckLevel::Warn
            },
            findings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialCheck {
    pub items: Vec<CheckItem>,
}

impl FinancialCheck {
    pub fn all_passed(&self) -> bool {
        self.items.iter().all(|item| item.level == CheckLevel::Pass)
    }

    pub fn item(&self, name: &str) -> Option<&CheckItem> {
        self.items.iter().find(|item| item.name == name)
    }
}

pub struct Reconciler<S: TransactionalStorage> {
    ctx: ErpContext<S>,
    ledger: Ledger<S>,
}

impl<S: TransactionalStorage> Reconciler<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self {
            ledger: Ledger::new(ctx.clone()),
            ctx,
        }
    }

    async fn room_numbers(&self) -> LedgerResult<BTreeMap<RoomId, String>> {
        Ok(self
            .ctx
            .storage
            .list_rooms(None)
            .await?
            .into_iter()
            .map(|room| (room.id, room.room_number))
            .collect())
    }

    /// Collection summary per room and fee type; voided bills are left out
    pub async fn workbench(&self, period: Period, fee_type: Option<&str>) -> LedgerResult<Workbench> {
        let mut filter = BillFilter {
            period: Some(period),
            ..BillFilter::default()
        };
        if let Some(fee_type) = fee_type {
            filter = filter.fee_type(fee_type.trim());
        }
        let bills = self.ctx.storage.list_bills(&filter).await?;
        let numbers = self.room_numbers().await?;

        let mut groups: BTreeMap<(RoomId, String), [BigDecimal; 3]> = BTreeMap::new();
        for bill in bills.iter().filter(|b| b.status != BillStatus::Void) {
            let slot = groups
                .entry((bill.room_id, bill.fee_type.trim().to_string()))
                .or_default();
            slot[0] += &bill.amount_due;
            slot[1] += &bill.amount_paid;
            slot[2] += &bill.discount;
        }

        let mut rows = Vec::with_capacity(groups.len());
        let (mut total_due, mut total_paid, mut total_discount, mut total_arrears) = (
            BigDecimal::zero(),
            BigDecimal::zero(),
            BigDecimal::zero(),
            BigDecimal::zero(),
        );
        for ((room_id, fee_type), [due, paid, discount]) in groups {
            let arrears = &due - &paid - &discount;
            total_due += &due;
            total_paid += &paid;
            total_discount += &discount;
            total_arrears += &arrears;
            rows.push(WorkbenchRow {
                room_id,
                room_number: numbers.get(&room_id).cloned().unwrap_or_default(),
                fee_type,
                status: CollectionStatus::classify(&arrears, &paid),
                amount_due: due,
                amount_paid: paid,
                discount,
                arrears,
            });
        }

        let collection_rate = if total_due.is_zero() {
            BigDecimal::zero()
        } else {
            to_money(&(&total_paid / &total_due * BigDecimal::from(100)))
        };

        Ok(Workbench {
            period,
            fee_type: fee_type.map(|f| f.trim().to_string()),
            rows,
            total_due,
            total_paid,
            total_discount,
            total_arrears,
            collection_rate,
        })
    }

    /// Tie the prepaid balances of all rooms to the advance receipts account
    pub async fn three_way(&self) -> LedgerResult<ThreeWayReport> {
        let room_balance_total: BigDecimal = self
            .ctx
            .storage
            .list_rooms(None)
            .await?
            .iter()
            .map(|room| &room.balance)
            .sum();
        let ledger_advance_balance = self
            .ledger
            .account_balance(self.ctx.chart().advance_receipts, None)
            .await?;
        let difference = &room_balance_total - &ledger_advance_balance;
        let matched = is_settled(&difference.abs());

        let outstanding_arrears: BigDecimal = self
            .ctx
            .storage
            .list_bills(&BillFilter::default().open())
            .await?
            .iter()
            .map(owed)
            .sum();

        let mut by_method: BTreeMap<String, MethodTotal> = BTreeMap::new();
        for payment in self.ctx.storage.list_payments(None).await? {
            let slot = by_method
                .entry(format!("{:?}", payment.pay_method))
                .or_insert_with(|| MethodTotal {
                    pay_method: payment.pay_method,
                    count: 0,
                    total: BigDecimal::zero(),
                });
            slot.count += 1;
            slot.total += &payment.amount;
        }

        if !matched {
            tracing::warn!(
                rooms = %room_balance_total,
                ledger = %ledger_advance_balance,
                "Room balances do not match advance receipts"
            );
        }

        Ok(ThreeWayReport {
            room_balance_total,
            ledger_advance_balance,
            difference,
            matched,
            outstanding_arrears,
            payments_by_method: by_method.into_values().collect(),
        })
    }

    /// Negative balances, overpaid bills and unbalanced ledger periods
    pub async fn financial_check(&self) -> LedgerResult<FinancialCheck> {
        let negative_balances = self
            .ctx
            .storage
            .list_rooms(None)
            .await?
            .into_iter()
            .filter(|room| !room.is_deleted && room.balance < BigDecimal::zero())
            .map(|room| format!("Room {} has balance {}", room.room_number, room.balance))
            .collect();

        let overpaid_bills = self
            .ctx
            .storage
            .list_bills(&BillFilter::default())
            .await?
            .into_iter()
            .filter(|bill| bill.amount_paid > bill.amount_due)
            .map(|bill| {
                format!(
                    "Bill {} paid {} against {} due",
                    bill.id, bill.amount_paid, bill.amount_due
                )
            })
            .collect();

        let integrity = self.ledger.validate_integrity().await?;
        let unbalanced_periods = integrity
            .unbalanced_periods
            .iter()
            .map(|period| format!("Period {period} does not balance"))
            .collect();

        Ok(FinancialCheck {
            items: vec![
                CheckItem::from_findings("negative_balances", negative_balances),
                CheckItem::from_findings("overpaid_bills", overpaid_bills),
                CheckItem::from_findings("unbalanced_periods", unbalanced_periods),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{
        BillPayment, BillingService, Cashier, GenerationMode, GenerationRequest, PayBillsRequest,
        RechargeRequest,
    };
    use crate::config::ErpConfig;
    use crate::ledger::AccountManager;
    use crate::property::types::NewRoom;
    use crate::property::PropertyRegistry;
    use crate::utils::MemoryStorage;
    use tempfile::TempDir;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn may() -> Period {
        Period::new(2026, 5).unwrap()
    }

    async fn setup() -> (ErpContext<MemoryStorage>, Vec<Bill>, TempDir) {
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
            .create_property("admin", "Maple Court", "MC", None)
            .await
            .unwrap();
        for number in ["A-1", "A-2"] {
            registry
                .add_room(
                    "admin",
                    NewRoom::new(property.id, number, dec("80"))
                        .fee_item("Property", dec("200"))
                        .fee_item("Elevator", dec("50")),
                )
                .await
                .unwrap();
        }
        let bills = BillingService::new(ctx.clone())
            .generate_bills_for_period(
                "admin",
                &GenerationRequest::new(may(), GenerationMode::AllFeeItems),
            )
            .await
            .unwrap()
            .bills;
        (ctx, bills, dir)
    }

    #[tokio::test]
    async fn test_workbench_rows_and_rate() {
        let (ctx, bills, _dir) = setup().await;
        let property_bill = bills.iter().find(|b| b.fee_type == "Property").unwrap();
        Cashier::new(ctx.clone())
            .pay_bills(
                "cashier",
                PayBillsRequest::new(
                    property_bill.room_id,
                    vec![BillPayment::full(property_bill.id)],
                    PayMethod::Cash,
                ),
            )
            .await
            .unwrap();

        let reconciler = Reconciler::new(ctx);
        let bench = reconciler.workbench(may(), None).await.unwrap();
        assert_eq!(bench.rows.len(), 4);
        assert_eq!(bench.total_due, dec("500"));
        assert_eq!(bench.total_paid, dec("200"));
        assert_eq!(bench.collection_rate, dec("40.00"));
        let settled = bench
            .rows
            .iter()
            .filter(|r| r.status == CollectionStatus::Settled)
            .count();
        assert_eq!(settled, 1);

        let elevator = reconciler.workbench(may(), Some("Elevator")).await.unwrap();
        assert_eq!(elevator.rows.len(), 2);
        assert!(elevator.total_paid.is_zero());
        assert!(elevator.collection_rate.is_zero());
    }

    #[tokio::test]
    async fn test_three_way_matches_after_recharge_and_balance_payment() {
        let (ctx, bills, _dir) = setup().await;
        let cashier = Cashier::new(ctx.clone());
        let room_id = bills[0].room_id;
        cashier
            .recharge(
                "cashier",
                RechargeRequest::new(room_id, dec("400"), PayMethod::Alipay).period(may()),
            )
            .await
            .unwrap();
        cashier
            .pay_bills(
                "cashier",
                PayBillsRequest::new(room_id, vec![BillPayment::full(bills[0].id)], PayMethod::Balance),
            )
            .await
            .unwrap();

        let report = Reconciler::new(ctx).three_way().await.unwrap();
        assert!(report.matched);
        assert_eq!(report.room_balance_total, report.ledger_advance_balance);
        assert_eq!(report.outstanding_arrears, dec("500") - &bills[0].amount_due);
        assert_eq!(report.payments_by_method.len(), 2);
    }

    #[tokio::test]
    async fn test_three_way_flags_unposted_balance() {
        let (mut ctx, bills, _dir) = setup().await;
        let mut room = ctx.storage.get_room(bills[0].room_id).await.unwrap().unwrap();
        room.balance = dec("10");
        ctx.storage.update_room(&room).await.unwrap();

        let reconciler = Reconciler::new(ctx);
        let report = reconciler.three_way().await.unwrap();
        assert!(!report.matched);
        assert_eq!(report.difference, dec("10"));

        let check = reconciler.financial_check().await.unwrap();
        assert!(check.all_passed());
    }

    #[tokio::test]
    async fn test_financial_check_warns_on_negative_balance_and_overpayment() {
        let (mut ctx, bills, _dir) = setup().await;
        let mut room = ctx.storage.get_room(bills[0].room_id).await.unwrap().unwrap();
        room.balance = dec("-5");
        ctx.storage.update_room(&room).await.unwrap();
        let mut bill = bills[1].clone();
        bill.amount_paid = &bill.amount_due + dec("1");
        ctx.storage.update_bill(&bill).await.unwrap();

        let check = Reconciler::new(ctx).financial_check().await.unwrap();
        assert!(!check.all_passed());
        assert_eq!(
            check.item("negative_balances").unwrap().level,
            CheckLevel::Warn
        );
        assert_eq!(check.item("overpaid_bills").unwrap().findings.len(), 1);
        assert_eq!(
            check.item("unbalanced_periods").unwrap().level,
            CheckLevel::Pass
        );
    }
}
