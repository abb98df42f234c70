//! Ledger facade: accounts, period locks, postings and reports

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::audit::AuditRecord;
use crate::ledger::{
    post_double_entry, post_single, AccountManager, PeriodManager, Posting, PostingRequest,
    SinglePosting,
};
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;

/// Main ledger system that orchestrates all accounting operations
pub struct Ledger<S: TransactionalStorage> {
    ctx: ErpContext<S>,
    account_manager: AccountManager<S>,
    period_manager: PeriodManager<S>,
}

impl<S: TransactionalStorage> Ledger<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self {
            account_manager: AccountManager::new(ctx.clone()),
            period_manager: PeriodManager::new(ctx.clone()),
            ctx,
        }
    }

    /// Create a ledger with a custom account validator
    pub fn with_validator(ctx: ErpContext<S>, validator: Box<dyn AccountValidator>) -> Self {
        Self {
            account_manager: AccountManager::with_validator(ctx.clone(), validator),
            period_manager: PeriodManager::new(ctx.clone()),
            ctx,
        }
    }

    pub fn accounts(&self) -> &AccountManager<S> {
        &self.account_manager
    }

    pub fn periods(&self) -> &PeriodManager<S> {
        &self.period_manager
    }

    /// Post a manual double entry in its own transaction
    pub async fn post(&self, actor: &str, request: &PostingRequest) -> LedgerResult<Posting> {
        let mut scope = self.ctx.begin().await?;
        let posting = post_double_entry(scope.store(), request).await?;
        scope
            .audit(
                AuditRecord::new(actor, "post_entry", request.period).details(serde_json::json!({
                    "debit": request.debit_account,
                    "credit": request.credit_account,
                    "amount": request.amount.to_string(),
                    "entries": [posting.debit.id, posting.credit.id],
                })),
            )
            .await?;
        scope.commit().await?;
        Ok(posting)
    }

    /// Post a single-sided correction in its own transaction
    pub async fn post_single(&self, actor: &str, posting: &SinglePosting) -> LedgerResult<LedgerEntry> {
        let mut scope = self.ctx.begin().await?;
        let entry = post_single(scope.store(), posting).await?;
        scope
            .audit(
                AuditRecord::new(actor, "post_single", posting.period).details(serde_json::json!({
                    "account": entry.account_id,
                    "direction": entry.direction(),
                    "amount": entry.amount.to_string(),
                })),
            )
            .await?;
        scope.commit().await?;
        Ok(entry)
    }

    pub async fn entries(&self, filter: &LedgerEntryFilter) -> LedgerResult<Vec<LedgerEntry>> {
        self.ctx.storage.list_ledger_entries(filter).await
    }

    /// Balance of an account on its normal side, optionally for one period
    pub async fn account_balance(
        &self,
        account_id: AccountId,
        period: Option<Period>,
    ) -> LedgerResult<BigDecimal> {
        let account = self.account_manager.get_account_required(account_id).await?;
        let mut filter = LedgerEntryFilter::account(account_id);
        filter.period = period;

        let net: BigDecimal = self
            .ctx
            .storage
            .list_ledger_entries(&filter)
            .await?
            .iter()
            .map(LedgerEntry::signed_amount)
            .sum();

        Ok(match account.nature.normal_balance() {
            EntryType::Debit => net,
            EntryType::Credit => -net,
        })
    }

    /// Debit and credit totals per account
    pub async fn trial_balance(&self, period: Option<Period>) -> LedgerResult<TrialBalance> {
        let mut filter = LedgerEntryFilter::default();
        filter.period = period;
        let entries = self.ctx.storage.list_ledger_entries(&filter).await?;

        let mut totals: BTreeMap<AccountId, (BigDecimal, BigDecimal)> = BTreeMap::new();
        for entry in &entries {
            let slot = totals.entry(entry.account_id).or_default();
            match entry.side {
                EntryType::Debit => slot.0 += &entry.amount,
                EntryType::Credit => slot.1 += &entry.amount,
            }
        }

        let mut lines = Vec::new();
        let mut total_debits = BigDecimal::zero();
        let mut total_credits = BigDecimal::zero();
        for account in self.ctx.storage.list_accounts().await? {
            let (debit_total, credit_total) = totals.remove(&account.id).unwrap_or_default();
            if debit_total.is_zero() && credit_total.is_zero() {
                continue;
            }
            total_debits += &debit_total;
            total_credits += &credit_total;
            let balance = match account.nature.normal_balance() {
                EntryType::Debit => &debit_total - &credit_total,
                EntryType::Credit => &credit_total - &debit_total,
            };
            lines.push(TrialBalanceLine {
                account,
                debit_total,
                credit_total,
                balance,
            });
        }

        Ok(TrialBalance {
            period,
            is_balanced: total_debits == total_credits,
            lines,
            total_debits,
            total_credits,
        })
    }

    /// Check that every period and every bill/payment correlation balances
    pub async fn validate_integrity(&self) -> LedgerResult<LedgerIntegrityReport> {
        let entries = self
            .ctx
            .storage
            .list_ledger_entries(&LedgerEntryFilter::default())
            .await?;

        let mut by_period: BTreeMap<Period, BigDecimal> = BTreeMap::new();
        let mut by_correlation: BTreeMap<CorrelationKey, BigDecimal> = BTreeMap::new();
        for entry in &entries {
            *by_period.entry(entry.period).or_default() += entry.signed_amount();
            if entry.ref_bill_id.is_some() || entry.ref_payment_id.is_some() {
                let key = (entry.period, entry.room_id, entry.ref_bill_id, entry.ref_payment_id);
                *by_correlation.entry(key).or_default() += entry.signed_amount();
            }
        }

        let mut issues = Vec::new();
        let mut unbalanced_periods = Vec::new();
        for (period, net) in &by_period {
            if !net.is_zero() {
                issues.push(format!("Period {period} is out of balance by {net}"));
                unbalanced_periods.push(*period);
            }
        }
        for ((period, room, bill, payment), net) in &by_correlation {
            if !net.is_zero() {
                issues.push(format!(
                    "Postings for room {room:?}, bill {bill:?}, payment {payment:?} in {period} are out of balance by {net}"
                ));
            }
        }

        Ok(LedgerIntegrityReport {
            is_valid: issues.is_empty(),
            issues,
            entry_count: entries.len(),
            unbalanced_periods,
        })
    }
}

type CorrelationKey = (Period, Option<RoomId>, Option<BillId>, Option<PaymentId>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account: Account,
    pub debit_total: BigDecimal,
    pub credit_total: BigDecimal,
    /// Net on the account's normal side
    pub balance: BigDecimal,
}

/// Trial balance over all periods, or one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub period: Option<Period>,
    pub lines: Vec<TrialBalanceLine>,
    pub total_debits: BigDecimal,
    pub total_credits: BigDecimal,
    pub is_balanced: bool,
}

impl TrialBalance {
    pub fn line(&self, account_id: AccountId) -> Option<&TrialBalanceLine> {
        self.lines.iter().find(|line| line.account.id == account_id)
    }
}

/// Report on ledger integrity and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub entry_count: usize,
    pub unbalanced_periods: Vec<Period>,
}
