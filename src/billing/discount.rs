//! Discount requests and their approval

use bigdecimal::BigDecimal;
use serde_json::json;

use super::settlement::{apply_discount, owed};
use super::types::*;
use crate::audit::AuditRecord;
use crate::ledger::{patterns, post_double_entry};
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::*;

/// Requests wait for a second person to approve them; approval posts the
/// discount and writes an adjustment entry.
pub struct DiscountDesk<S: TransactionalStorage> {
    ctx: ErpContext<S>,
}

impl<S: TransactionalStorage> DiscountDesk<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self { ctx }
    }

    pub async fn request_discount(
        &self,
        actor: &str,
        bill_id: BillId,
        amount: BigDecimal,
        reason: Option<&str>,
    ) -> LedgerResult<DiscountRequest> {
        validate_actor(actor)?;
        validate_money_amount(&amount)?;

        let mut scope = self.ctx.begin().await?;
        let bill = scope
            .store()
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bill", bill_id))?;
        if !bill.status.is_open() {
            return Err(LedgerError::InvalidState(format!(
                "Bill {} is {:?} and cannot be discounted",
                bill.id, bill.status
            )));
        }
        let owed = owed(&bill);
        if amount > owed {
            return Err(LedgerError::Validation(format!(
                "Discount {amount} exceeds the {owed} owed on bill {bill_id}"
            )));
        }

        let request = scope
            .store()
            .insert_discount_request(DiscountRequest {
                id: 0,
                bill_id,
                requested_by: actor.to_string(),
                amount,
                reason: reason.map(str::to_string),
                status: DiscountStatus::Pending,
                created_at: chrono::Utc::now().naive_utc(),
                decided_by: None,
                decided_at: None,
                remark: None,
            })
            .await?;
        scope
            .audit(
                AuditRecord::new(actor, "request_discount", bill_id).details(json!({
                    "request_id": request.id,
                    "amount": request.amount.to_string(),
                    "reason": request.reason,
                })),
            )
            .await?;
        scope.commit().await?;

        tracing::info!(bill_id, request_id = request.id, "Discount requested");
        Ok(request)
    }

    async fn pending<T: ErpStorage + ?Sized>(
        store: &T,
        request_id: DiscountRequestId,
    ) -> LedgerResult<DiscountRequest> {
        let request = store
            .get_discount_request(request_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("DiscountRequest", request_id))?;
        if request.status != DiscountStatus::Pending {
            return Err(LedgerError::InvalidState(format!(
                "Discount request {request_id} is already {:?}",
                request.status
            )));
        }
        Ok(request)
    }

    /// Approve a pending request and apply it to its bill
    pub async fn approve(
        &self,
        actor: &str,
        request_id: DiscountRequestId,
        remark: Option<&str>,
    ) -> LedgerResult<DiscountRequest> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut request = Self::pending(scope.store(), request_id).await?;
        let mut bill = scope
            .store()
            .get_bill(request.bill_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bill", request.bill_id))?;

        apply_discount(&mut bill, &request.amount)?;
        let posting = patterns::discount(self.ctx.chart(), &bill, request.amount.clone());
        post_double_entry(scope.store(), &posting).await?;
        scope.store().update_bill(&bill).await?;

        let now = chrono::Utc::now().naive_utc();
        let adjustment = scope
            .store()
            .insert_adjustment(AdjustmentEntry {
                id: 0,
                bill_id: bill.id,
                amount: request.amount.clone(),
                reason: request.reason.clone(),
                approved_by: actor.to_string(),
                approved_at: now,
            })
            .await?;

        request.status = DiscountStatus::Approved;
        request.decided_by = Some(actor.to_string());
        request.decided_at = Some(now);
        request.remark = remark.map(str::to_string);
        scope.store().update_discount_request(&request).await?;

        scope
            .audit(
                AuditRecord::new(actor, "approve_discount", bill.id).details(json!({
                    "request_id": request.id,
                    "adjustment_id": adjustment.id,
                    "amount": request.amount.to_string(),
                    "bill_status": bill.status,
                })),
            )
            .await?;
        scope.commit().await?;

        tracing::info!(bill_id = bill.id, amount = %request.amount, "Discount approved");
        Ok(request)
    }

    pub async fn reject(
        &self,
        actor: &str,
        request_id: DiscountRequestId,
        remark: Option<&str>,
    ) -> LedgerResult<DiscountRequest> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let mut request = Self::pending(scope.store(), request_id).await?;
        request.status = DiscountStatus::Rejected;
        request.decided_by = Some(actor.to_string());
        request.decided_at = Some(chrono::Utc::now().naive_utc());
        request.remark = remark.map(str::to_string);
        scope.store().update_discount_request(&request).await?;

        scope
            .audit(
                AuditRecord::new(actor, "reject_discount", request.bill_id).details(json!({
                    "request_id": request.id,
                    "remark": request.remark,
                })),
            )
            .await?;
        scope.commit().await?;
        Ok(request)
    }

    pub async fn list(&self, status: Option<DiscountStatus>) -> LedgerResult<Vec<DiscountRequest>> {
        self.ctx.storage.list_discount_requests(status).await
    }

    pub async fn adjustments(&self, bill_id: Option<BillId>) -> LedgerResult<Vec<AdjustmentEntry>> {
        self.ctx.storage.list_adjustments(bill_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditFilter;
    use crate::config::ErpConfig;
    use crate::ledger::AccountManager;
    use crate::utils::MemoryStorage;
    use tempfile::TempDir;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    async fn setup() -> (ErpContext<MemoryStorage>, Bill, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = ErpConfig::default();
        config.audit.worm_log_path = dir.path().join("worm.log").display().to_string();
        let mut ctx = ErpContext::new(MemoryStorage::new(), config);
        AccountManager::new(ctx.clone())
            .setup_standard_chart("admin")
            .await
            .unwrap();

        let period = Period::new(2026, 4).unwrap();
        let bill = ctx
            .storage
            .insert_bill(Bill::new(1, "Property", period, dec("200"), "admin"))
            .await
            .unwrap();
        (ctx, bill, dir)
    }

    #[tokio::test]
    async fn test_approve_applies_discount_and_posts() {
        let (ctx, bill, _dir) = setup().await;
        let desk = DiscountDesk::new(ctx.clone());

        let request = desk
            .request_discount("clerk", bill.id, dec("50"), Some("Water leak"))
            .await
            .unwrap();
        assert_eq!(request.status, DiscountStatus::Pending);

        let approved = desk.approve("manager", request.id, None).await.unwrap();
        assert_eq!(approved.status, DiscountStatus::Approved);
        assert_eq!(approved.decided_by.as_deref(), Some("manager"));

        let stored = ctx.storage.get_bill(bill.id).await.unwrap().unwrap();
        assert_eq!(stored.discount, dec("50"));
        assert_eq!(stored.status, BillStatus::Unpaid);

        let discounts = ctx
            .storage
            .list_ledger_entries(&LedgerEntryFilter::account(4))
            .await
            .unwrap();
        assert_eq!(discounts.len(), 1);
        assert_eq!(discounts[0].side, EntryType::Debit);
        assert_eq!(desk.adjustments(Some(bill.id)).await.unwrap().len(), 1);

        let again = desk.approve("manager", request.id, None).await;
        assert!(matches!(again, Err(LedgerError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_reject_leaves_bill_untouched() {
        let (ctx, bill, _dir) = setup().await;
        let desk = DiscountDesk::new(ctx.clone());

        let request = desk
            .request_discount("clerk", bill.id, dec("20"), None)
            .await
            .unwrap();
        let rejected = desk
            .reject("manager", request.id, Some("No grounds"))
            .await
            .unwrap();
        assert_eq!(rejected.status, DiscountStatus::Rejected);

        let stored = ctx.storage.get_bill(bill.id).await.unwrap().unwrap();
        assert_eq!(stored.discount, dec("0"));
        assert!(desk.list(Some(DiscountStatus::Pending)).await.unwrap().is_empty());

        let audits = ctx
            .storage
            .list_audit_entries(&AuditFilter::action("reject_discount"))
            .await
            .unwrap();
        assert_eq!(audits.len(), 1);
    }

    #[tokio::test]
    async fn test_discount_beyond_owed_is_rejected() {
        let (ctx, bill, _dir) = setup().await;
        let desk = DiscountDesk::new(ctx.clone());

        let oversized = desk.request_discount("clerk", bill.id, dec("250"), None).await;
        assert!(matches!(oversized, Err(LedgerError::Validation(_))));

        let first = desk
            .request_discount("clerk", bill.id, dec("150"), None)
            .await
            .unwrap();
        let second = desk
            .request_discount("clerk", bill.id, dec("150"), None)
            .await
            .unwrap();
        desk.approve("manager", first.id, None).await.unwrap();

        let err = desk.approve("manager", second.id, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let still = desk.list(Some(DiscountStatus::Pending)).await.unwrap();
        assert_eq!(still.len(), 1);
        assert_eq!(desk.adjustments(None).await.unwrap().len(), 1);
    }
}
