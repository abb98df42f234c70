//! Invoicing of paid bills

use bigdecimal::{BigDecimal, Zero};
use serde_json::json;
use std::collections::HashSet;

use super::types::*;
use crate::audit::AuditRecord;
use crate::config::{BillingConfig, ChartConfig};
use crate::ledger::{patterns, post_double_entry};
use crate::scope::ErpContext;
use crate::tax::{TaxRate, TaxSplit};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::*;

#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub bill_id: BillId,
    pub title: String,
    /// Falls back to the fee type's rate
    pub tax_rate: Option<BigDecimal>,
    /// Generated when absent
    pub invoice_no: Option<String>,
    /// Period the tax reclassification is posted in; defaults to the current month
    pub period: Option<Period>,
}

impl InvoiceRequest {
    pub fn new(bill_id: BillId, title: impl Into<String>) -> Self {
        Self {
            bill_id,
            title: title.into(),
            tax_rate: None,
            invoice_no: None,
            period: None,
        }
    }

    pub fn tax_rate(mut self, rate: BigDecimal) -> Self {
        self.tax_rate = Some(rate);
        self
    }

    pub fn number(mut self, invoice_no: impl Into<String>) -> Self {
        self.invoice_no = Some(invoice_no.into());
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }
}

/// `INV-` followed by eight upper-case hex digits
pub fn generate_invoice_no() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("INV-{}", id[..8].to_uppercase())
}

async fn issue<T: ErpStorage + ?Sized>(
    store: &mut T,
    chart: &ChartConfig,
    billing: &BillingConfig,
    request: &InvoiceRequest,
) -> LedgerResult<Invoice> {
    validate_name(&request.title, "Invoice title")?;

    let bill = store
        .get_bill(request.bill_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Bill", request.bill_id))?;
    if bill.status != BillStatus::Paid {
        return Err(LedgerError::InvalidState(format!(
            "Bill {} is {:?}; only paid bills can be invoiced",
            bill.id, bill.status
        )));
    }
    if let Some(existing) = store.find_invoice_for_bill(bill.id).await? {
        return Err(LedgerError::InvalidState(format!(
            "Bill {} is already invoiced as {}",
            bill.id, existing.invoice_no
        )));
    }

    let invoice_no = match &request.invoice_no {
        Some(no) => {
            validate_name(no, "Invoice number")?;
            no.trim().to_string()
        }
        None => generate_invoice_no(),
    };
    if store.find_invoice_by_number(&invoice_no).await?.is_some() {
        return Err(LedgerError::Validation(format!(
            "Invoice number {invoice_no} is already used"
        )));
    }

    let rate = match &request.tax_rate {
        Some(rate) => rate.clone(),
        None => store
            .get_fee_type(bill.fee_type.trim())
            .await?
            .map(|fee_type| fee_type.tax_rate)
            .unwrap_or_else(BigDecimal::zero),
    };
    let rate = TaxRate::new(rate, &billing.max_tax_rate())?;
    let split = TaxSplit::from_inclusive(bill.amount_paid.clone(), &rate)?;

    let invoice = store
        .insert_invoice(Invoice {
            id: 0,
            bill_id: bill.id,
            invoice_no,
            title: request.title.trim().to_string(),
            tax_rate: split.rate,
            amount_excl_tax: split.amount_excl_tax,
            tax_amount: split.tax_amount.clone(),
            amount_incl_tax: split.amount_incl_tax,
            created_at: chrono::Utc::now().naive_utc(),
        })
        .await?;

    if split.tax_amount > BigDecimal::zero() {
        let period = request.period.unwrap_or_else(Period::current);
        let posting = patterns::tax_reclass(chart, period, &bill, split.tax_amount);
        post_double_entry(store, &posting).await?;
    }

    Ok(invoice)
}

pub struct InvoiceDesk<S: TransactionalStorage> {
    ctx: ErpContext<S>,
}

impl<S: TransactionalStorage> InvoiceDesk<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self { ctx }
    }

    /// Invoice one paid bill
    pub async fn issue_invoice(&self, actor: &str, request: InvoiceRequest) -> LedgerResult<Invoice> {
        validate_actor(actor)?;

        let mut scope = self.ctx.begin().await?;
        let invoice = issue(
            scope.store(),
            self.ctx.chart(),
            &self.ctx.config.billing,
            &request,
        )
        .await?;
        scope
            .audit(
                AuditRecord::new(actor, "issue_invoice", &invoice.invoice_no).details(json!({
                    "bill_id": invoice.bill_id,
                    "tax_rate": invoice.tax_rate.to_string(),
                    "amount_incl_tax": invoice.amount_incl_tax.to_string(),
                    "tax_amount": invoice.tax_amount.to_string(),
                })),
            )
            .await?;
        scope.commit().await?;

        tracing::info!(invoice_no = %invoice.invoice_no, bill_id = invoice.bill_id, "Invoice issued");
        Ok(invoice)
    }

    /// Invoice several bills at once; any failure cancels the whole batch
    pub async fn issue_batch(&self, actor: &str, requests: Vec<InvoiceRequest>) -> LedgerResult<Vec<Invoice>> {
        validate_actor(actor)?;
        let mut bills = HashSet::new();
        for request in &requests {
            if !bills.insert(request.bill_id) {
                return Err(LedgerError::Validation(format!(
                    "Bill {} appears twice in the batch",
                    request.bill_id
                )));
            }
        }

        let mut scope = self.ctx.begin().await?;
        let mut invoices = Vec::with_capacity(requests.len());
        for request in &requests {
            let invoice = issue(
                scope.store(),
                self.ctx.chart(),
                &self.ctx.config.billing,
                request,
            )
            .await?;
            invoices.push(invoice);
        }

        let numbers: Vec<&str> = invoices.iter().map(|i| i.invoice_no.as_str()).collect();
        let total: BigDecimal = invoices.iter().map(|i| &i.amount_incl_tax).sum();
        scope
            .audit(
                AuditRecord::new(actor, "issue_invoice_batch", invoices.len()).details(json!({
                    "invoices": numbers,
                    "total": total.to_string(),
                })),
            )
            .await?;
        scope.commit().await?;

        tracing::info!(count = invoices.len(), total = %total, "Invoice batch issued");
        Ok(invoices)
    }

    pub async fn invoice_for_bill(&self, bill_id: BillId) -> LedgerResult<Option<Invoice>> {
        self.ctx.storage.find_invoice_for_bill(bill_id).await
    }

    pub async fn find_by_number(&self, invoice_no: &str) -> LedgerResult<Option<Invoice>> {
        self.ctx.storage.find_invoice_by_number(invoice_no.trim()).await
    }

    pub async fn list(&self) -> LedgerResult<Vec<Invoice>> {
        self.ctx.storage.list_invoices().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::settlement::apply_payment;
    use crate::config::ErpConfig;
    use crate::ledger::AccountManager;
    use crate::utils::MemoryStorage;
    use tempfile::TempDir;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn april() -> Period {
        Period::new(2026, 4).unwrap()
    }

    async fn setup() -> (ErpContext<MemoryStorage>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = ErpConfig::default();
        config.audit.worm_log_path = dir.path().join("worm.log").display().to_string();
        let ctx = ErpContext::new(MemoryStorage::new(), config);
        AccountManager::new(ctx.clone())
            .setup_standard_chart("admin")
            .await
            .unwrap();
        (ctx, dir)
    }

    async fn paid_bill(ctx: &mut ErpContext<MemoryStorage>, fee_type: &str, amount: &str) -> Bill {
        let mut bill = ctx
            .storage
            .insert_bill(Bill::new(1, fee_type, april(), dec(amount), "admin"))
            .await
            .unwrap();
        apply_payment(&mut bill, &dec(amount)).unwrap();
        ctx.storage.update_bill(&bill).await.unwrap();
        bill
    }

    #[test]
    fn test_generated_number_format() {
        let no = generate_invoice_no();
        assert_eq!(no.len(), 12);
        assert!(no.starts_with("INV-"));
        assert!(no[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_issue_with_explicit_rate_posts_tax() {
        let (mut ctx, _dir) = setup().await;
        let bill = paid_bill(&mut ctx, "Property", "106.00").await;
        let desk = InvoiceDesk::new(ctx.clone());

        let invoice = desk
            .issue_invoice(
                "clerk",
                InvoiceRequest::new(bill.id, "Lin Wei")
                    .tax_rate(dec("0.06"))
                    .period(april()),
            )
            .await
            .unwrap();
        assert_eq!(invoice.amount_excl_tax, dec("100.00"));
        assert_eq!(invoice.tax_amount, dec("6.00"));
        assert!(invoice.invoice_no.starts_with("INV-"));

        let tax = ctx
            .storage
            .list_ledger_entries(&LedgerEntryFilter::account(5))
            .await
            .unwrap();
        assert_eq!(tax.len(), 1);
        assert_eq!(tax[0].side, EntryType::Credit);
        assert_eq!(tax[0].amount, dec("6.00"));

        let twice = desk
            .issue_invoice("clerk", InvoiceRequest::new(bill.id, "Lin Wei"))
            .await;
        assert!(matches!(twice, Err(LedgerError::InvalidState(_))));
        assert_eq!(
            desk.invoice_for_bill(bill.id).await.unwrap().map(|i| i.id),
            Some(invoice.id)
        );
    }

    #[tokio::test]
    async fn test_fee_type_rate_and_zero_tax() {
        let (mut ctx, _dir) = setup().await;
        ctx.storage
            .save_fee_type(&FeeType {
                name: "Parking".to_string(),
                tax_rate: dec("0.09"),
            })
            .await
            .unwrap();
        let parking = paid_bill(&mut ctx, "Parking", "218").await;
        let water = paid_bill(&mut ctx, "Water", "30").await;
        let desk = InvoiceDesk::new(ctx.clone());

        let parking_invoice = desk
            .issue_invoice("clerk", InvoiceRequest::new(parking.id, "Tenant").number("P-0001"))
            .await
            .unwrap();
        assert_eq!(parking_invoice.tax_rate, dec("0.09"));
        assert_eq!(parking_invoice.amount_excl_tax, dec("200.00"));
        assert_eq!(parking_invoice.tax_amount, dec("18.00"));

        let water_invoice = desk
            .issue_invoice("clerk", InvoiceRequest::new(water.id, "Tenant"))
            .await
            .unwrap();
        assert!(water_invoice.tax_amount.is_zero());

        let tax = ctx
            .storage
            .list_ledger_entries(&LedgerEntryFilter::account(5))
            .await
            .unwrap();
        assert_eq!(tax.len(), 1);
        assert!(desk.find_by_number("P-0001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unpaid_or_over_rate_rejected() {
        let (mut ctx, _dir) = setup().await;
        let unpaid = ctx
            .storage
            .insert_bill(Bill::new(1, "Property", april(), dec("50"), "admin"))
            .await
            .unwrap();
        let paid = paid_bill(&mut ctx, "Property", "50").await;
        let desk = InvoiceDesk::new(ctx.clone());

        let err = desk
            .issue_invoice("clerk", InvoiceRequest::new(unpaid.id, "Tenant"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));

        let err = desk
            .issue_invoice(
                "clerk",
                InvoiceRequest::new(paid.id, "Tenant").tax_rate(dec("0.2")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(desk.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let (mut ctx, _dir) = setup().await;
        let first = paid_bill(&mut ctx, "Property", "80").await;
        let unpaid = ctx
            .storage
            .insert_bill(Bill::new(1, "Property", april(), dec("80"), "admin"))
            .await
            .unwrap();
        let second = paid_bill(&mut ctx, "Property", "90").await;
        let desk = InvoiceDesk::new(ctx.clone());

        let failed = desk
            .issue_batch(
                "clerk",
                vec![
                    InvoiceRequest::new(first.id, "Tenant"),
                    InvoiceRequest::new(unpaid.id, "Tenant"),
                ],
            )
            .await;
        assert!(failed.is_err());
        assert!(desk.list().await.unwrap().is_empty());

        let issued = desk
            .issue_batch(
                "clerk",
                vec![
                    InvoiceRequest::new(first.id, "Tenant"),
                    InvoiceRequest::new(second.id, "Tenant"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(issued.len(), 2);
        let audits = ctx
            .storage
            .list_audit_entries(&crate::audit::AuditFilter::action("issue_invoice_batch"))
            .await
            .unwrap();
        assert_eq!(audits.len(), 1);
    }
}
