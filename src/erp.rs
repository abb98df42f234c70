//! One handle over every billing service

use crate::audit::AuditService;
use crate::billing::{BillingService, Cashier, DiscountDesk, InvoiceDesk};
use crate::config::ErpConfig;
use crate::ledger::Ledger;
use crate::property::PropertyRegistry;
use crate::reconciliation::Reconciler;
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;

/// All services over one storage backend and side log
pub struct PropertyErp<S: TransactionalStorage> {
    ctx: ErpContext<S>,
    ledger: Ledger<S>,
    registry: PropertyRegistry<S>,
    billing: BillingService<S>,
    cashier: Cashier<S>,
    discounts: DiscountDesk<S>,
    invoices: InvoiceDesk<S>,
    reconciler: Reconciler<S>,
    audit: AuditService<S>,
}

impl<S: TransactionalStorage> PropertyErp<S> {
    pub fn new(storage: S, config: ErpConfig) -> Self {
        let ctx = ErpContext::new(storage, config);
        Self {
            ledger: Ledger::new(ctx.clone()),
            registry: PropertyRegistry::new(ctx.clone()),
            billing: BillingService::new(ctx.clone()),
            cashier: Cashier::new(ctx.clone()),
            discounts: DiscountDesk::new(ctx.clone()),
            invoices: InvoiceDesk::new(ctx.clone()),
            reconciler: Reconciler::new(ctx.clone()),
            audit: AuditService::new(ctx.clone()),
            ctx,
        }
    }

    /// Create the standard chart of accounts if it is missing
    pub async fn bootstrap(&self, actor: &str) -> LedgerResult<()> {
        let created = self.ledger.accounts().setup_standard_chart(actor).await?;
        tracing::info!(app = %self.ctx.config.app_name, created = created.len(), "Chart of accounts ready");
        Ok(())
    }

    pub fn context(&self) -> &ErpContext<S> {
        &self.ctx
    }

    pub fn config(&self) -> &ErpConfig {
        &self.ctx.config
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn registry(&self) -> &PropertyRegistry<S> {
        &self.registry
    }

    pub fn billing(&self) -> &BillingService<S> {
        &self.billing
    }

    pub fn cashier(&self) -> &Cashier<S> {
        &self.cashier
    }

    pub fn discounts(&self) -> &DiscountDesk<S> {
        &self.discounts
    }

    pub fn invoices(&self) -> &InvoiceDesk<S> {
        &self.invoices
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn audit(&self) -> &AuditService<S> {
        &self.audit
    }
}
