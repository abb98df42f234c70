//! Chart of accounts

use serde_json::json;

use crate::audit::AuditRecord;
use crate::config::ChartConfig;
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;

/// Account manager for handling chart of accounts operations
pub struct AccountManager<S: TransactionalStorage> {
    ctx: ErpContext<S>,
    validator: Box<dyn AccountValidator>,
}

impl<S: TransactionalStorage> AccountManager<S> {
    /// Create a new account manager
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self {
            ctx,
            validator: Box::new(DefaultAccountValidator),
        }
    }

    /// Create a new account manager with custom validator
    pub fn with_validator(ctx: ErpContext<S>, validator: Box<dyn AccountValidator>) -> Self {
        Self { ctx, validator }
    }

    /// Create a new account with a unique id and name
    pub async fn create_account(
        &self,
        actor: &str,
        id: AccountId,
        name: &str,
        nature: AccountNature,
    ) -> LedgerResult<Account> {
        let account = Account::new(id, name.trim().to_string(), nature);
        self.validator.validate_account(&account)?;

        let mut scope = self.ctx.begin().await?;
        create_in(scope.store(), &account).await?;
        scope
            .audit(
                AuditRecord::new(actor, "create_account", account.id)
                    .details(json!({ "name": account.name, "nature": account.nature })),
            )
            .await?;
        scope.commit().await?;

        tracing::info!(account_id = account.id, name = %account.name, "Account created");
        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>> {
        self.ctx.storage.get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: AccountId) -> LedgerResult<Account> {
        self.ctx
            .storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Account", account_id))
    }

    /// List all accounts
    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.ctx.storage.list_accounts().await
    }

    /// Stop an account from taking new postings
    pub async fn deactivate_account(&self, actor: &str, account_id: AccountId) -> LedgerResult<Account> {
        let mut scope = self.ctx.begin().await?;
        let mut account = scope
            .store()
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Account", account_id))?;
        if !account.is_active {
            return Ok(account);
        }

        account.is_active = false;
        scope.store().update_account(&account).await?;
        scope
            .audit(AuditRecord::new(actor, "deactivate_account", account_id))
            .await?;
        scope.commit().await?;
        Ok(account)
    }

    /// Create whichever accounts of the standard chart are missing
    pub async fn setup_standard_chart(&self, actor: &str) -> LedgerResult<Vec<Account>> {
        let mut scope = self.ctx.begin().await?;
        let mut created = Vec::new();

        for account in standard_chart(self.ctx.chart()) {
            if scope.store().get_account(account.id).await?.is_some() {
                continue;
            }
            create_in(scope.store(), &account).await?;
            created.push(account);
        }

        if created.is_empty() {
            return Ok(created);
        }

        let ids: Vec<AccountId> = created.iter().map(|a| a.id).collect();
        scope
            .audit(
                AuditRecord::new(actor, "setup_standard_chart", "accounts")
                    .details(json!({ "created": ids })),
            )
            .await?;
        scope.commit().await?;
        Ok(created)
    }
}

async fn create_in<T: ErpStorage + ?Sized>(store: &mut T, account: &Account) -> LedgerResult<()> {
    if store.get_account(account.id).await?.is_some() {
        return Err(LedgerError::Validation(format!(
            "Account with ID '{}' already exists",
            account.id
        )));
    }

    let name_taken = store
        .list_accounts()
        .await?
        .iter()
        .any(|existing| existing.name.eq_ignore_ascii_case(&account.name));
    if name_taken {
        return Err(LedgerError::Validation(format!(
            "Account name '{}' is already in use",
            account.name
        )));
    }

    store.save_account(account).await
}

/// The five accounts every property office posts to
pub fn standard_chart(chart: &ChartConfig) -> Vec<Account> {
    vec![
        Account::new(chart.cash, "Cash".to_string(), AccountNature::Asset),
        Account::new(
            chart.fee_income,
            "Property fee income".to_string(),
            AccountNature::Income,
        ),
        Account::new(
            chart.advance_receipts,
            "Advance receipts".to_string(),
            AccountNature::Liability,
        ),
        Account::new(
            chart.discounts,
            "Fee discounts".to_string(),
            AccountNature::Expense,
        ),
        Account::new(
            chart.output_tax,
            "Output tax payable".to_string(),
            AccountNature::Liability,
        ),
    ]
}

/// Fetch an account that may take postings
pub async fn require_active_account<T: ErpStorage + ?Sized>(
    store: &T,
    account_id: AccountId,
) -> LedgerResult<Account> {
    let account = store
        .get_account(account_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Account", account_id))?;
    if !account.is_active {
        return Err(LedgerError::Validation(format!(
            "Account '{}' is inactive",
            account.name
        )));
    }
    Ok(account)
}
