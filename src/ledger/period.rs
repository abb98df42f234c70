//! Period close locks

use serde_json::json;

use crate::audit::AuditRecord;
use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_actor;

/// A period with no record is open
pub async fn is_closed<T: ErpStorage + ?Sized>(store: &T, period: Period) -> LedgerResult<bool> {
    Ok(store
        .get_period_close(period)
        .await?
        .is_some_and(|record| record.closed))
}

/// Fail with `PeriodClosed` when the period is locked
pub async fn ensure_period_open<T: ErpStorage + ?Sized>(
    store: &T,
    period: Period,
) -> LedgerResult<()> {
    if is_closed(store, period).await? {
        tracing::warn!(%period, "Rejected write to closed period");
        return Err(LedgerError::PeriodClosed(period));
    }
    Ok(())
}

/// Administrative open/close toggles for accounting periods
pub struct PeriodManager<S: TransactionalStorage> {
    ctx: ErpContext<S>,
}

impl<S: TransactionalStorage> PeriodManager<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self { ctx }
    }

    pub async fn is_period_closed(&self, period: Period) -> LedgerResult<bool> {
        is_closed(&self.ctx.storage, period).await
    }

    /// Close a period; closing a closed period changes nothing
    pub async fn close_period(
        &self,
        actor: &str,
        period: Period,
        remark: Option<&str>,
    ) -> LedgerResult<PeriodClose> {
        validate_actor(actor)?;
        let mut scope = self.ctx.begin().await?;
        let now = chrono::Utc::now().naive_utc();

        let record = match scope.store().get_period_close(period).await? {
            Some(existing) if existing.closed => return Ok(existing),
            Some(existing) => PeriodClose {
                closed: true,
                closed_at: Some(now),
                remark: remark.map(str::to_string).or(existing.remark),
                ..existing
            },
            None => PeriodClose {
                period,
                closed: true,
                created_at: now,
                closed_at: Some(now),
                remark: remark.map(str::to_string),
            },
        };

        scope.store().save_period_close(&record).await?;
        scope
            .audit(
                AuditRecord::new(actor, "close_period", period)
                    .details(json!({ "remark": record.remark })),
            )
            .await?;
        scope.commit().await?;

        tracing::info!(%period, actor, "Period closed");
        Ok(record)
    }

    /// Reopen a period; unknown or open periods are left alone
    pub async fn unlock_period(&self, actor: &str, period: Period) -> LedgerResult<Option<PeriodClose>> {
        validate_actor(actor)?;
        let mut scope = self.ctx.begin().await?;

        let mut record = match scope.store().get_period_close(period).await? {
            None => return Ok(None),
            Some(existing) if !existing.closed => return Ok(Some(existing)),
            Some(existing) => existing,
        };

        record.closed = false;
        record.closed_at = None;
        scope.store().save_period_close(&record).await?;
        scope
            .audit(AuditRecord::new(actor, "unlock_period", period))
            .await?;
        scope.commit().await?;

        tracing::info!(%period, actor, "Period unlocked");
        Ok(Some(record))
    }

    pub async fn list_period_closes(&self) -> LedgerResult<Vec<PeriodClose>> {
        self.ctx.storage.list_period_closes().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditFilter;
    use crate::config::ErpConfig;
    use crate::utils::MemoryStorage;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> PeriodManager<MemoryStorage> {
        let mut config = ErpConfig::default();
        config.audit.worm_log_path = dir.path().join("worm.log").display().to_string();
        PeriodManager::new(ErpContext::new(MemoryStorage::new(), config))
    }

    async fn audit_count(manager: &PeriodManager<MemoryStorage>, action: &str) -> usize {
        manager
            .ctx
            .storage
            .list_audit_entries(&AuditFilter::action(action))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let period = Period::new(2026, 1).unwrap();

        assert!(!manager.is_period_closed(period).await.unwrap());
        manager.close_period("admin", period, Some("month end")).await.unwrap();
        manager.close_period("admin", period, None).await.unwrap();

        assert!(manager.is_period_closed(period).await.unwrap());
        assert_eq!(audit_count(&manager, "close_period").await, 1);

        let err = ensure_period_open(&manager.ctx.storage, period)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PeriodClosed(p) if p == period));
    }

    #[tokio::test]
    async fn test_unlock_unknown_period_is_noop() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let period = Period::new(2026, 2).unwrap();

        assert!(manager.unlock_period("admin", period).await.unwrap().is_none());
        assert_eq!(audit_count(&manager, "unlock_period").await, 0);
        assert!(manager.list_period_closes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unlock_reopens() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let period = Period::new(2026, 3).unwrap();

        manager.close_period("admin", period, None).await.unwrap();
        let reopened = manager.unlock_period("admin", period).await.unwrap().unwrap();
        assert!(!reopened.closed);
        assert!(reopened.closed_at.is_none());
        manager.unlock_period("admin", period).await.unwrap();

        assert!(!manager.is_period_closed(period).await.unwrap());
        assert_eq!(audit_count(&manager, "unlock_period").await, 1);
    }

    #[tokio::test]
    async fn test_anonymous_close_and_unlock_are_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let period = Period::new(2026, 4).unwrap();

        let err = manager.close_period("  ", period, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(!manager.is_period_closed(period).await.unwrap());

        manager.close_period("admin", period, None).await.unwrap();
        let err = manager.unlock_period("", period).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(manager.is_period_closed(period).await.unwrap());
        assert_eq!(audit_count(&manager, "unlock_period").await, 0);
    }
}
