//! Shared service context and the transaction scope

use std::sync::Arc;

use crate::audit::{AuditEntry, AuditRecord, WormLog, WormPayload};
use crate::config::{ChartConfig, ErpConfig};
use crate::traits::*;
use crate::types::*;

/// What every service holds: the storage handle, the side log and config
#[derive(Debug, Clone)]
pub struct ErpContext<S> {
    pub storage: S,
    pub worm: Arc<WormLog>,
    pub config: Arc<ErpConfig>,
}

impl<S: TransactionalStorage> ErpContext<S> {
    pub fn new(storage: S, config: ErpConfig) -> Self {
        let worm = WormLog::new(&config.audit.worm_log_path);
        Self {
            storage,
            worm: Arc::new(worm),
            config: Arc::new(config),
        }
    }

    pub fn chart(&self) -> &ChartConfig {
        &self.config.accounts
    }

    /// Open a storage transaction with an empty audit buffer
    pub async fn begin(&self) -> LedgerResult<TransactionScope<'_, S>> {
        TransactionScope::begin(&self.storage, &self.worm).await
    }
}

/// A storage transaction plus the audit payloads waiting for its commit
///
/// Audit rows are written inside the transaction. Their side-log lines are
/// only appended once the storage commit succeeds. Dropping the scope
/// discards both.
pub struct TransactionScope<'a, S: TransactionalStorage> {
    storage: &'a S,
    worm: &'a WormLog,
    tx: S::Transaction,
    pending: Vec<WormPayload>,
}

impl<'a, S: TransactionalStorage> TransactionScope<'a, S> {
    pub async fn begin(storage: &'a S, worm: &'a WormLog) -> LedgerResult<Self> {
        Ok(Self {
            storage,
            worm,
            tx: storage.begin().await?,
            pending: Vec::new(),
        })
    }

    /// The transaction's working storage
    pub fn store(&mut self) -> &mut S::Transaction {
        &mut self.tx
    }

    /// Write the audit row now and queue its side-log line for commit
    pub async fn audit(&mut self, record: AuditRecord) -> LedgerResult<AuditEntry> {
        let (entry, payload) = record.seal()?;
        let row = self.tx.insert_audit_entry(entry).await?;
        self.pending.push(payload);
        Ok(row)
    }

    /// Commit storage, then flush the side log
    ///
    /// Side-log failures after a successful commit are logged and do not
    /// fail the operation.
    pub async fn commit(self) -> LedgerResult<()> {
        let Self {
            storage,
            worm,
            tx,
            pending,
        } = self;
        storage.commit(tx).await?;

        for payload in &pending {
            if let Err(e) = worm.append(payload) {
                tracing::error!(
                    error = %e,
                    action = %payload.action,
                    trace = %payload.trace,
                    "WORM log write failed after commit"
                );
            }
        }
        Ok(())
    }
}
