//! Audit trail: relational rows plus a hash-evidenced side log
//!
//! Every state-changing operation produces an [`AuditEntry`]. The entry's
//! JSON payload is appended as one line to the WORM log and its SHA-256
//! digest is stored on the row, so an edited row or an edited log line no
//! longer matches. The digest covers single entries only; replacing the
//! whole log and table together is not detected.

pub mod worm;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::scope::ErpContext;
use crate::traits::*;
use crate::types::*;

pub use worm::{WormLog, WormVerification};

/// Relational audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub user: String,
    pub action: String,
    pub target: String,
    /// JSON text, or the raw string when the caller passed plain text
    pub details: String,
    pub ip_addr: String,
    pub trace_id: String,
    pub created_at: NaiveDateTime,
    /// SHA-256 hex of the WORM payload line
    pub worm_hash: String,
}

impl AuditEntry {
    /// Rebuild the side-log payload this row was hashed from
    pub fn payload(&self) -> WormPayload {
        WormPayload {
            user: self.user.clone(),
            action: self.action.clone(),
            target: self.target.clone(),
            details: self.details.clone(),
            ip: self.ip_addr.clone(),
            trace: self.trace_id.clone(),
            ts: format_timestamp(&self.created_at),
        }
    }

    /// Recompute the digest and compare it with the stored one
    pub fn verify(&self) -> LedgerResult<bool> {
        let line = self.payload().to_line()?;
        Ok(digest_line(&line) == self.worm_hash)
    }
}

/// One line of the WORM log; field order is part of the hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WormPayload {
    pub user: String,
    pub action: String,
    pub target: String,
    pub details: String,
    pub ip: String,
    pub trace: String,
    pub ts: String,
}

impl WormPayload {
    pub fn to_line(&self) -> LedgerResult<String> {
        serde_json::to_string(self)
            .map_err(|e| LedgerError::Audit(format!("Cannot serialize audit payload: {e}")))
    }

    pub fn digest(&self) -> LedgerResult<String> {
        Ok(digest_line(&self.to_line()?))
    }
}

/// Lowercase hex SHA-256 of a payload line
pub fn digest_line(line: &str) -> String {
    hex::encode(Sha256::digest(line.as_bytes()))
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// What an operation wants recorded
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub user: String,
    pub action: String,
    pub target: String,
    pub details: Value,
    pub ip_addr: Option<String>,
    pub trace_id: Option<String>,
}

impl AuditRecord {
    pub fn new(user: &str, action: &str, target: impl ToString) -> Self {
        Self {
            user: user.to_string(),
            action: action.to_string(),
            target: target.to_string(),
            details: Value::Null,
            ip_addr: None,
            trace_id: None,
        }
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn ip(mut self, ip_addr: impl Into<String>) -> Self {
        self.ip_addr = Some(ip_addr.into());
        self
    }

    pub fn trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Freeze the record into a row and its payload, hashing the payload
    pub(crate) fn seal(self) -> LedgerResult<(AuditEntry, WormPayload)> {
        let details = match self.details {
            Value::Null => String::new(),
            Value::String(text) => text,
            other => other.to_string(),
        };
        let mut entry = AuditEntry {
            id: 0,
            user: self.user,
            action: self.action,
            target: self.target,
            details,
            ip_addr: self.ip_addr.unwrap_or_default(),
            trace_id: self
                .trace_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            created_at: chrono::Utc::now().naive_utc(),
            worm_hash: String::new(),
        };
        let payload = entry.payload();
        entry.worm_hash = payload.digest()?;
        Ok((entry, payload))
    }
}

/// Query over audit rows
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user: Option<String>,
    pub action: Option<String>,
    pub target: Option<String>,
    pub trace_id: Option<String>,
}

impl AuditFilter {
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    pub fn trace(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.user.as_deref().is_none_or(|u| entry.user == u)
            && self.action.as_deref().is_none_or(|a| entry.action == a)
            && self.target.as_deref().is_none_or(|t| entry.target == t)
            && self.trace_id.as_deref().is_none_or(|t| entry.trace_id == t)
    }
}

/// Field-level change history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChange {
    pub id: u64,
    pub table_name: String,
    pub record_id: u64,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    pub changed_by: String,
    pub changed_at: NaiveDateTime,
    pub reason: Option<String>,
}

/// Field change being recorded
#[derive(Debug, Clone)]
pub struct FieldChange<'a> {
    pub table_name: &'a str,
    pub record_id: u64,
    pub field_name: &'a str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Record a field change; nothing is written when the values are equal
pub async fn record_data_change<T: ErpStorage + ?Sized>(
    store: &mut T,
    change: FieldChange<'_>,
    changed_by: &str,
    reason: Option<&str>,
) -> LedgerResult<Option<DataChange>> {
    let old_value = change.old_value.unwrap_or_default();
    let new_value = change.new_value.unwrap_or_default();
    if old_value == new_value {
        return Ok(None);
    }

    let row = store
        .insert_data_change(DataChange {
            id: 0,
            table_name: change.table_name.to_string(),
            record_id: change.record_id,
            field_name: change.field_name.to_string(),
            old_value,
            new_value,
            changed_by: changed_by.to_string(),
            changed_at: chrono::Utc::now().naive_utc(),
            reason: reason.map(str::to_string),
        })
        .await?;
    Ok(Some(row))
}

/// Audit queries and out-of-transaction logging
pub struct AuditService<S: TransactionalStorage> {
    ctx: ErpContext<S>,
}

impl<S: TransactionalStorage> AuditService<S> {
    pub fn new(ctx: ErpContext<S>) -> Self {
        Self { ctx }
    }

    /// Log immediately, outside any transaction
    ///
    /// The side log is written first and the row second. Failures are
    /// reported through tracing and yield `None`; audit logging never fails
    /// the caller.
    pub async fn log(&self, record: AuditRecord) -> Option<AuditEntry> {
        let (entry, payload) = match record.seal() {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build audit entry");
                return None;
            }
        };

        match self
            .ctx
            .storage
            .list_audit_entries(&AuditFilter::trace(entry.trace_id.clone()))
            .await
        {
            Ok(existing) if !existing.is_empty() => {
                tracing::error!(trace = %entry.trace_id, action = %entry.action, "Audit trace id already recorded");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Audit row lookup failed");
                return None;
            }
        }

        if let Err(e) = self.ctx.worm.append(&payload) {
            tracing::error!(error = %e, action = %entry.action, "WORM log write failed");
            return None;
        }

        let mut store = self.ctx.storage.clone();
        match store.insert_audit_entry(entry).await {
            Ok(row) => {
                tracing::debug!(action = %row.action, target = %row.target, "Audit entry recorded");
                Some(row)
            }
            Err(e) => {
                tracing::error!(error = %e, "Audit row write failed");
                None
            }
        }
    }

    /// Audit rows matching the filter, newest first
    pub async fn list(&self, filter: &AuditFilter) -> LedgerResult<Vec<AuditEntry>> {
        let mut rows = self.ctx.storage.list_audit_entries(filter).await?;
        rows.reverse();
        Ok(rows)
    }

    /// One page of matching rows, newest first, sized by `billing.page_size`
    pub async fn list_page(&self, filter: &AuditFilter, page: usize) -> LedgerResult<Page<AuditEntry>> {
        let rows = self.list(filter).await?;
        Ok(Page::slice(rows, page, self.ctx.config.billing.page_size))
    }

    pub async fn data_changes(
        &self,
        table_name: Option<&str>,
        record_id: Option<u64>,
    ) -> LedgerResult<Vec<DataChange>> {
        self.ctx
            .storage
            .list_data_changes(table_name, record_id)
            .await
    }

    /// Check the side log against every stored audit row
    pub async fn verify_log(&self) -> LedgerResult<WormVerification> {
        let rows = self
            .ctx
            .storage
            .list_audit_entries(&AuditFilter::default())
            .await?;
        self.ctx.worm.verify(&rows)
    }

    /// Recompute one row's hash from its own fields
    pub async fn verify_entry(&self, entry_id: u64) -> LedgerResult<bool> {
        let row = self
            .ctx
            .storage
            .list_audit_entries(&AuditFilter::default())
            .await?
            .into_iter()
            .find(|row| row.id == entry_id)
            .ok_or_else(|| LedgerError::not_found("AuditEntry", entry_id))?;
        row.verify()
    }
}

/// Check a side log file that is not attached to a running context
pub fn verify_worm_log(path: impl Into<std::path::PathBuf>, rows: &[AuditEntry]) -> LedgerResult<WormVerification> {
    WormLog::new(path).verify(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seal_hashes_payload() {
        let (entry, payload) = AuditRecord::new("alice", "recharge", "A-101")
            .details(json!({"amount": "500.00"}))
            .trace("trace-1")
            .seal()
            .unwrap();

        assert_eq!(entry.trace_id, "trace-1");
        assert_eq!(entry.details, r#"{"amount":"500.00"}"#);
        assert_eq!(entry.worm_hash.len(), 64);
        assert_eq!(entry.worm_hash, digest_line(&payload.to_line().unwrap()));
        assert!(entry.verify().unwrap());
    }

    #[test]
    fn test_edited_row_fails_verification() {
        let (mut entry, _) = AuditRecord::new("alice", "pay", "A-101")
            .details(json!("paid in full"))
            .seal()
            .unwrap();
        assert_eq!(entry.details, "paid in full");
        assert!(!entry.trace_id.is_empty());

        entry.details = "paid nothing".to_string();
        assert!(!entry.verify().unwrap());
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            digest_line("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_filter_matches() {
        let (entry, _) = AuditRecord::new("bob", "close_period", "2026-01")
            .seal()
            .unwrap();
        assert!(AuditFilter::action("close_period").matches(&entry));
        assert!(!AuditFilter::action("unlock_period").matches(&entry));
        assert!(AuditFilter::default().matches(&entry));
    }

    #[tokio::test]
    async fn test_service_log_and_verify() {
        use crate::config::ErpConfig;
        use crate::utils::MemoryStorage;

        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("worm.log");
        let mut config = ErpConfig::default();
        config.audit.worm_log_path = log_path.display().to_string();
        let service = AuditService::new(ErpContext::new(MemoryStorage::new(), config));

        let first = service
            .log(AuditRecord::new("alice", "login", "console").ip("10.0.0.7"))
            .await
            .unwrap();
        service
            .log(AuditRecord::new("alice", "export", "bills"))
            .await
            .unwrap();

        assert!(service.verify_entry(first.id).await.unwrap());
        assert!(matches!(
            service.verify_entry(999).await,
            Err(LedgerError::NotFound { .. })
        ));

        let listed = service.list(&AuditFilter::default()).await.unwrap();
        assert_eq!(listed[0].action, "export");
        assert!(service.verify_log().await.unwrap().is_intact());

        let offline = verify_worm_log(&log_path, &listed).unwrap();
        assert_eq!(offline.verified, 2);
        let partial = verify_worm_log(&log_path, &listed[..1]).unwrap();
        assert_eq!(partial.orphaned.len(), 1);
    }

    #[tokio::test]
    async fn test_list_page_newest_first() {
        use crate::config::ErpConfig;
        use crate::utils::MemoryStorage;

        let dir = tempfile::TempDir::new().unwrap();
        let mut config = ErpConfig::default();
        config.audit.worm_log_path = dir.path().join("worm.log").display().to_string();
        config.billing.page_size = 2;
        let service = AuditService::new(ErpContext::new(MemoryStorage::new(), config));
        for action in ["open", "pay", "close"] {
            service.log(AuditRecord::new("alice", action, "till")).await.unwrap();
        }

        let first = service.list_page(&AuditFilter::default(), 1).await.unwrap();
        let actions: Vec<&str> = first.items.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["close", "pay"]);
        assert_eq!(first.page_count(), 2);
        let last = service.list_page(&AuditFilter::default(), 2).await.unwrap();
        assert_eq!(last.items[0].action, "open");
    }

    #[tokio::test]
    async fn test_log_skips_reused_trace_id() {
        use crate::config::ErpConfig;
        use crate::utils::MemoryStorage;

        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("worm.log");
        let mut config = ErpConfig::default();
        config.audit.worm_log_path = log_path.display().to_string();
        let service = AuditService::new(ErpContext::new(MemoryStorage::new(), config));

        service
            .log(AuditRecord::new("alice", "login", "console").trace("session-9"))
            .await
            .unwrap();
        let again = service
            .log(AuditRecord::new("alice", "logout", "console").trace("session-9"))
            .await;
        assert!(again.is_none());

        assert_eq!(std::fs::read_to_string(&log_path).unwrap().lines().count(), 1);
        assert!(service.verify_log().await.unwrap().is_intact());
    }
}
