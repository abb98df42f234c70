//! # Property Billing
//!
//! Billing and bookkeeping core for residential property management:
//! fee bills per room, a cashier desk, discounts, invoices and a
//! double-entry ledger underneath, with a tamper-evident audit trail.
//!
//! ## Features
//!
//! - **Double-entry ledger**: balanced postings, monthly period locks, trial balance
//! - **Property registry**: properties, rooms with fee items, parking spaces, utility meters
//! - **Billing**: periodic bill generation, partial payments, arrears, voiding
//! - **Cashier**: prepaid recharges, bill payments from balance or direct, batch collection
//! - **Discounts and invoices**: approval workflow, price-inclusive tax split
//! - **Reconciliation**: collection workbench, balance tie-out, anomaly checks
//! - **Audit trail**: every write leaves a hashed row and an append-only side log line
//! - **Storage abstraction**: trait-based, with an in-memory transactional backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use property_billing::{ErpConfig, MemoryStorage, PropertyErp};
//!
//! # async fn run() -> property_billing::LedgerResult<()> {
//! let erp = PropertyErp::new(MemoryStorage::new(), ErpConfig::default());
//! erp.bootstrap("admin").await?;
//! let property = erp
//!     .registry()
//!     .create_property("admin", "Harbour View", "HV", None)
//!     .await?;
//! # let _ = property;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod billing;
pub mod config;
pub mod erp;
pub mod ledger;
pub mod property;
pub mod reconciliation;
pub mod scope;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditFilter, AuditRecord, AuditService, WormLog, WormVerification};
pub use billing::*;
pub use config::ErpConfig;
pub use erp::PropertyErp;
pub use ledger::*;
pub use property::*;
pub use reconciliation::*;
pub use scope::{ErpContext, TransactionScope};
pub use tax::*;
pub use traits::*;
pub use types::*;
pub use utils::MemoryStorage;

// Re-export posting patterns for convenience
pub use ledger::posting::patterns;
