//! Ledger module containing accounts, period locks and posting

pub mod account;
pub mod core;
pub mod period;
pub mod posting;

pub use account::*;
pub use core::*;
pub use period::*;
pub use posting::*;
