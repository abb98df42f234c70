//! Bills from generation through payment, discount and invoicing

pub mod cashier;
pub mod discount;
pub mod generation;
pub mod invoice;
pub mod settlement;
pub mod types;

pub use cashier::*;
pub use discount::*;
pub use generation::*;
pub use invoice::*;
pub use types::*;
