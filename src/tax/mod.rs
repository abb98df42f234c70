//! Tax calculations used when invoicing

pub mod inclusive;

pub use inclusive::*;
