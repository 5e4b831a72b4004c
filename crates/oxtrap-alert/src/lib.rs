//! Threshold evaluation for rule values.
//!
//! Integer rules may carry warning/critical limits; [`threshold::classify`]
//! maps a value onto a [`Severity`](oxtrap_common::types::Severity), checking
//! the critical limit first so a value past both reports `critical`.

pub mod threshold;


pub use threshold::{classify, classify_rule};
