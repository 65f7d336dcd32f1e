//! Reconciliation of uploaded transaction records against the system of record
//!
//! Each uploaded record is paired with its best system record by natural key
//! (transaction id and/or reference number), compared field by field, and
//! classified as matched, partially matched, not matched, or duplicate.

pub mod compare;
pub mod engine;

pub use compare::*;
pub use engine::*;
