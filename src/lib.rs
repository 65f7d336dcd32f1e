//! # Reconciliation Core
//!
//! Background processing and reconciliation of uploaded transaction records
//! against a system of record.
//!
//! ## Features
//!
//! - **Job queue**: single-worker, first-in-first-out execution of file
//!   processing and reconciliation jobs with per-job lifecycle tracking
//! - **Reconciliation engine**: natural-key candidate lookup, per-field
//!   comparison with relative variance, and matched / partially matched /
//!   not matched / duplicate classification
//! - **Storage abstraction**: read-only `RecordStore` and write-side
//!   `RecordSink` traits, with an in-memory implementation for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{reconcile, MatchStatus, TransactionRecord};
//! use bigdecimal::BigDecimal;
//! use std::str::FromStr;
//!
//! let record = |id: &str, amount: &str| {
//!     TransactionRecord::new(
//!         id.to_string(),
//!         "TXN001".to_string(),
//!         Some(BigDecimal::from_str(amount).unwrap()),
//!         Some("REF001".to_string()),
//!     )
//! };
//!
//! let uploaded = vec![record("u1", "1500.00")];
//! let system = vec![record("s1", "1500.00")];
//! let tolerance = BigDecimal::from_str("0.01").unwrap();
//!
//! let results = reconcile(&uploaded, &system, &tolerance).unwrap();
//! assert_eq!(results[0].match_status, MatchStatus::Matched);
//! ```

pub mod config;
pub mod processing;
pub mod queue;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use processing::*;
pub use queue::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
