//! Core types and data structures for the reconciliation system

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single comparable value carried by a record
///
/// Serialized as `{"type": "number" | "text" | "null", "value": ...}` so a
/// numeric-looking text value keeps its variant across the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Decimal value, compared by relative variance
    Number(BigDecimal),
    /// Free text, compared by exact equality
    Text(String),
    /// Missing or null value; never agrees with anything
    Null,
}

impl FieldValue {
    /// Returns true if the value is missing
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<Option<BigDecimal>> for FieldValue {
    fn from(value: Option<BigDecimal>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Number)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Text)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

/// A parsed transaction record, either uploaded by a user or loaded from the
/// system of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Storage identifier of the record itself
    pub id: String,
    /// Transaction identifier, the primary natural key
    pub transaction_id: String,
    /// Transaction amount; `None` when the source row had no usable amount
    pub amount: Option<BigDecimal>,
    /// Bank or gateway reference number
    pub reference_number: Option<String>,
    /// Additional comparable fields, keyed by field name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl TransactionRecord {
    /// Create a new record with the three core fields
    pub fn new(
        id: String,
        transaction_id: String,
        amount: Option<BigDecimal>,
        reference_number: Option<String>,
    ) -> Self {
        Self {
            id,
            transaction_id,
            amount,
            reference_number,
            fields: BTreeMap::new(),
        }
    }

    /// Attach an additional comparable field
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Reference number, treating blank strings as missing
    pub fn reference(&self) -> Option<&str> {
        self.reference_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Transaction identifier, treating blank strings as missing
    pub fn transaction_key(&self) -> Option<&str> {
        Some(self.transaction_id.trim()).filter(|t| !t.is_empty())
    }
}

/// A record as uploaded by the user
pub type UploadedRecord = TransactionRecord;

/// A record from the system of record
pub type SystemRecord = TransactionRecord;

/// Classification of an uploaded record against the system records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Every comparable field agrees
    Matched,
    /// Some, but not all, comparable fields agree
    PartiallyMatched,
    /// No candidate, or a candidate with no agreeing field
    NotMatched,
    /// Another, earlier uploaded record already claimed the match
    Duplicate,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchStatus::Matched => "matched",
            MatchStatus::PartiallyMatched => "partially_matched",
            MatchStatus::NotMatched => "not_matched",
            MatchStatus::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

/// A field whose uploaded and system values disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    /// Name of the compared field
    pub field: String,
    /// Value from the uploaded record
    pub uploaded_value: FieldValue,
    /// Value from the system record
    pub system_value: FieldValue,
    /// Relative variance for numbers, 1.0 for any other disagreement
    pub variance: f64,
}

/// Outcome of reconciling a single uploaded record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    /// Id of the uploaded record this result describes
    pub uploaded_record_id: String,
    /// Id of the system record it was paired with, if any
    pub system_record_id: Option<String>,
    pub match_status: MatchStatus,
    /// Weighted fraction of agreeing fields, in `[0.0, 1.0]`
    pub match_score: f64,
    /// Disagreeing fields, in comparison order
    pub differences: Vec<Difference>,
}

impl ReconciliationResult {
    /// Result for an uploaded record with no candidate system record
    pub fn unmatched(uploaded_record_id: String) -> Self {
        Self {
            uploaded_record_id,
            system_record_id: None,
            match_status: MatchStatus::NotMatched,
            match_score: 0.0,
            differences: Vec::new(),
        }
    }

    /// Result for an uploaded record whose match was already claimed
    pub fn duplicate(uploaded_record_id: String, system_record_id: Option<String>) -> Self {
        Self {
            uploaded_record_id,
            system_record_id,
            match_status: MatchStatus::Duplicate,
            match_score: 0.0,
            differences: Vec::new(),
        }
    }

    /// Check that score, differences and status agree with each other
    pub fn is_consistent(&self) -> bool {
        let exact = self.match_score == 1.0;
        let clean = self.differences.is_empty() && self.match_status == MatchStatus::Matched;
        exact == clean && (0.0..=1.0).contains(&self.match_score)
    }
}

/// Counts of results per status for one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub matched: usize,
    pub partially_matched: usize,
    pub not_matched: usize,
    pub duplicate: usize,
    pub total: usize,
    /// Percentage of records that matched fully or partially
    pub accuracy: f64,
}

impl ReconciliationSummary {
    /// Tally a slice of results
    pub fn from_results(results: &[ReconciliationResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.match_status {
                MatchStatus::Matched => summary.matched += 1,
                MatchStatus::PartiallyMatched => summary.partially_matched += 1,
                MatchStatus::NotMatched => summary.not_matched += 1,
                MatchStatus::Duplicate => summary.duplicate += 1,
            }
        }
        summary.total = results.len();
        if summary.total > 0 {
            let agreeing = (summary.matched + summary.partially_matched) as f64;
            let pct = agreeing / summary.total as f64 * 100.0;
            summary.accuracy = (pct * 100.0).round() / 100.0;
        }
        summary
    }
}

/// A completed reconciliation of one upload job, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRun {
    pub upload_job_id: String,
    /// User who requested the run
    pub user_id: String,
    pub results: Vec<ReconciliationResult>,
    pub summary: ReconciliationSummary,
    pub completed_at: DateTime<Utc>,
}

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// An uploaded file and the progress of turning it into records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    /// Unique identifier for the upload
    pub id: String,
    /// File name as supplied by the uploader
    pub original_name: String,
    pub status: UploadStatus,
    /// Rows yielded by the parser
    pub total_records: usize,
    /// Rows that passed validation and were stored
    pub processed_records: usize,
    /// Rows rejected by validation
    pub error_records: usize,
    /// Failure reason when `status` is `Failed`
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    /// Create a new pending upload job
    pub fn new(id: String, original_name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            original_name,
            status: UploadStatus::Pending,
            total_records: 0,
            processed_records: 0,
            error_records: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the upload to a new status
    pub fn set_status(&mut self, status: UploadStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Errors that can occur while loading, reconciling, or storing records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconciliationError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Upload job not found: {0}")]
    UploadJobNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Reconciliation interrupted: {0}")]
    Interrupted(String),
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconciliationError>;
