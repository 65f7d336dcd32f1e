//! Traits for storage abstraction and extensibility

use async_trait::async_trait;

use crate::types::*;

/// Read-only access to uploaded and system records
///
/// The reconciliation engine never writes through this trait, so any backend
/// (database, cache, in-memory fixtures) can serve it without coordination.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get an upload job by ID
    async fn get_upload_job(&self, upload_job_id: &str) -> ReconResult<Option<UploadJob>>;

    /// List the records stored for an upload job, in upload order
    async fn uploaded_records(&self, upload_job_id: &str) -> ReconResult<Vec<UploadedRecord>>;

    /// List the system-of-record transactions to reconcile against
    async fn system_records(&self) -> ReconResult<Vec<SystemRecord>>;
}

/// Write access used by the job handlers to persist their output
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Save the current state of an upload job
    async fn update_upload_job(&self, upload_job: &UploadJob) -> ReconResult<()>;

    /// Replace the stored records of an upload job
    async fn save_uploaded_records(
        &self,
        upload_job_id: &str,
        records: Vec<UploadedRecord>,
    ) -> ReconResult<()>;

    /// Persist the outcome of a reconciliation run
    async fn save_reconciliation(&self, run: &ReconciliationRun) -> ReconResult<()>;
}

/// Turns an uploaded file into records. CSV/Excel decoding lives behind this.
#[async_trait]
pub trait UploadParser: Send + Sync {
    async fn parse(&self, upload_job: &UploadJob) -> ReconResult<Vec<UploadedRecord>>;
}

/// Trait for implementing custom record validation rules
pub trait RecordValidator: Send + Sync {
    /// Validate a parsed record before it is stored
    fn validate_record(&self, record: &UploadedRecord) -> ReconResult<()>;
}

/// Default validator: a record needs an id and a transaction id
pub struct DefaultRecordValidator;

impl RecordValidator for DefaultRecordValidator {
    fn validate_record(&self, record: &UploadedRecord) -> ReconResult<()> {
        if record.id.trim().is_empty() {
            return Err(ReconciliationError::Validation(
                "Record ID cannot be empty".to_string(),
            ));
        }

        if record.transaction_key().is_none() {
            return Err(ReconciliationError::Validation(format!(
                "Record '{}' has no transaction ID",
                record.id
            )));
        }

        Ok(())
    }
}
