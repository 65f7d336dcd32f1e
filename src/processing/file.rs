//! File processing: turning an uploaded file into stored records

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::queue::{JobError, JobHandler, JobPayload};
use crate::traits::*;
use crate::types::*;

/// Handler for `file-processing` jobs
pub struct FileProcessingHandler<S, P> {
    store: Arc<S>,
    parser: Arc<P>,
    validator: Box<dyn RecordValidator>,
}

impl<S, P> FileProcessingHandler<S, P>
where
    S: RecordStore + RecordSink,
    P: UploadParser,
{
    /// Create a new handler
    pub fn new(store: Arc<S>, parser: Arc<P>) -> Self {
        Self {
            store,
            parser,
            validator: Box::new(DefaultRecordValidator),
        }
    }

    /// Create a new handler with a custom validator
    pub fn with_validator(
        store: Arc<S>,
        parser: Arc<P>,
        validator: Box<dyn RecordValidator>,
    ) -> Self {
        Self {
            store,
            parser,
            validator,
        }
    }

    /// Parse, validate and store the records of an upload job
    ///
    /// The upload job ends up `completed` with its record counts, or `failed`
    /// with the reason, which is also returned as the error.
    pub async fn process_file(&self, upload_job_id: &str) -> ReconResult<UploadJob> {
        let mut upload = self
            .store
            .get_upload_job(upload_job_id)
            .await?
            .ok_or_else(|| ReconciliationError::UploadJobNotFound(upload_job_id.to_string()))?;

        // A re-submitted upload starts counting from scratch
        upload.error = None;
        upload.total_records = 0;
        upload.processed_records = 0;
        upload.error_records = 0;
        upload.set_status(UploadStatus::Processing);
        self.store.update_upload_job(&upload).await?;

        match self.parse_and_store(&mut upload).await {
            Ok(()) => {
                upload.set_status(UploadStatus::Completed);
                self.store.update_upload_job(&upload).await?;
                info!(
                    upload_job_id = %upload.id,
                    total = upload.total_records,
                    processed = upload.processed_records,
                    errors = upload.error_records,
                    "Upload processed"
                );
                Ok(upload)
            }
            Err(e) => {
                upload.error = Some(e.to_string());
                upload.set_status(UploadStatus::Failed);
                if let Err(store_err) = self.store.update_upload_job(&upload).await {
                    error!(
                        upload_job_id = %upload.id,
                        error = %e,
                        store_error = %store_err,
                        "Could not record upload failure"
                    );
                }
                Err(e)
            }
        }
    }

    /// Mark an upload left in `processing` as failed
    ///
    /// Used when the job working on it was abandoned, so nothing else will
    /// move it to a terminal state.
    pub async fn fail_stalled_upload(
        &self,
        upload_job_id: &str,
        reason: String,
    ) -> ReconResult<()> {
        let Some(mut upload) = self.store.get_upload_job(upload_job_id).await? else {
            return Ok(());
        };
        if upload.status != UploadStatus::Processing {
            return Ok(());
        }

        upload.error = Some(reason);
        upload.set_status(UploadStatus::Failed);
        self.store.update_upload_job(&upload).await
    }

    async fn parse_and_store(&self, upload: &mut UploadJob) -> ReconResult<()> {
        let rows = self.parser.parse(upload).await?;
        upload.total_records = rows.len();

        let mut seen_ids = HashSet::new();
        let mut valid = Vec::with_capacity(rows.len());
        for row in rows {
            let checked = self.validator.validate_record(&row).and_then(|()| {
                if seen_ids.insert(row.id.clone()) {
                    Ok(())
                } else {
                    Err(ReconciliationError::Validation(format!(
                        "Record ID '{}' appears more than once",
                        row.id
                    )))
                }
            });
            match checked {
                Ok(()) => valid.push(row),
                Err(e) => {
                    warn!(
                        upload_job_id = %upload.id,
                        record_id = %row.id,
                        error = %e,
                        "Rejected record"
                    );
                    upload.error_records += 1;
                }
            }
        }

        upload.processed_records = valid.len();
        self.store.save_uploaded_records(&upload.id, valid).await
    }
}

#[async_trait]
impl<S, P> JobHandler for FileProcessingHandler<S, P>
where
    S: RecordStore + RecordSink,
    P: UploadParser,
{
    async fn handle(&self, payload: &JobPayload) -> Result<(), JobError> {
        match payload {
            JobPayload::FileProcessing { job_id } => {
                self.process_file(job_id).await?;
                Ok(())
            }
            other => Err(JobError::HandlerFailure(format!(
                "File processing handler cannot run '{}' jobs",
                other.job_type()
            ))),
        }
    }

    async fn on_timeout(&self, payload: &JobPayload, error: &JobError) {
        if let JobPayload::FileProcessing { job_id } = payload {
            if let Err(e) = self.fail_stalled_upload(job_id, error.to_string()).await {
                warn!(upload_job_id = %job_id, error = %e, "Could not fail timed out upload");
            }
        }
    }
}
