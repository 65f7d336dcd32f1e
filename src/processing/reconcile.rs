//! Reconciliation jobs: load an upload's records, match them, persist the run

use async_trait::async_trait;
use chrono::Utc;
use std::panic;
use std::sync::Arc;
use tracing::info;

use crate::queue::{JobError, JobHandler, JobPayload};
use crate::reconciliation::ReconciliationEngine;
use crate::traits::*;
use crate::types::*;

/// Handler for `reconciliation` jobs
pub struct ReconciliationHandler<S> {
    store: Arc<S>,
    engine: ReconciliationEngine,
}

impl<S> ReconciliationHandler<S>
where
    S: RecordStore + RecordSink,
{
    /// Create a new handler using the default engine
    pub fn new(store: Arc<S>) -> Self {
        Self::with_engine(store, ReconciliationEngine::new())
    }

    /// Create a new handler with a configured engine
    pub fn with_engine(store: Arc<S>, engine: ReconciliationEngine) -> Self {
        Self { store, engine }
    }

    /// Reconcile every record of a processed upload against the system records
    pub async fn reconcile_upload_job(
        &self,
        upload_job_id: &str,
        user_id: &str,
    ) -> ReconResult<ReconciliationRun> {
        let upload = self
            .store
            .get_upload_job(upload_job_id)
            .await?
            .ok_or_else(|| ReconciliationError::UploadJobNotFound(upload_job_id.to_string()))?;

        if upload.status != UploadStatus::Completed {
            return Err(ReconciliationError::Validation(format!(
                "Upload job '{}' has not finished processing",
                upload.id
            )));
        }

        let uploaded = self.store.uploaded_records(upload_job_id).await?;
        let system = self.store.system_records().await?;

        // Comparison is CPU-bound, keep it off the async worker threads
        let engine = self.engine.clone();
        let results =
            tokio::task::spawn_blocking(move || engine.reconcile(&uploaded, &system))
                .await
                .map_err(|e| match e.try_into_panic() {
                    Ok(payload) => panic::resume_unwind(payload),
                    Err(e) => ReconciliationError::Interrupted(e.to_string()),
                })?;

        let run = ReconciliationRun {
            upload_job_id: upload.id,
            user_id: user_id.to_string(),
            summary: ReconciliationSummary::from_results(&results),
            results,
            completed_at: Utc::now(),
        };
        self.store.save_reconciliation(&run).await?;

        info!(
            upload_job_id = %run.upload_job_id,
            user_id = %run.user_id,
            total = run.summary.total,
            accuracy = run.summary.accuracy,
            "Reconciliation run saved"
        );

        Ok(run)
    }
}

#[async_trait]
impl<S> JobHandler for ReconciliationHandler<S>
where
    S: RecordStore + RecordSink,
{
    async fn handle(&self, payload: &JobPayload) -> Result<(), JobError> {
        match payload {
            JobPayload::Reconciliation {
                upload_job_id,
                user_id,
            } => {
                self.reconcile_upload_job(upload_job_id, user_id).await?;
                Ok(())
            }
            other => Err(JobError::HandlerFailure(format!(
                "Reconciliation handler cannot run '{}' jobs",
                other.job_type()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemoryStore;
    use bigdecimal::BigDecimal;

    fn record(id: &str, txn: &str, amount: i64) -> TransactionRecord {
        TransactionRecord::new(
            id.to_string(),
            txn.to_string(),
            Some(BigDecimal::from(amount)),
            Some(format!("REF-{}", txn)),
        )
    }

    fn completed_upload(id: &str) -> UploadJob {
        let mut upload = UploadJob::new(id.to_string(), "transactions.csv".to_string());
        upload.set_status(UploadStatus::Completed);
        upload
    }

    #[tokio::test]
    async fn test_run_is_saved_with_summary() {
        let store = Arc::new(MemoryStore::new());
        store.add_upload_job(completed_upload("up1")).unwrap();
        store
            .save_uploaded_records(
                "up1",
                vec![record("u1", "TXN001", 100), record("u2", "TXN404", 5)],
            )
            .await
            .unwrap();
        store
            .set_system_records(vec![record("s1", "TXN001", 100)])
            .unwrap();

        let handler = ReconciliationHandler::new(Arc::clone(&store));
        let run = handler.reconcile_upload_job("up1", "1").await.unwrap();

        assert_eq!(run.results.len(), 2);
        assert_eq!(run.summary.matched, 1);
        assert_eq!(run.summary.not_matched, 1);
        assert_eq!(run.summary.accuracy, 50.0);
        assert_eq!(store.reconciliation("up1").unwrap(), Some(run));
    }

    #[tokio::test]
    async fn test_unprocessed_upload_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_upload_job(UploadJob::new("up2".to_string(), "pending.csv".to_string()))
            .unwrap();

        let handler = ReconciliationHandler::new(store);
        assert!(matches!(
            handler.reconcile_upload_job("up2", "1").await,
            Err(ReconciliationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_payload_fails() {
        let handler = ReconciliationHandler::new(Arc::new(MemoryStore::new()));
        let payload = JobPayload::FileProcessing {
            job_id: "up1".to_string(),
        };
        assert!(matches!(
            handler.handle(&payload).await,
            Err(JobError::HandlerFailure(_))
        ));
    }
}
