//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

fn read<T>(lock: &RwLock<T>) -> ReconResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| ReconciliationError::Storage(format!("Lock poisoned: {}", e)))
}

fn write<T>(lock: &RwLock<T>) -> ReconResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| ReconciliationError::Storage(format!("Lock poisoned: {}", e)))
}

/// In-memory record store for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    upload_jobs: Arc<RwLock<HashMap<String, UploadJob>>>,
    uploaded_records: Arc<RwLock<HashMap<String, Vec<UploadedRecord>>>>,
    system_records: Arc<RwLock<Vec<SystemRecord>>>,
    reconciliations: Arc<RwLock<HashMap<String, ReconciliationRun>>>,
}

impl MemoryStore {
    /// Create a new memory store instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upload job
    pub fn add_upload_job(&self, upload_job: UploadJob) -> ReconResult<()> {
        let mut jobs = write(&self.upload_jobs)?;
        if jobs.contains_key(&upload_job.id) {
            return Err(ReconciliationError::Validation(format!(
                "Upload job with ID '{}' already exists",
                upload_job.id
            )));
        }
        jobs.insert(upload_job.id.clone(), upload_job);
        Ok(())
    }

    /// Replace the system-of-record transactions
    pub fn set_system_records(&self, records: Vec<SystemRecord>) -> ReconResult<()> {
        *write(&self.system_records)? = records;
        Ok(())
    }

    /// Latest reconciliation run stored for an upload job
    pub fn reconciliation(&self, upload_job_id: &str) -> ReconResult<Option<ReconciliationRun>> {
        Ok(read(&self.reconciliations)?.get(upload_job_id).cloned())
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> ReconResult<()> {
        write(&self.upload_jobs)?.clear();
        write(&self.uploaded_records)?.clear();
        write(&self.system_records)?.clear();
        write(&self.reconciliations)?.clear();
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_upload_job(&self, upload_job_id: &str) -> ReconResult<Option<UploadJob>> {
        Ok(read(&self.upload_jobs)?.get(upload_job_id).cloned())
    }

    async fn uploaded_records(&self, upload_job_id: &str) -> ReconResult<Vec<UploadedRecord>> {
        Ok(read(&self.uploaded_records)?
            .get(upload_job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn system_records(&self) -> ReconResult<Vec<SystemRecord>> {
        Ok(read(&self.system_records)?.clone())
    }
}

#[async_trait]
impl RecordSink for MemoryStore {
    async fn update_upload_job(&self, upload_job: &UploadJob) -> ReconResult<()> {
        let mut jobs = write(&self.upload_jobs)?;
        match jobs.get_mut(&upload_job.id) {
            Some(existing) => {
                *existing = upload_job.clone();
                Ok(())
            }
            None => Err(ReconciliationError::UploadJobNotFound(
                upload_job.id.clone(),
            )),
        }
    }

    async fn save_uploaded_records(
        &self,
        upload_job_id: &str,
        records: Vec<UploadedRecord>,
    ) -> ReconResult<()> {
        write(&self.uploaded_records)?.insert(upload_job_id.to_string(), records);
        Ok(())
    }

    async fn save_reconciliation(&self, run: &ReconciliationRun) -> ReconResult<()> {
        write(&self.reconciliations)?.insert(run.upload_job_id.clone(), run.clone());
        Ok(())
    }
}

/// Parser serving pre-parsed files from memory
#[derive(Debug, Clone, Default)]
pub struct MemoryUploadParser {
    files: Arc<RwLock<HashMap<String, Vec<UploadedRecord>>>>,
}

impl MemoryUploadParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rows a file for an upload job parses into
    pub fn add_file(&self, upload_job_id: &str, rows: Vec<UploadedRecord>) -> ReconResult<()> {
        write(&self.files)?.insert(upload_job_id.to_string(), rows);
        Ok(())
    }
}

#[async_trait]
impl UploadParser for MemoryUploadParser {
    async fn parse(&self, upload_job: &UploadJob) -> ReconResult<Vec<UploadedRecord>> {
        read(&self.files)?.get(&upload_job.id).cloned().ok_or_else(|| {
            ReconciliationError::Storage(format!(
                "No file contents for upload '{}' ({})",
                upload_job.id, upload_job.original_name
            ))
        })
    }
}
