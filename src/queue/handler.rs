//! Job handlers and the mapping from job type to handler

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::queue::job::{JobError, JobPayload, JobType};

/// Executes one kind of job
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &JobPayload) -> Result<(), JobError>;

    /// Called once the queue has abandoned a job that ran past its timeout
    async fn on_timeout(&self, _payload: &JobPayload, _error: &JobError) {}
}

/// Adapter running a closure as a handler
pub struct FnHandler<F>(F);

impl<F, Fut> FnHandler<F>
where
    F: Fn(JobPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    pub fn new(f: F) -> Arc<dyn JobHandler> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobPayload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send,
{
    async fn handle(&self, payload: &JobPayload) -> Result<(), JobError> {
        (self.0)(payload.clone()).await
    }
}

/// Handlers registered at startup, one slot per job type
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    file_processing: Option<Arc<dyn JobHandler>>,
    reconciliation: Option<Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a job type, replacing any previous one
    pub fn register(mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Self {
        match job_type {
            JobType::FileProcessing => self.file_processing = Some(handler),
            JobType::Reconciliation => self.reconciliation = Some(handler),
        }
        self
    }

    /// Handler for a job type, or `None` if nothing was registered
    pub fn handler_for(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        match job_type {
            JobType::FileProcessing => self.file_processing.clone(),
            JobType::Reconciliation => self.reconciliation.clone(),
        }
    }
}
