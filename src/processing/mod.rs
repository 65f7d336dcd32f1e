//! Job handlers wiring the queue to storage and the reconciliation engine

pub mod file;
pub mod reconcile;

pub use file::*;
pub use reconcile::*;

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::queue::{HandlerRegistry, JobQueue, JobType};
use crate::reconciliation::ReconciliationEngine;
use crate::traits::*;
use crate::types::*;

/// Start a queue with the standard file-processing and reconciliation
/// handlers registered
///
/// # Panics
/// Panics if called outside a Tokio runtime.
pub fn start_queue<S, P>(
    store: Arc<S>,
    parser: Arc<P>,
    config: CoreConfig,
) -> ReconResult<JobQueue>
where
    S: RecordStore + RecordSink + 'static,
    P: UploadParser + 'static,
{
    config.validate()?;
    let engine = ReconciliationEngine::with_config(config.reconciliation)?;

    let handlers = HandlerRegistry::new()
        .register(
            JobType::FileProcessing,
            Arc::new(FileProcessingHandler::new(Arc::clone(&store), parser)),
        )
        .register(
            JobType::Reconciliation,
            Arc::new(ReconciliationHandler::with_engine(store, engine)),
        );

    Ok(JobQueue::with_config(handlers, config.queue))
}
