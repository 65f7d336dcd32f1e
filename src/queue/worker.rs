//! Single-worker job queue
//!
//! Submissions only append to the pending list and wake the worker; the one
//! worker task takes the oldest waiting job, runs its handler to completion,
//! records the terminal state, and immediately looks for the next job.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::queue::handler::HandlerRegistry;
use crate::queue::job::*;

/// Shared mutable state; only touched while holding the lock
#[derive(Default)]
struct QueueState {
    /// Every job in submission order
    jobs: Vec<Job>,
    index: HashMap<Uuid, usize>,
    /// Positions in `jobs` still waiting, oldest first
    pending: VecDeque<usize>,
    /// Position of the running job; doubles as the busy flag
    active: Option<usize>,
    stats: QueueStats,
    shutdown: bool,
}

impl QueueState {
    fn push(&mut self, job: Job) {
        let pos = self.jobs.len();
        self.index.insert(job.id, pos);
        self.jobs.push(job);
        self.pending.push_back(pos);
        self.stats.waiting += 1;
    }

    /// Start the oldest waiting job unless one is already running
    fn take_next(&mut self) -> Option<(Uuid, JobPayload)> {
        if self.active.is_some() {
            return None;
        }
        let pos = self.pending.pop_front()?;
        let job = &mut self.jobs[pos];
        job.start();
        self.active = Some(pos);
        self.stats.waiting -= 1;
        self.stats.active += 1;
        Some((job.id, job.payload.clone()))
    }

    fn finish(&mut self, outcome: &Result<(), JobError>) {
        if let Some(pos) = self.active.take() {
            self.jobs[pos].finish(outcome);
            self.stats.active -= 1;
            match outcome {
                Ok(()) => self.stats.completed += 1,
                Err(_) => self.stats.failed += 1,
            }
        }
    }
}

/// Lets the worker exit once the last queue handle is gone
struct StopOnDrop {
    state: Arc<Mutex<QueueState>>,
    wakeup: Arc<Notify>,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        lock(&self.state).shutdown = true;
        self.wakeup.notify_one();
    }
}

/// Job queue executing at most one job at a time, in submission order
///
/// Cloning is cheap and every clone talks to the same worker. Dropping the
/// last clone stops the worker after its current job, like
/// [`shutdown`](Self::shutdown) without the wait.
#[derive(Clone)]
pub struct JobQueue {
    state: Arc<Mutex<QueueState>>,
    wakeup: Arc<Notify>,
    stats_tx: Arc<watch::Sender<QueueStats>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    _stop: Arc<StopOnDrop>,
}

impl JobQueue {
    /// Start a queue with the given handlers and default configuration
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn start(handlers: HandlerRegistry) -> Self {
        Self::with_config(handlers, QueueConfig::default())
    }

    /// Start a queue with a custom configuration
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn with_config(handlers: HandlerRegistry, config: QueueConfig) -> Self {
        let state = Arc::new(Mutex::new(QueueState::default()));
        let wakeup = Arc::new(Notify::new());
        let (stats_tx, _) = watch::channel(QueueStats::default());
        let stats_tx = Arc::new(stats_tx);

        let worker = tokio::spawn(run_worker(
            Arc::clone(&state),
            Arc::clone(&wakeup),
            Arc::clone(&stats_tx),
            handlers,
            config,
        ));

        Self {
            _stop: Arc::new(StopOnDrop {
                state: Arc::clone(&state),
                wakeup: Arc::clone(&wakeup),
            }),
            state,
            wakeup,
            stats_tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Enqueue a job and return its descriptor without waiting for it to run
    pub fn submit(&self, payload: JobPayload) -> Result<Job, QueueError> {
        let job = Job::new(payload);
        {
            let mut state = lock(&self.state);
            if state.shutdown {
                return Err(QueueError::ShutDown);
            }
            state.push(job.clone());
            self.stats_tx.send_replace(state.stats);
        }

        debug!(job_id = %job.id, job_type = %job.job_type(), "Job submitted");
        self.wakeup.notify_one();
        Ok(job)
    }

    /// Enqueue parsing of an uploaded file
    pub fn submit_file_processing_job(
        &self,
        job_id: impl Into<String>,
    ) -> Result<Job, QueueError> {
        self.submit(JobPayload::FileProcessing {
            job_id: job_id.into(),
        })
    }

    /// Enqueue reconciliation of an upload on behalf of a user
    pub fn submit_reconciliation_job(
        &self,
        upload_job_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Job, QueueError> {
        self.submit(JobPayload::Reconciliation {
            upload_job_id: upload_job_id.into(),
            user_id: user_id.into(),
        })
    }

    /// Current job counts by state
    pub fn stats(&self) -> QueueStats {
        lock(&self.state).stats
    }

    /// Snapshot of a job by ID
    pub fn job(&self, id: Uuid) -> Option<Job> {
        let state = lock(&self.state);
        state.index.get(&id).map(|&pos| state.jobs[pos].clone())
    }

    /// Snapshot of every job, in submission order
    pub fn jobs(&self) -> Vec<Job> {
        lock(&self.state).jobs.clone()
    }

    /// Wait until no job is waiting or running
    ///
    /// Does not resolve after [`shutdown`](Self::shutdown) if jobs were left
    /// waiting.
    pub async fn wait_idle(&self) {
        let mut rx = self.stats_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(QueueStats::is_idle).await;
    }

    /// Stop accepting jobs and wait for the worker to finish its current job
    ///
    /// Jobs still waiting are left in the `waiting` state.
    pub async fn shutdown(&self) {
        lock(&self.state).shutdown = true;
        self.wakeup.notify_one();

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Job queue worker ended abnormally");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // State is updated in single assignments, so a poisoned lock is still usable
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_worker(
    state: Arc<Mutex<QueueState>>,
    wakeup: Arc<Notify>,
    stats_tx: Arc<watch::Sender<QueueStats>>,
    handlers: HandlerRegistry,
    config: QueueConfig,
) {
    info!("Job queue worker started");

    loop {
        let next = {
            let mut state = lock(&state);
            if state.shutdown {
                break;
            }
            let next = state.take_next();
            stats_tx.send_replace(state.stats);
            next
        };

        let Some((id, payload)) = next else {
            wakeup.notified().await;
            continue;
        };

        let job_type = payload.job_type();
        info!(job_id = %id, job_type = %job_type, "Job started");

        let outcome = execute(&handlers, payload, config.job_timeout()).await;
        match &outcome {
            Ok(()) => info!(job_id = %id, job_type = %job_type, "Job completed"),
            Err(e) => warn!(job_id = %id, job_type = %job_type, error = %e, "Job failed"),
        }

        {
            let mut state = lock(&state);
            state.finish(&outcome);
            stats_tx.send_replace(state.stats);
        }

        let delay = config.dispatch_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    info!("Job queue worker stopped");
}

/// Run the handler for a job in its own task so a panic cannot take down the
/// worker
async fn execute(
    handlers: &HandlerRegistry,
    payload: JobPayload,
    timeout: Option<Duration>,
) -> Result<(), JobError> {
    let job_type = payload.job_type();
    let handler = handlers
        .handler_for(job_type)
        .ok_or(JobError::UnknownJobType(job_type))?;

    let mut task = {
        let (handler, payload) = (Arc::clone(&handler), payload.clone());
        tokio::spawn(async move { handler.handle(&payload).await })
    };

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                let error = JobError::Timeout(limit);
                handler.on_timeout(&payload, &error).await;
                return Err(error);
            }
        },
        None => task.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(JobError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(JobError::HandlerFailure(e.to_string())),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::handler::FnHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn file_job(id: &str) -> JobPayload {
        JobPayload::FileProcessing {
            job_id: id.to_string(),
        }
    }

    fn job_id_of(payload: &JobPayload) -> String {
        match payload {
            JobPayload::FileProcessing { job_id } => job_id.clone(),
            JobPayload::Reconciliation { upload_job_id, .. } => upload_job_id.clone(),
        }
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let handlers = HandlerRegistry::new().register(
            JobType::FileProcessing,
            FnHandler::new(move |payload| {
                let seen = Arc::clone(&seen);
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    seen.lock().unwrap().push(job_id_of(&payload));
                    Ok(())
                }
            }),
        );
        let queue = JobQueue::start(handlers);

        for id in ["J1", "J2", "J3"] {
            queue.submit(file_job(id)).unwrap();
        }
        queue.wait_idle().await;

        assert_eq!(*order.lock().unwrap(), vec!["J1", "J2", "J3"]);
        assert_eq!(
            queue.stats(),
            QueueStats {
                waiting: 0,
                active: 0,
                completed: 3,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_never_two_jobs_at_once() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let handlers = HandlerRegistry::new().register(
            JobType::FileProcessing,
            FnHandler::new(move |_| {
                let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let queue = JobQueue::start(handlers);

        let mut submitters = Vec::new();
        for i in 0..4 {
            let queue = queue.clone();
            submitters.push(tokio::spawn(async move {
                for j in 0..5 {
                    queue.submit(file_job(&format!("{}-{}", i, j))).unwrap();
                    assert!(queue.stats().active <= 1);
                }
            }));
        }
        for s in submitters {
            s.await.unwrap();
        }
        queue.wait_idle().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().completed, 20);
    }

    #[tokio::test]
    async fn test_unregistered_type_fails_job() {
        let queue = JobQueue::start(HandlerRegistry::new());

        let job = queue.submit_reconciliation_job("upload-1", "1").unwrap();
        queue.wait_idle().await;

        let job = queue.job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("No handler registered for job type 'reconciliation'")
        );
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let handlers = HandlerRegistry::new().register(
            JobType::FileProcessing,
            FnHandler::new(|payload| async move {
                if job_id_of(&payload) == "boom" {
                    panic!("parser exploded");
                }
                Ok(())
            }),
        );
        let queue = JobQueue::start(handlers);

        let bad = queue.submit_file_processing_job("boom").unwrap();
        let good = queue.submit_file_processing_job("fine").unwrap();
        queue.wait_idle().await;

        let bad = queue.job(bad.id).unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(
            bad.error.as_deref(),
            Some("Handler panicked: parser exploded")
        );
        assert_eq!(queue.job(good.id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let handlers = HandlerRegistry::new().register(
            JobType::FileProcessing,
            FnHandler::new(|_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }),
        );
        let config = QueueConfig {
            job_timeout_ms: Some(20),
            ..QueueConfig::default()
        };
        let queue = JobQueue::with_config(handlers, config);

        let job = queue.submit_file_processing_job("slow").unwrap();
        queue.wait_idle().await;

        let job = queue.job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("Job timed out"));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let queue = JobQueue::start(HandlerRegistry::new());
        queue.shutdown().await;

        assert_eq!(
            queue.submit_file_processing_job("late"),
            Err(QueueError::ShutDown)
        );
    }

    #[tokio::test]
    async fn test_dropping_last_handle_stops_worker() {
        let queue = JobQueue::start(HandlerRegistry::new());
        let handle = lock(&queue.worker).take().unwrap();

        let clone = queue.clone();
        drop(queue);
        assert!(!handle.is_finished());

        drop(clone);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_jobs_listed_in_submission_order() {
        let queue = JobQueue::start(HandlerRegistry::new());
        let a = queue.submit_file_processing_job("a").unwrap();
        let b = queue.submit_file_processing_job("b").unwrap();
        queue.wait_idle().await;

        let ids: Vec<Uuid> = queue.jobs().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(queue.jobs().iter().all(|j| j.status.is_terminal()));
    }
}
