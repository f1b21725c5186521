use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};
use tokio::sync::broadcast;

use crate::audit;
use crate::db::record_repo;
use crate::pipeline::{
    BroadcastProgress, JobProgressEvent, NoopProgress, Pipeline, PipelineConfig, PipelineContext,
    ProgressReporter,
};
use crate::queue::{FailureKind, JobQueue, LeasedJob};
use crate::worker::job::{classify_failure, JobOutcome};

pub struct WorkerPool {
    result_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(queue: JobQueue, config: Arc<PipelineConfig>, worker_count: usize) -> Self {
        Self::with_progress_sender(queue, config, worker_count, None)
    }

    /// Creates a new worker pool with an optional job progress broadcaster.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn with_progress_sender(
        queue: JobQueue,
        config: Arc<PipelineConfig>,
        worker_count: usize,
        progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (result_sender, result_receiver) = bounded::<JobOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let worker_queue = queue.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_config = Arc::clone(&config);
            let sender = progress_sender.clone();

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    worker_queue,
                    result_tx,
                    shutdown_flag,
                    worker_config,
                    sender,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn try_recv_outcome(&self) -> Option<JobOutcome> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    queue: JobQueue,
    result_sender: Sender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    config: Arc<PipelineConfig>,
    progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
) {
    debug!("Worker {} started", worker_id);

    let pipeline = Pipeline::from_config(Arc::clone(&config));
    let worker_name = format!("worker-{}", worker_id);
    let poll_interval = queue.poll_interval();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match queue.lease(&worker_name) {
            Ok(Some(leased)) => {
                debug!("Worker {} processing job {}", worker_id, leased.job.id);
                let outcome = process_job(&pipeline, &queue, &config, &leased, &progress_sender);

                if result_sender.send(outcome).is_err() {
                    debug!("Worker {} result channel closed", worker_id);
                    break;
                }
            }
            Ok(None) => {
                thread::sleep(poll_interval);
            }
            Err(e) => {
                error!("Worker {} failed to poll queue: {}", worker_id, e);
                thread::sleep(poll_interval);
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn process_job(
    pipeline: &Pipeline,
    queue: &JobQueue,
    config: &PipelineConfig,
    leased: &LeasedJob,
    progress_sender: &Option<Arc<broadcast::Sender<JobProgressEvent>>>,
) -> JobOutcome {
    let reporter: Box<dyn ProgressReporter> = match progress_sender {
        Some(sender) => Box::new(BroadcastProgress::new(
            &leased.job.id,
            &leased.job.session_id,
            Arc::clone(sender),
        )),
        None => Box::new(NoopProgress),
    };

    let ctx = PipelineContext::new(leased.job.clone());
    let (result, _ctx) = pipeline.run(ctx, reporter.as_ref());

    match result {
        Ok(record) => {
            // Persistence failures are infrastructure trouble; the document
            // itself is fine, so the attempt goes back to the queue.
            if let Err(e) = record_repo::insert(queue.database(), &record) {
                error!("Failed to persist record for job {}: {}", leased.job.id, e);
                let message = format!("record persistence failed: {}", e);
                report_nack(queue, leased, FailureKind::Transient, &message);
                return JobOutcome::failure(&leased.job, message);
            }

            match audit::auto_accept_if_eligible(queue.database(), &config.review, &record) {
                Ok(true) => debug!("Record {} auto-accepted", record.record_id),
                Ok(false) => {}
                Err(e) => error!("Auto-accept check failed for {}: {}", record.record_id, e),
            }

            if let Err(e) = queue.ack(leased) {
                error!("Failed to ack job {}: {}", leased.job.id, e);
                return JobOutcome::failure(&leased.job, e.to_string());
            }

            JobOutcome::success(&leased.job, record.record_id, record.flagged)
        }
        Err(e) => {
            let kind = classify_failure(&e);
            let message = e.to_string();
            report_nack(queue, leased, kind, &message);
            JobOutcome::failure(&leased.job, message)
        }
    }
}

fn report_nack(queue: &JobQueue, leased: &LeasedJob, kind: FailureKind, message: &str) {
    if let Err(e) = queue.nack(leased, kind, message) {
        error!("Failed to nack job {}: {}", leased.job.id, e);
    }
}
