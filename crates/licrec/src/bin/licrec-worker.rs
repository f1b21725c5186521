//! Worker daemon: pulls document jobs from the durable queue and runs them
//! through the extraction pipeline until interrupted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use licrec::config::{load_config, load_config_from_str};
use licrec::db::{self, Database};
use licrec::error::{ConfigError, LicrecError};
use licrec::pipeline::PipelineConfig;
use licrec::queue::JobQueue;
use licrec::worker::WorkerPool;

fn main() {
    if let Err(e) = run() {
        eprintln!("licrec-worker: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), LicrecError> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(path)?,
        None => load_config_from_str(r#"{"version": "1.0"}"#)?,
    };

    let db_path = config
        .database_path
        .as_ref()
        .map(PathBuf::from)
        .or_else(db::default_database_path)
        .ok_or_else(|| ConfigError::Validation {
            message: "no database path configured and no home directory found".to_string(),
        })?;
    let database = Database::open(&db_path)?;

    let queue = JobQueue::new(database, config.queue.clone());
    let pipeline_config = Arc::new(PipelineConfig::from_config(&config));
    let pool = WorkerPool::new(queue, pipeline_config, config.worker_count);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            tracing::info!("Interrupt received, shutting down");
            interrupted.store(true, Ordering::Relaxed);
        })
        .expect("failed to install signal handler");
    }

    tracing::info!(
        workers = config.worker_count,
        database = %db_path.display(),
        "licrec worker pool running"
    );

    while !interrupted.load(Ordering::Relaxed) {
        if let Some(outcome) = pool.recv_outcome_timeout(Duration::from_millis(500)) {
            if outcome.success {
                tracing::info!(
                    job_id = %outcome.job_id,
                    record_id = outcome.record_id.as_deref().unwrap_or(""),
                    flagged = outcome.flagged.unwrap_or(false),
                    "job succeeded"
                );
            } else {
                tracing::warn!(
                    job_id = %outcome.job_id,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "job failed"
                );
            }
        }
    }

    pool.shutdown();
    pool.wait();
    Ok(())
}

fn init_tracing() {
    // Bridge `log` records from the storage and queue modules into tracing,
    // then install the fmt subscriber without its own log bridge.
    let _ = tracing_log::LogTracer::init();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
