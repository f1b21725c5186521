//! Durable job queue over the `jobs` table.
//!
//! Formalizes the job state machine: `queued → running → {succeeded,
//! failed}`, with transient failures looping back to `queued` under
//! exponential backoff until the attempt budget is spent. The lease claim
//! in [`crate::db::job_repo`] is the only concurrency control — at most
//! one worker holds a job at a time, and a crashed worker's lease simply
//! expires.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::acquire::DocumentFormat;
use crate::config::QueueConfig;
use crate::db::{format_ts, job_repo, record_repo, session_repo, Database, DatabaseError};
use crate::model::{ProcessingSession, SessionMetrics, SessionStatus};
use crate::storage::DocumentStore;

#[derive(Error, Debug)]
pub enum QueueError {
    /// The worker's lease expired and the job was claimed by someone else.
    #[error("lease no longer held for job {job_id}")]
    LeaseLost { job_id: String },

    #[error("job row could not be decoded: {reason}")]
    Decode { reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// How a failed job should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth retrying: OCR engine hiccup, store unavailable, deadline
    /// overrun.
    Transient,
    /// Never retried: unsupported or corrupt input.
    Permanent,
}

/// One document's trip through the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub session_id: String,
    pub document_path: PathBuf,
    pub format: DocumentFormat,
    pub attempt_count: u32,
    pub max_retries: u32,
}

impl Job {
    fn from_row(row: job_repo::JobRow) -> Result<Self, QueueError> {
        let format = DocumentFormat::parse(&row.format).ok_or_else(|| QueueError::Decode {
            reason: format!("unknown document format '{}'", row.format),
        })?;
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            document_path: PathBuf::from(row.document_path),
            format,
            attempt_count: row.attempt_count,
            max_retries: row.max_retries,
        })
    }
}

/// A job together with the worker's claim on it.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job: Job,
    pub worker_id: String,
}

#[derive(Clone)]
pub struct JobQueue {
    db: Database,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(db: Database, config: QueueConfig) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// How long an idle worker should sleep between polls.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Registers an upload: creates the session, stores the bytes, and
    /// enqueues one processing job.
    pub fn submit_document(
        &self,
        store: &DocumentStore,
        file_name: &str,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> crate::error::Result<(ProcessingSession, Job)> {
        let now = Utc::now();
        let session = ProcessingSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            file_size: bytes.len() as u64,
            status: SessionStatus::Queued,
            attempt_count: 0,
            error: None,
            metrics: SessionMetrics::default(),
            created_at: now,
            updated_at: now,
        };
        session_repo::insert(&self.db, &session)?;

        let path = store.store(&session.session_id, file_name, bytes)?;
        let job = self.enqueue(&session.session_id, &path, format)?;

        log::info!(
            "Submitted document '{}' as session {} (job {})",
            file_name,
            session.session_id,
            job.id
        );
        Ok((session, job))
    }

    pub fn enqueue(
        &self,
        session_id: &str,
        document_path: &Path,
        format: DocumentFormat,
    ) -> Result<Job, QueueError> {
        let now = format_ts(Utc::now());
        let row = job_repo::JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            document_path: document_path.to_string_lossy().into_owned(),
            format: format.as_str().to_string(),
            state: "queued".to_string(),
            attempt_count: 0,
            max_retries: self.config.max_retries,
            leased_by: None,
            lease_expires_at: None,
            next_attempt_at: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        };
        job_repo::insert(&self.db, &row)?;
        Job::from_row(row)
    }

    /// Claims the next eligible job for this worker, if any.
    pub fn lease(&self, worker_id: &str) -> Result<Option<LeasedJob>, QueueError> {
        let now = Utc::now();
        let lease_expires = now + Duration::seconds(self.config.lease_seconds as i64);

        let Some(row) =
            job_repo::lease_next(&self.db, worker_id, &format_ts(now), &format_ts(lease_expires))?
        else {
            return Ok(None);
        };

        let job = Job::from_row(row)?;
        session_repo::mark_processing(&self.db, &job.session_id)?;

        Ok(Some(LeasedJob {
            job,
            worker_id: worker_id.to_string(),
        }))
    }

    /// Acknowledges successful processing and finalizes the session when
    /// this was its last open job.
    pub fn ack(&self, leased: &LeasedJob) -> Result<(), QueueError> {
        let now = format_ts(Utc::now());
        if !job_repo::complete(&self.db, &leased.job.id, &leased.worker_id, &now)? {
            return Err(QueueError::LeaseLost {
                job_id: leased.job.id.clone(),
            });
        }
        self.finalize_session_if_done(&leased.job.session_id)
    }

    /// Reports a failed attempt. Transient failures go back to the queue
    /// with exponential backoff until the attempt budget is exhausted;
    /// permanent failures (and exhausted budgets) are terminal.
    pub fn nack(
        &self,
        leased: &LeasedJob,
        kind: FailureKind,
        error: &str,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let now_str = format_ts(now);

        let terminal = match kind {
            FailureKind::Permanent => true,
            FailureKind::Transient => leased.job.attempt_count >= leased.job.max_retries,
        };

        let applied = if terminal {
            job_repo::fail(&self.db, &leased.job.id, &leased.worker_id, error, &now_str)?
        } else {
            let delay = backoff_delay(
                self.config.backoff_base_seconds,
                leased.job.attempt_count,
            );
            let next_attempt = format_ts(now + Duration::seconds(delay as i64));
            log::warn!(
                "Job {} attempt {} failed ({}); retrying in {}s",
                leased.job.id,
                leased.job.attempt_count,
                error,
                delay
            );
            job_repo::requeue(
                &self.db,
                &leased.job.id,
                &leased.worker_id,
                &next_attempt,
                error,
                &now_str,
            )?
        };

        if !applied {
            return Err(QueueError::LeaseLost {
                job_id: leased.job.id.clone(),
            });
        }

        if terminal {
            log::error!("Job {} failed terminally: {}", leased.job.id, error);
            self.finalize_session_if_done(&leased.job.session_id)?;
        }
        Ok(())
    }

    /// Cancels a session: queued jobs are skipped, in-flight jobs finish
    /// normally.
    pub fn cancel_session(&self, session_id: &str) -> Result<u64, QueueError> {
        let now = format_ts(Utc::now());
        let skipped = job_repo::skip_queued(&self.db, session_id, &now)?;
        self.finalize_session_if_done(session_id)?;
        Ok(skipped)
    }

    /// Starts a fresh attempt for a failed session: resets its failed jobs
    /// and re-queues them. Session identity and records are untouched.
    pub fn retry_session(&self, session_id: &str) -> Result<bool, QueueError> {
        if !session_repo::begin_retry(&self.db, session_id)? {
            return Ok(false);
        }
        let now = format_ts(Utc::now());
        let requeued = job_repo::requeue_failed(&self.db, session_id, &now)?;
        log::info!(
            "Retrying session {}: {} job(s) re-queued",
            session_id,
            requeued
        );
        Ok(true)
    }

    pub fn stats(&self) -> Result<BTreeMap<String, u64>, QueueError> {
        Ok(job_repo::counts_by_state(&self.db)?)
    }

    /// When a session has no open jobs left, settles its final status and
    /// aggregate metrics.
    fn finalize_session_if_done(&self, session_id: &str) -> Result<(), QueueError> {
        if job_repo::count_open(&self.db, session_id)? > 0 {
            return Ok(());
        }

        let failed = job_repo::count_in_state(&self.db, session_id, "failed")?;
        if failed > 0 {
            session_repo::mark_failed(
                &self.db,
                session_id,
                &format!("{} job(s) failed terminally", failed),
            )?;
            return Ok(());
        }

        let records = record_repo::list_by_session(&self.db, session_id)?;
        let processing_seconds = session_repo::find_by_id(&self.db, session_id)?
            .map(|s| (Utc::now() - s.created_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let metrics = SessionMetrics::from_records(&records, processing_seconds);
        session_repo::mark_completed(&self.db, session_id, &metrics)?;
        Ok(())
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped to avoid overflow.
fn backoff_delay(base_seconds: u64, attempt_count: u32) -> u64 {
    let exponent = attempt_count.saturating_sub(1).min(16);
    base_seconds.saturating_mul(1u64 << exponent)
}
