//! Job repository — durable storage behind the processing queue.
//!
//! The lease claim is one conditional UPDATE picking the oldest eligible
//! job: either queued with its backoff delay elapsed, or running with an
//! expired lease (a crashed or timed-out worker). Attempt counting happens
//! at claim time so it survives worker restarts.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub session_id: String,
    pub document_path: String,
    pub format: String,
    pub state: String,
    pub attempt_count: u32,
    pub max_retries: u32,
    pub leased_by: Option<String>,
    pub lease_expires_at: Option<String>,
    pub next_attempt_at: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            document_path: row.get("document_path")?,
            format: row.get("format")?,
            state: row.get("state")?,
            attempt_count: row.get("attempt_count")?,
            max_retries: row.get("max_retries")?,
            leased_by: row.get("leased_by")?,
            lease_expires_at: row.get("lease_expires_at")?,
            next_attempt_at: row.get("next_attempt_at")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, session_id, document_path, format, state, attempt_count,
             max_retries, leased_by, lease_expires_at, next_attempt_at, error, created_at,
             updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                job.id,
                job.session_id,
                job.document_path,
                job.format,
                job.state,
                job.attempt_count,
                job.max_retries,
                job.leased_by,
                job.lease_expires_at,
                job.next_attempt_at,
                job.error,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn list_by_session(db: &Database, session_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM jobs WHERE session_id = ?1 ORDER BY created_at, id")?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![session_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Atomically claims the next eligible job for `worker_id`.
///
/// Eligible: `queued` whose `next_attempt_at` has passed, or `running`
/// whose lease expired. The claim moves the job to `running`, stamps the
/// lease, and counts the attempt — all in one statement, so two workers
/// can never both claim the same job.
pub fn lease_next(
    db: &Database,
    worker_id: &str,
    now: &str,
    lease_expires_at: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "UPDATE jobs SET state = 'running', leased_by = ?1, lease_expires_at = ?2,
                 attempt_count = attempt_count + 1, updated_at = ?3
                 WHERE id = (
                     SELECT id FROM jobs
                     WHERE (state = 'queued'
                            AND (next_attempt_at IS NULL OR next_attempt_at <= ?3))
                        OR (state = 'running' AND lease_expires_at < ?3)
                     ORDER BY created_at, id
                     LIMIT 1
                 )
                 RETURNING *",
                params![worker_id, lease_expires_at, now],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Marks a job succeeded. Fails (returns false) when the caller no longer
/// holds the lease — its claim expired and another worker took over.
pub fn complete(
    db: &Database,
    id: &str,
    worker_id: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'succeeded', leased_by = NULL, lease_expires_at = NULL,
             error = NULL, completed_at = ?3, updated_at = ?3
             WHERE id = ?1 AND state = 'running' AND leased_by = ?2",
            params![id, worker_id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Returns a job to the queue for a later attempt (transient failure).
pub fn requeue(
    db: &Database,
    id: &str,
    worker_id: &str,
    next_attempt_at: &str,
    error: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'queued', leased_by = NULL, lease_expires_at = NULL,
             next_attempt_at = ?3, error = ?4, updated_at = ?5
             WHERE id = ?1 AND state = 'running' AND leased_by = ?2",
            params![id, worker_id, next_attempt_at, error, now],
        )?;
        Ok(changed == 1)
    })
}

/// Terminal failure.
pub fn fail(
    db: &Database,
    id: &str,
    worker_id: &str,
    error: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'failed', leased_by = NULL, lease_expires_at = NULL,
             error = ?3, completed_at = ?4, updated_at = ?4
             WHERE id = ?1 AND state = 'running' AND leased_by = ?2",
            params![id, worker_id, error, now],
        )?;
        Ok(changed == 1)
    })
}

/// Marks every still-queued job of a session as skipped (cancellation).
/// In-flight jobs are left to finish normally.
pub fn skip_queued(db: &Database, session_id: &str, now: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'skipped', updated_at = ?2
             WHERE session_id = ?1 AND state = 'queued'",
            params![session_id, now],
        )?;
        Ok(changed as u64)
    })
}

/// Re-queues a session's failed jobs for a fresh session attempt.
pub fn requeue_failed(db: &Database, session_id: &str, now: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'queued', attempt_count = 0, next_attempt_at = NULL,
             error = NULL, completed_at = NULL, updated_at = ?2
             WHERE session_id = ?1 AND state = 'failed'",
            params![session_id, now],
        )?;
        Ok(changed as u64)
    })
}

/// Number of jobs of a session that are not yet terminal.
pub fn count_open(db: &Database, session_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE session_id = ?1 AND state IN ('queued', 'running')",
            params![session_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

pub fn count_in_state(db: &Database, session_id: &str, state: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE session_id = ?1 AND state = ?2",
            params![session_id, state],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Queue-wide counts by state.
pub fn counts_by_state(
    db: &Database,
) -> Result<std::collections::BTreeMap<String, u64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?;
        let mut counts = std::collections::BTreeMap::new();
        for row in rows {
            let (state, count) = row?;
            counts.insert(state, count);
        }
        Ok(counts)
    })
}
