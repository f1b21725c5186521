//! Session repository — persistence for `ProcessingSession`.
//!
//! Status updates are guarded in SQL so a session can never regress from a
//! terminal state within the same attempt; only `begin_retry` leaves
//! `failed`, and it does so by starting a new attempt.

use chrono::Utc;
use rusqlite::{params, Row};

use crate::model::{ProcessingSession, SessionMetrics, SessionStatus};

use super::{format_ts, parse_ts, Database, DatabaseError};

fn from_row(row: &Row<'_>) -> Result<ProcessingSession, rusqlite::Error> {
    let status: String = row.get("status")?;
    let metrics_json: Option<String> = row.get("metrics")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(ProcessingSession {
        session_id: row.get("id")?,
        file_name: row.get("file_name")?,
        file_size: row.get::<_, i64>("file_size")? as u64,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Failed),
        attempt_count: row.get("attempt_count")?,
        error: row.get("error")?,
        metrics: metrics_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default(),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn metrics_json(metrics: &SessionMetrics) -> Result<String, DatabaseError> {
    serde_json::to_string(metrics).map_err(|e| DatabaseError::Decode {
        table: "sessions",
        reason: e.to_string(),
    })
}

pub fn insert(db: &Database, session: &ProcessingSession) -> Result<(), DatabaseError> {
    let metrics = metrics_json(&session.metrics)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sessions (id, file_name, file_size, status, attempt_count, error,
             metrics, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.session_id,
                session.file_name,
                session.file_size as i64,
                session.status.as_str(),
                session.attempt_count,
                session.error,
                metrics,
                format_ts(session.created_at),
                format_ts(session.updated_at),
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ProcessingSession>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM sessions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn list(db: &Database) -> Result<Vec<ProcessingSession>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY created_at DESC")?;
        let rows: Vec<ProcessingSession> = stmt
            .query_map([], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves a session into `processing`. Only valid from `queued` or
/// `processing` (a second job of the same session is a no-op transition).
pub fn mark_processing(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    let now = format_ts(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE sessions SET status = 'processing', updated_at = ?2
             WHERE id = ?1 AND status IN ('queued', 'processing')",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Completes a session, storing its final aggregate metrics. `queued` is
/// accepted as a starting state for sessions cancelled before any job ran.
pub fn mark_completed(
    db: &Database,
    id: &str,
    metrics: &SessionMetrics,
) -> Result<bool, DatabaseError> {
    let now = format_ts(Utc::now());
    let metrics = metrics_json(metrics)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE sessions SET status = 'completed', metrics = ?2, error = NULL, updated_at = ?3
             WHERE id = ?1 AND status IN ('queued', 'processing')",
            params![id, metrics, now],
        )?;
        Ok(changed == 1)
    })
}

pub fn mark_failed(db: &Database, id: &str, error: &str) -> Result<bool, DatabaseError> {
    let now = format_ts(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE sessions SET status = 'failed', error = ?2, updated_at = ?3
             WHERE id = ?1 AND status IN ('queued', 'processing')",
            params![id, error, now],
        )?;
        Ok(changed == 1)
    })
}

/// Starts a new attempt for a failed session: back to `queued` with an
/// incremented attempt counter. Session identity is untouched.
pub fn begin_retry(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    let now = format_ts(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE sessions SET status = 'queued', attempt_count = attempt_count + 1,
             error = NULL, updated_at = ?2
             WHERE id = ?1 AND status = 'failed'",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

pub fn update_metrics(
    db: &Database,
    id: &str,
    metrics: &SessionMetrics,
) -> Result<(), DatabaseError> {
    let now = format_ts(Utc::now());
    let metrics = metrics_json(metrics)?;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE sessions SET metrics = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, metrics, now],
        )?;
        Ok(())
    })
}

/// Deletes terminal sessions older than the cutoff along with their
/// records, audit events and jobs. Returns the number of sessions purged.
pub fn purge_older_than(db: &Database, cutoff: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM audit_events WHERE record_id IN (
                SELECT r.id FROM records r
                JOIN sessions s ON s.id = r.session_id
                WHERE s.status IN ('completed', 'failed') AND s.created_at < ?1
            )",
            params![cutoff],
        )?;
        conn.execute(
            "DELETE FROM records WHERE session_id IN (
                SELECT id FROM sessions
                WHERE status IN ('completed', 'failed') AND created_at < ?1
            )",
            params![cutoff],
        )?;
        conn.execute(
            "DELETE FROM jobs WHERE session_id IN (
                SELECT id FROM sessions
                WHERE status IN ('completed', 'failed') AND created_at < ?1
            )",
            params![cutoff],
        )?;
        let purged = conn.execute(
            "DELETE FROM sessions WHERE status IN ('completed', 'failed') AND created_at < ?1",
            params![cutoff],
        )?;
        Ok(purged as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_session(id: &str) -> ProcessingSession {
        let now = Utc::now();
        ProcessingSession {
            session_id: id.to_string(),
            file_name: "register.pdf".to_string(),
            file_size: 1024,
            status: SessionStatus::Queued,
            attempt_count: 0,
            error: None,
            metrics: SessionMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_session("s1")).unwrap();

        let found = find_by_id(&db, "s1").unwrap().unwrap();
        assert_eq!(found.file_name, "register.pdf");
        assert_eq!(found.status, SessionStatus::Queued);
        assert_eq!(found.attempt_count, 0);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_status_progression() {
        let db = test_db();
        insert(&db, &sample_session("s2")).unwrap();

        assert!(mark_processing(&db, "s2").unwrap());
        assert!(mark_completed(&db, "s2", &SessionMetrics::default()).unwrap());

        let found = find_by_id(&db, "s2").unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Completed);
    }

    #[test]
    fn test_completed_session_cannot_reenter_processing() {
        let db = test_db();
        insert(&db, &sample_session("s3")).unwrap();
        mark_processing(&db, "s3").unwrap();
        mark_completed(&db, "s3", &SessionMetrics::default()).unwrap();

        assert!(!mark_processing(&db, "s3").unwrap());
        assert!(!mark_failed(&db, "s3", "late failure").unwrap());

        let found = find_by_id(&db, "s3").unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Completed);
    }

    #[test]
    fn test_failed_session_cannot_silently_resume() {
        let db = test_db();
        insert(&db, &sample_session("s4")).unwrap();
        mark_processing(&db, "s4").unwrap();
        mark_failed(&db, "s4", "store unavailable").unwrap();

        assert!(!mark_processing(&db, "s4").unwrap());
        assert!(!mark_completed(&db, "s4", &SessionMetrics::default()).unwrap());
    }

    #[test]
    fn test_retry_increments_attempt_and_requeues() {
        let db = test_db();
        insert(&db, &sample_session("s5")).unwrap();
        mark_processing(&db, "s5").unwrap();
        mark_failed(&db, "s5", "boom").unwrap();

        assert!(begin_retry(&db, "s5").unwrap());

        let found = find_by_id(&db, "s5").unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Queued);
        assert_eq!(found.attempt_count, 1);
        assert!(found.error.is_none());
    }

    #[test]
    fn test_retry_only_from_failed() {
        let db = test_db();
        insert(&db, &sample_session("s6")).unwrap();
        assert!(!begin_retry(&db, "s6").unwrap());
    }

    #[test]
    fn test_metrics_round_trip() {
        let db = test_db();
        insert(&db, &sample_session("s7")).unwrap();

        let mut metrics = SessionMetrics::default();
        metrics.total_records = 3;
        metrics.flagged_records = 1;
        metrics.mean_confidence = 0.82;
        update_metrics(&db, "s7", &metrics).unwrap();

        let found = find_by_id(&db, "s7").unwrap().unwrap();
        assert_eq!(found.metrics.total_records, 3);
        assert_eq!(found.metrics.flagged_records, 1);
        assert!((found.metrics.mean_confidence - 0.82).abs() < 1e-12);
    }

    #[test]
    fn test_purge_removes_only_old_terminal_sessions() {
        let db = test_db();
        let mut old = sample_session("old");
        old.created_at = Utc::now() - chrono::Duration::days(60);
        old.updated_at = old.created_at;
        insert(&db, &old).unwrap();
        mark_processing(&db, "old").unwrap();
        mark_completed(&db, "old", &SessionMetrics::default()).unwrap();

        insert(&db, &sample_session("fresh")).unwrap();

        let cutoff = format_ts(Utc::now() - chrono::Duration::days(30));
        let purged = purge_older_than(&db, &cutoff).unwrap();

        assert_eq!(purged, 1);
        assert!(find_by_id(&db, "old").unwrap().is_none());
        assert!(find_by_id(&db, "fresh").unwrap().is_some());
    }
}
