//! Record repository — persistence for `StructuredRecord`.
//!
//! All review-state transitions are conditional UPDATEs (compare-and-swap):
//! the WHERE clause names the state the caller believes the record is in,
//! and a zero row count means someone else got there first. This is the
//! sole defence against lost updates between concurrent reviewers.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::model::{ReviewStatus, StructuredRecord};

use super::{format_ts, parse_ts, Database, DatabaseError};

fn from_row(row: &Row<'_>) -> Result<StructuredRecord, rusqlite::Error> {
    let fields_json: String = row.get("fields")?;
    let review_status: String = row.get("review_status")?;
    let reservation: Option<String> = row.get("reservation_expires_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    let fields = serde_json::from_str(&fields_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;

    Ok(StructuredRecord {
        record_id: row.get("id")?,
        session_id: row.get("session_id")?,
        fields,
        overall_quality_score: row.get("overall_quality_score")?,
        flagged: row.get::<_, i64>("flagged")? != 0,
        review_status: ReviewStatus::parse(&review_status).unwrap_or(ReviewStatus::Pending),
        reviewer: row.get("reviewer")?,
        reservation_expires_at: reservation.as_deref().map(parse_ts),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn fields_json(record: &StructuredRecord) -> Result<String, DatabaseError> {
    serde_json::to_string(&record.fields).map_err(|e| DatabaseError::Decode {
        table: "records",
        reason: e.to_string(),
    })
}

pub fn insert(db: &Database, record: &StructuredRecord) -> Result<(), DatabaseError> {
    let fields = fields_json(record)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO records (id, session_id, fields, overall_quality_score, flagged,
             review_status, reviewer, reservation_expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.record_id,
                record.session_id,
                fields,
                record.overall_quality_score,
                record.flagged as i64,
                record.review_status.as_str(),
                record.reviewer,
                record.reservation_expires_at.map(format_ts),
                format_ts(record.created_at),
                format_ts(record.updated_at),
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<StructuredRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM records WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn list_by_session(
    db: &Database,
    session_id: &str,
) -> Result<Vec<StructuredRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM records WHERE session_id = ?1 ORDER BY created_at, id")?;
        let rows: Vec<StructuredRecord> = stmt
            .query_map(params![session_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Flagged records awaiting attention, oldest first.
pub fn list_flagged(
    db: &Database,
    session_id: Option<&str>,
) -> Result<Vec<StructuredRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let (sql, params_vec): (&str, Vec<&dyn rusqlite::types::ToSql>) = match session_id {
            Some(ref id) => (
                "SELECT * FROM records
                 WHERE flagged = 1 AND review_status IN ('pending', 'in_review') AND session_id = ?1
                 ORDER BY created_at, id",
                vec![id as &dyn rusqlite::types::ToSql],
            ),
            None => (
                "SELECT * FROM records
                 WHERE flagged = 1 AND review_status IN ('pending', 'in_review')
                 ORDER BY created_at, id",
                vec![],
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let rows: Vec<StructuredRecord> = stmt
            .query_map(params_vec.as_slice(), from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Attempts to reserve a record for review.
///
/// Succeeds when the record is `pending`, `reviewed` (explicit reopen), or
/// `in_review` with an expired reservation. Returns false when another
/// reviewer holds a live reservation or the record is rejected.
pub fn try_reserve(
    db: &Database,
    id: &str,
    reviewer: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let now = format_ts(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE records SET review_status = 'in_review', reviewer = ?2,
             reservation_expires_at = ?3, updated_at = ?4
             WHERE id = ?1 AND (
                 review_status IN ('pending', 'reviewed')
                 OR (review_status = 'in_review'
                     AND (reservation_expires_at IS NULL OR reservation_expires_at < ?4))
             )",
            params![id, reviewer, format_ts(expires_at), now],
        )?;
        Ok(changed == 1)
    })
}

/// Commits an updated record under a held reservation, releasing it and
/// moving to `new_status`. Returns false when the caller's reservation is
/// gone (expired and reclaimed, or never held) — the stale-write case.
pub fn commit_with_status(
    db: &Database,
    record: &StructuredRecord,
    reviewer: &str,
    new_status: ReviewStatus,
) -> Result<bool, DatabaseError> {
    let fields = fields_json(record)?;
    let now = format_ts(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE records SET fields = ?3, overall_quality_score = ?4, flagged = ?5,
             review_status = ?6, reviewer = NULL, reservation_expires_at = NULL, updated_at = ?7
             WHERE id = ?1 AND review_status = 'in_review' AND reviewer = ?2
               AND reservation_expires_at >= ?7",
            params![
                record.record_id,
                reviewer,
                fields,
                record.overall_quality_score,
                record.flagged as i64,
                new_status.as_str(),
                now,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Machine fast path: `pending` straight to `reviewed`. The caller checks
/// the quality thresholds; this only guards the state transition.
pub fn auto_accept(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    let now = format_ts(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE records SET review_status = 'reviewed', updated_at = ?2
             WHERE id = ?1 AND review_status = 'pending'",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::session_repo;
    use crate::model::{FieldState, SessionMetrics, SessionStatus};
    use crate::validate::Validity;
    use std::collections::BTreeMap;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        session_repo::insert(
            &db,
            &crate::model::ProcessingSession {
                session_id: "sess".to_string(),
                file_name: "doc.pdf".to_string(),
                file_size: 0,
                status: SessionStatus::Processing,
                attempt_count: 0,
                error: None,
                metrics: SessionMetrics::default(),
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        db
    }

    pub(crate) fn sample_record(id: &str) -> StructuredRecord {
        let mut fields = BTreeMap::new();
        fields.insert(
            "council".to_string(),
            FieldState {
                value: "Fife Council".to_string(),
                confidence: 0.9,
                validity: Validity::valid("Fife Council"),
            },
        );
        let now = Utc::now();
        StructuredRecord {
            record_id: id.to_string(),
            session_id: "sess".to_string(),
            fields,
            overall_quality_score: 0.5,
            flagged: true,
            review_status: ReviewStatus::Pending,
            reviewer: None,
            reservation_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn reservation_deadline() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::minutes(15)
    }

    #[test]
    fn test_insert_and_find_round_trip() {
        let db = test_db();
        insert(&db, &sample_record("r1")).unwrap();

        let found = find_by_id(&db, "r1").unwrap().unwrap();
        assert_eq!(found.session_id, "sess");
        assert_eq!(found.fields["council"].value, "Fife Council");
        assert!(found.fields["council"].validity.is_valid());
        assert!(found.flagged);
        assert_eq!(found.review_status, ReviewStatus::Pending);
    }

    #[test]
    fn test_list_flagged() {
        let db = test_db();
        insert(&db, &sample_record("r1")).unwrap();
        let mut clean = sample_record("r2");
        clean.flagged = false;
        insert(&db, &clean).unwrap();

        let flagged = list_flagged(&db, None).unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].record_id, "r1");

        let scoped = list_flagged(&db, Some("sess")).unwrap();
        assert_eq!(scoped.len(), 1);
        let none = list_flagged(&db, Some("other")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_reserve_excludes_second_reviewer() {
        let db = test_db();
        insert(&db, &sample_record("r1")).unwrap();

        assert!(try_reserve(&db, "r1", "alice", reservation_deadline()).unwrap());
        // Bob cannot take a record Alice holds.
        assert!(!try_reserve(&db, "r1", "bob", reservation_deadline()).unwrap());

        let found = find_by_id(&db, "r1").unwrap().unwrap();
        assert_eq!(found.review_status, ReviewStatus::InReview);
        assert_eq!(found.reviewer.as_deref(), Some("alice"));
    }

    #[test]
    fn test_expired_reservation_is_reclaimable() {
        let db = test_db();
        insert(&db, &sample_record("r1")).unwrap();

        let already_expired = Utc::now() - chrono::Duration::minutes(1);
        assert!(try_reserve(&db, "r1", "alice", already_expired).unwrap());
        assert!(try_reserve(&db, "r1", "bob", reservation_deadline()).unwrap());

        let found = find_by_id(&db, "r1").unwrap().unwrap();
        assert_eq!(found.reviewer.as_deref(), Some("bob"));
    }

    #[test]
    fn test_commit_requires_live_reservation() {
        let db = test_db();
        let record = sample_record("r1");
        insert(&db, &record).unwrap();

        // No reservation at all.
        assert!(!commit_with_status(&db, &record, "alice", ReviewStatus::Reviewed).unwrap());

        // Reservation held by someone else.
        try_reserve(&db, "r1", "bob", reservation_deadline()).unwrap();
        assert!(!commit_with_status(&db, &record, "alice", ReviewStatus::Reviewed).unwrap());

        // Held by the committer: succeeds and releases.
        assert!(commit_with_status(&db, &record, "bob", ReviewStatus::Reviewed).unwrap());
        let found = find_by_id(&db, "r1").unwrap().unwrap();
        assert_eq!(found.review_status, ReviewStatus::Reviewed);
        assert!(found.reviewer.is_none());
        assert!(found.reservation_expires_at.is_none());
    }

    #[test]
    fn test_commit_with_expired_reservation_rejected() {
        let db = test_db();
        let record = sample_record("r1");
        insert(&db, &record).unwrap();

        let already_expired = Utc::now() - chrono::Duration::minutes(1);
        try_reserve(&db, "r1", "alice", already_expired).unwrap();

        assert!(!commit_with_status(&db, &record, "alice", ReviewStatus::Reviewed).unwrap());
    }

    #[test]
    fn test_rejected_record_cannot_be_reserved() {
        let db = test_db();
        let record = sample_record("r1");
        insert(&db, &record).unwrap();

        try_reserve(&db, "r1", "alice", reservation_deadline()).unwrap();
        commit_with_status(&db, &record, "alice", ReviewStatus::Rejected).unwrap();

        assert!(!try_reserve(&db, "r1", "bob", reservation_deadline()).unwrap());
    }

    #[test]
    fn test_reviewed_record_can_be_reopened() {
        let db = test_db();
        let record = sample_record("r1");
        insert(&db, &record).unwrap();

        try_reserve(&db, "r1", "alice", reservation_deadline()).unwrap();
        commit_with_status(&db, &record, "alice", ReviewStatus::Reviewed).unwrap();

        assert!(try_reserve(&db, "r1", "alice", reservation_deadline()).unwrap());
    }

    #[test]
    fn test_auto_accept_only_from_pending() {
        let db = test_db();
        insert(&db, &sample_record("r1")).unwrap();

        assert!(auto_accept(&db, "r1").unwrap());
        let found = find_by_id(&db, "r1").unwrap().unwrap();
        assert_eq!(found.review_status, ReviewStatus::Reviewed);

        // Second call finds nothing pending.
        assert!(!auto_accept(&db, "r1").unwrap());
    }
}
