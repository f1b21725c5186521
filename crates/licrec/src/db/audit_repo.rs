//! Audit event repository.
//!
//! Append-only by construction: this module exposes no UPDATE or DELETE
//! for audit events, and ordering follows insertion order (rowid).

use rusqlite::{params, Row};

use crate::model::AuditEvent;

use super::{format_ts, parse_ts, Database, DatabaseError};

fn from_row(row: &Row<'_>) -> Result<AuditEvent, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    Ok(AuditEvent {
        event_id: row.get("id")?,
        record_id: row.get("record_id")?,
        field: row.get("field")?,
        old_value: row.get("old_value")?,
        new_value: row.get("new_value")?,
        reviewer_id: row.get("reviewer_id")?,
        created_at: parse_ts(&created_at),
    })
}

pub fn append(db: &Database, event: &AuditEvent) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO audit_events (id, record_id, field, old_value, new_value,
             reviewer_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.record_id,
                event.field,
                event.old_value,
                event.new_value,
                event.reviewer_id,
                format_ts(event.created_at),
            ],
        )?;
        Ok(())
    })
}

/// All events for one record, in append order.
pub fn list_by_record(db: &Database, record_id: &str) -> Result<Vec<AuditEvent>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM audit_events WHERE record_id = ?1 ORDER BY rowid")?;
        let rows: Vec<AuditEvent> = stmt
            .query_map(params![record_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// The most recent event for one field of one record, if any.
pub fn latest_for_field(
    db: &Database,
    record_id: &str,
    field: &str,
) -> Result<Option<AuditEvent>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM audit_events WHERE record_id = ?1 AND field = ?2
             ORDER BY rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![record_id, field], from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn count_by_record(db: &Database, record_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_events WHERE record_id = ?1",
            params![record_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{record_repo, session_repo};
    use crate::model::{ProcessingSession, SessionMetrics, SessionStatus};
    use chrono::Utc;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        session_repo::insert(
            &db,
            &ProcessingSession {
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
        record_repo::insert(&db, &record_repo::tests::sample_record("r1")).unwrap();
        db
    }

    fn sample_event(id: &str, field: &str, new_value: &str) -> AuditEvent {
        AuditEvent {
            event_id: id.to_string(),
            record_id: "r1".to_string(),
            field: field.to_string(),
            old_value: "old".to_string(),
            new_value: new_value.to_string(),
            reviewer_id: "alice".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_list_in_order() {
        let db = test_db();
        append(&db, &sample_event("e1", "max_occupancy", "5")).unwrap();
        append(&db, &sample_event("e2", "max_occupancy", "6")).unwrap();
        append(&db, &sample_event("e3", "council", "Fife Council")).unwrap();

        let events = list_by_record(&db, "r1").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_id, "e1");
        assert_eq!(events[1].event_id, "e2");
        assert_eq!(events[2].event_id, "e3");
    }

    #[test]
    fn test_identical_events_never_merge() {
        let db = test_db();
        append(&db, &sample_event("e1", "max_occupancy", "6")).unwrap();
        append(&db, &sample_event("e2", "max_occupancy", "6")).unwrap();

        assert_eq!(count_by_record(&db, "r1").unwrap(), 2);
    }

    #[test]
    fn test_latest_for_field() {
        let db = test_db();
        append(&db, &sample_event("e1", "max_occupancy", "5")).unwrap();
        append(&db, &sample_event("e2", "max_occupancy", "6")).unwrap();
        append(&db, &sample_event("e3", "council", "Fife Council")).unwrap();

        let latest = latest_for_field(&db, "r1", "max_occupancy").unwrap().unwrap();
        assert_eq!(latest.event_id, "e2");
        assert_eq!(latest.new_value, "6");

        assert!(latest_for_field(&db, "r1", "reference").unwrap().is_none());
    }

    #[test]
    fn test_count_empty() {
        let db = test_db();
        assert_eq!(count_by_record(&db, "r1").unwrap(), 0);
    }
}
