use std::path::Path;

use anyhow::Result;
use rusqlite::{params, Connection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{AlertEvent, AlertState};

/// Local SQLite archive of alert events.
///
/// The backend's event list carries no stable identifier, so the archive
/// keys on the composite (timestamp, ear_value) and ignores re-inserts of
/// rows it has already seen. The displayed list still comes straight from
/// the backend each poll; the archive only preserves history across runs.
pub fn init(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    info!("Initializing event archive at {}", path.display());
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL,
            ear_value REAL NOT NULL,
            alert_type TEXT NOT NULL,
            UNIQUE (timestamp, ear_value)
        )",
        [],
    )?;
    Ok(())
}

/// Appends events not already archived. Returns how many rows were new.
pub fn record_events(conn: &Connection, events: &[AlertEvent]) -> Result<usize> {
    let mut inserted = 0;
    for event in events {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO events (timestamp, ear_value, alert_type) VALUES (?1, ?2, ?3)",
            params![event.timestamp, event.ear_value, event.alert_type.as_str()],
        )?;
    }
    if inserted > 0 {
        debug!(inserted, "Archived new alert events");
    }
    Ok(inserted)
}

/// Most recent archived events, newest first. Ids are regenerated on read,
/// matching the backend list's per-fetch identity.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<AlertEvent>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, ear_value, alert_type FROM events ORDER BY timestamp DESC LIMIT ?",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (timestamp, ear_value, alert_type) = row?;
        events.push(AlertEvent {
            id: Uuid::new_v4(),
            ear_value,
            alert_type: AlertState::parse(&alert_type).unwrap_or(AlertState::Warning),
            timestamp,
            duration: 0,
        });
    }
    Ok(events)
}

pub fn count(conn: &Connection) -> Result<u64> {
    let total = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_archive() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn
    }

    fn event(timestamp: &str, ear: f64) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            ear_value: ear,
            alert_type: AlertState::Warning,
            timestamp: timestamp.to_string(),
            duration: 0,
        }
    }

    #[test]
    fn refetched_events_are_deduplicated() {
        let conn = memory_archive();
        let batch = vec![
            event("2026-08-29T10:00:00Z", 0.18),
            event("2026-08-29T10:00:01Z", 0.16),
        ];

        assert_eq!(record_events(&conn, &batch).unwrap(), 2);
        // A second poll returns the same rows under fresh ids.
        let refetched = vec![
            event("2026-08-29T10:00:00Z", 0.18),
            event("2026-08-29T10:00:01Z", 0.16),
            event("2026-08-29T10:00:02Z", 0.14),
        ];
        assert_eq!(record_events(&conn, &refetched).unwrap(), 1);
        assert_eq!(count(&conn).unwrap(), 3);
    }

    #[test]
    fn same_timestamp_different_ear_is_distinct() {
        let conn = memory_archive();
        let batch = vec![
            event("2026-08-29T10:00:00Z", 0.18),
            event("2026-08-29T10:00:00Z", 0.21),
        ];
        assert_eq!(record_events(&conn, &batch).unwrap(), 2);
    }

    #[test]
    fn recent_returns_newest_first() {
        let conn = memory_archive();
        let batch = vec![
            event("2026-08-29T10:00:00Z", 0.18),
            event("2026-08-29T10:00:05Z", 0.12),
            event("2026-08-29T10:00:02Z", 0.16),
        ];
        record_events(&conn, &batch).unwrap();

        let recent = recent(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, "2026-08-29T10:00:05Z");
        assert_eq!(recent[1].timestamp, "2026-08-29T10:00:02Z");
        assert_eq!(recent[0].alert_type, AlertState::Warning);
    }
}
