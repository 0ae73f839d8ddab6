// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema migrations, embedded from `migrations/` at compile time.

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Bring the schema up to date. Already-applied versions are skipped using
/// refinery's `refinery_schema_history` table.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), refinery::Error> {
    let report = embedded::migrations::runner().run(conn)?;
    let applied = report.applied_migrations();
    if !applied.is_empty() {
        tracing::info!(
            count = applied.len(),
            latest = applied.last().map(|m| m.version()),
            "schema migrated"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &rusqlite::Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn creates_schema_and_is_idempotent() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let tables = tables(&conn);
        for expected in ["dead_letters", "delivery_queue", "scheduled_messages"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}: {tables:?}");
        }
    }

    #[test]
    fn queue_table_carries_only_lease_state() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(delivery_queue)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            columns,
            [
                "id",
                "message_id",
                "receipt",
                "state",
                "attempts",
                "max_attempts",
                "visible_at",
                "enqueued_at",
                "updated_at",
            ]
        );
    }
}
