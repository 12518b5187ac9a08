//! Database schema migrations.
//!
//! Applies the initial schema: vehicles, maintenance_records, chat_history,
//! and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use carcare_core::error::CarCareError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), CarCareError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| CarCareError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| CarCareError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema. Timestamps are epoch milliseconds.
fn apply_v1(conn: &Connection) -> Result<(), CarCareError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vehicles (
            id              TEXT PRIMARY KEY NOT NULL,
            user_id         TEXT NOT NULL,
            make            TEXT NOT NULL,
            model           TEXT NOT NULL,
            year            INTEGER NOT NULL
                            CHECK (year BETWEEN 1900 AND 2100),
            vin             TEXT NOT NULL UNIQUE,
            mileage         INTEGER NOT NULL CHECK (mileage >= 0),
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_vehicles_user
            ON vehicles (user_id, created_at ASC);

        CREATE INDEX IF NOT EXISTS idx_vehicles_identity
            ON vehicles (user_id, make, model, year);

        CREATE TABLE IF NOT EXISTS maintenance_records (
            id              TEXT PRIMARY KEY NOT NULL,
            vehicle_id      TEXT NOT NULL,
            service_type    TEXT NOT NULL,
            description     TEXT,
            notes           TEXT,
            date_performed  INTEGER NOT NULL,
            mileage         INTEGER NOT NULL CHECK (mileage >= 0),
            cost            REAL NOT NULL CHECK (cost >= 0),
            parts_used      TEXT,
            created_at      INTEGER NOT NULL,
            FOREIGN KEY (vehicle_id) REFERENCES vehicles(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_maintenance_vehicle_date
            ON maintenance_records (vehicle_id, date_performed DESC);

        CREATE TABLE IF NOT EXISTS chat_history (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL,
            role            TEXT NOT NULL
                            CHECK (role IN ('user', 'assistant')),
            content         TEXT NOT NULL,
            vehicle_context TEXT,
            timestamp       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_history_user
            ON chat_history (user_id, seq ASC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| CarCareError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn insert_vehicle(conn: &Connection, id: &str, vin: &str) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO vehicles (id, user_id, make, model, year, vin, mileage, created_at)
             VALUES (?1, 'local', 'Honda', 'Civic', 2020, ?2, 1000, 0)",
            rusqlite::params![id, vin],
        )
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_vin_unique() {
        let conn = open_test_conn();
        insert_vehicle(&conn, "v1", "VIN-1").unwrap();
        assert!(insert_vehicle(&conn, "v2", "VIN-1").is_err());
    }

    #[test]
    fn test_year_check() {
        let conn = open_test_conn();
        let result = conn.execute(
            "INSERT INTO vehicles (id, user_id, make, model, year, vin, mileage, created_at)
             VALUES ('v1', 'local', 'Ford', 'T', 1850, 'VIN-X', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_record_requires_vehicle() {
        let conn = open_test_conn();
        let result = conn.execute(
            "INSERT INTO maintenance_records
                (id, vehicle_id, service_type, date_performed, mileage, cost, created_at)
             VALUES ('r1', 'missing', 'Oil change', 0, 0, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_vehicle_delete_cascades() {
        let conn = open_test_conn();
        insert_vehicle(&conn, "v1", "VIN-1").unwrap();
        conn.execute(
            "INSERT INTO maintenance_records
                (id, vehicle_id, service_type, date_performed, mileage, cost, created_at)
             VALUES ('r1', 'v1', 'Oil change', 0, 5000, 40.0, 0)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM vehicles WHERE id = 'v1'", []).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM maintenance_records", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_chat_role_check() {
        let conn = open_test_conn();
        let result = conn.execute(
            "INSERT INTO chat_history (user_id, role, content, timestamp)
             VALUES ('local', 'system', 'hi', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
