//! Repository implementations for SQLite-backed persistence.
//!
//! Provides VehicleRepository, MaintenanceRepository, and
//! ChatHistoryRepository that operate on the Database struct using raw SQL.
//! Every user-scoped operation takes the caller's `UserId` explicitly.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use carcare_core::error::CarCareError;
use carcare_core::types::{
    ConversationTurn, MaintenanceRecord, MaintenanceRecordInput, NewVehicle, PartUsed, Role,
    UserId, Vehicle, VehicleInfo,
};

use crate::db::Database;

const VEHICLE_COLUMNS: &str = "id, user_id, make, model, year, vin, mileage, created_at";

const RECORD_COLUMNS: &str = "r.id, r.vehicle_id, r.service_type, r.description, r.notes, \
     r.date_performed, r.mileage, r.cost, r.parts_used, r.created_at";

/// Repository for registered vehicles.
pub struct VehicleRepository {
    db: Arc<Database>,
}

impl VehicleRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a new vehicle for `user`.
    ///
    /// A VIN collision surfaces as `DuplicateIdentity`.
    pub fn create(&self, user: &UserId, new: &NewVehicle) -> Result<Vehicle, CarCareError> {
        new.validate()?;

        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            user_id: user.clone(),
            make: new.make.trim().to_string(),
            model: new.model.trim().to_string(),
            year: new.year,
            vin: new.vin.trim().to_string(),
            mileage: new.mileage,
            created_at: now_millis(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vehicles (id, user_id, make, model, year, vin, mileage, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    vehicle.id.to_string(),
                    vehicle.user_id.as_str(),
                    vehicle.make,
                    vehicle.model,
                    vehicle.year,
                    vehicle.vin,
                    vehicle.mileage,
                    vehicle.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CarCareError::DuplicateIdentity(format!(
                        "A vehicle with VIN '{}' already exists",
                        vehicle.vin
                    ))
                } else {
                    CarCareError::Storage(format!("Failed to save vehicle: {}", e))
                }
            })?;
            Ok(())
        })?;

        tracing::debug!(vehicle_id = %vehicle.id, user = %user, "Vehicle registered");
        Ok(vehicle)
    }

    /// List the caller's vehicles in registration order.
    pub fn list(&self, user: &UserId) -> Result<Vec<Vehicle>, CarCareError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM vehicles WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
                    VEHICLE_COLUMNS
                ))
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(rusqlite::params![user.as_str()], |row| {
                    Ok(row_to_vehicle(row))
                })
                .map_err(storage_err)?;

            let mut vehicles = Vec::new();
            for row in rows {
                vehicles.push(row.map_err(storage_err)??);
            }
            Ok(vehicles)
        })
    }

    /// Find one of the caller's vehicles by ID.
    pub fn find_by_id(&self, user: &UserId, id: Uuid) -> Result<Option<Vehicle>, CarCareError> {
        self.db
            .with_conn(|conn| find_vehicle(conn, user, id))
    }

    /// Find the caller's first-registered vehicle matching make/model/year.
    ///
    /// Make and model compare case-insensitively.
    pub fn find_by_identity(
        &self,
        user: &UserId,
        make: &str,
        model: &str,
        year: i32,
    ) -> Result<Option<Vehicle>, CarCareError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM vehicles
                     WHERE user_id = ?1
                       AND make = ?2 COLLATE NOCASE
                       AND model = ?3 COLLATE NOCASE
                       AND year = ?4
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT 1",
                    VEHICLE_COLUMNS
                ))
                .map_err(storage_err)?;

            let result = stmt
                .query_row(
                    rusqlite::params![user.as_str(), make.trim(), model.trim(), year],
                    |row| Ok(row_to_vehicle(row)),
                )
                .optional()
                .map_err(storage_err)?;

            result.transpose()
        })
    }

    /// Delete a vehicle and, by cascade, its maintenance records.
    pub fn delete(&self, user: &UserId, id: Uuid) -> Result<(), CarCareError> {
        let deleted = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM vehicles WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id.to_string(), user.as_str()],
            )
            .map_err(|e| CarCareError::Storage(format!("Failed to delete vehicle: {}", e)))
        })?;

        if deleted == 0 {
            return Err(CarCareError::not_found("Vehicle", id));
        }
        tracing::debug!(vehicle_id = %id, "Vehicle deleted");
        Ok(())
    }
}

/// Repository for maintenance records.
///
/// Records are visible to a caller only through vehicles that caller owns.
pub struct MaintenanceRepository {
    db: Arc<Database>,
}

impl MaintenanceRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// List the caller's records, optionally for a single vehicle, most recent first.
    pub fn list(
        &self,
        user: &UserId,
        vehicle_id: Option<Uuid>,
    ) -> Result<Vec<MaintenanceRecord>, CarCareError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM maintenance_records r
                     JOIN vehicles v ON v.id = r.vehicle_id
                     WHERE v.user_id = ?1 AND (?2 IS NULL OR r.vehicle_id = ?2)
                     ORDER BY r.date_performed DESC, r.rowid DESC",
                    RECORD_COLUMNS
                ))
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(
                    rusqlite::params![user.as_str(), vehicle_id.map(|id| id.to_string())],
                    |row| Ok(row_to_record(row)),
                )
                .map_err(storage_err)?;

            collect_records(rows)
        })
    }

    /// The `limit` most recent records of a vehicle, most recent first.
    pub fn recent_for_vehicle(
        &self,
        vehicle_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MaintenanceRecord>, CarCareError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM maintenance_records r
                     WHERE r.vehicle_id = ?1
                     ORDER BY r.date_performed DESC, r.rowid DESC
                     LIMIT ?2",
                    RECORD_COLUMNS
                ))
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(
                    rusqlite::params![vehicle_id.to_string(), limit as i64],
                    |row| Ok(row_to_record(row)),
                )
                .map_err(storage_err)?;

            collect_records(rows)
        })
    }

    /// Find one of the caller's records by ID.
    pub fn find_by_id(
        &self,
        user: &UserId,
        id: Uuid,
    ) -> Result<Option<MaintenanceRecord>, CarCareError> {
        self.db.with_conn(|conn| find_record(conn, user, id))
    }

    /// Log a new maintenance event against one of the caller's vehicles.
    pub fn create(
        &self,
        user: &UserId,
        input: &MaintenanceRecordInput,
    ) -> Result<MaintenanceRecord, CarCareError> {
        input.validate()?;

        let record = MaintenanceRecord {
            id: Uuid::new_v4(),
            vehicle_id: input.vehicle_id,
            service_type: input.service_type.trim().to_string(),
            description: input.description.clone(),
            notes: input.notes.clone(),
            date_performed: input.date,
            mileage: input.mileage,
            cost: input.cost,
            parts_used: input.parts_used.clone(),
            created_at: now_millis(),
        };
        let parts_json = encode_parts(&record.parts_used)?;

        self.db.with_conn(|conn| {
            if find_vehicle(conn, user, input.vehicle_id)?.is_none() {
                return Err(CarCareError::not_found("Vehicle", input.vehicle_id));
            }

            conn.execute(
                "INSERT INTO maintenance_records
                    (id, vehicle_id, service_type, description, notes, date_performed,
                     mileage, cost, parts_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    record.id.to_string(),
                    record.vehicle_id.to_string(),
                    record.service_type,
                    record.description,
                    record.notes,
                    record.date_performed.timestamp_millis(),
                    record.mileage,
                    record.cost,
                    parts_json,
                    record.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                CarCareError::Storage(format!("Failed to save maintenance record: {}", e))
            })?;
            Ok(())
        })?;

        tracing::debug!(record_id = %record.id, vehicle_id = %record.vehicle_id, "Maintenance record saved");
        Ok(record)
    }

    /// Replace every editable field of an existing record.
    pub fn update(
        &self,
        user: &UserId,
        id: Uuid,
        input: &MaintenanceRecordInput,
    ) -> Result<MaintenanceRecord, CarCareError> {
        input.validate()?;
        let parts_json = encode_parts(&input.parts_used)?;

        self.db.with_conn(|conn| {
            if find_record(conn, user, id)?.is_none() {
                return Err(CarCareError::not_found("Maintenance record", id));
            }
            if find_vehicle(conn, user, input.vehicle_id)?.is_none() {
                return Err(CarCareError::not_found("Vehicle", input.vehicle_id));
            }

            conn.execute(
                "UPDATE maintenance_records
                 SET vehicle_id = ?2, service_type = ?3, description = ?4, notes = ?5,
                     date_performed = ?6, mileage = ?7, cost = ?8, parts_used = ?9
                 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    input.vehicle_id.to_string(),
                    input.service_type.trim(),
                    input.description,
                    input.notes,
                    input.date.timestamp_millis(),
                    input.mileage,
                    input.cost,
                    parts_json,
                ],
            )
            .map_err(|e| {
                CarCareError::Storage(format!("Failed to update maintenance record: {}", e))
            })?;

            find_record(conn, user, id)?
                .ok_or_else(|| CarCareError::not_found("Maintenance record", id))
        })
    }

    /// Delete one of the caller's records.
    pub fn delete(&self, user: &UserId, id: Uuid) -> Result<(), CarCareError> {
        let deleted = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM maintenance_records
                 WHERE id = ?1
                   AND vehicle_id IN (SELECT id FROM vehicles WHERE user_id = ?2)",
                rusqlite::params![id.to_string(), user.as_str()],
            )
            .map_err(|e| {
                CarCareError::Storage(format!("Failed to delete maintenance record: {}", e))
            })
        })?;

        if deleted == 0 {
            return Err(CarCareError::not_found("Maintenance record", id));
        }
        Ok(())
    }
}

/// Repository for persisted conversation turns.
pub struct ChatHistoryRepository {
    db: Arc<Database>,
}

impl ChatHistoryRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one turn. Each call is its own committed write.
    pub fn append(&self, user: &UserId, turn: &ConversationTurn) -> Result<(), CarCareError> {
        let context_json = turn
            .vehicle_context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_history (user_id, role, content, vehicle_context, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.as_str(),
                    turn.role.as_str(),
                    turn.content,
                    context_json,
                    turn.timestamp.timestamp_millis(),
                ],
            )
            .map_err(|e| CarCareError::Storage(format!("Failed to append chat turn: {}", e)))?;
            Ok(())
        })
    }

    /// Full history for `user`, oldest first.
    pub fn list(&self, user: &UserId) -> Result<Vec<ConversationTurn>, CarCareError> {
        self.query_turns(
            "SELECT role, content, vehicle_context, timestamp FROM chat_history
             WHERE user_id = ?1
             ORDER BY seq ASC",
            rusqlite::params![user.as_str()],
        )
    }

    /// The last `limit` turns for `user`, oldest first.
    pub fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<ConversationTurn>, CarCareError> {
        self.query_turns(
            "SELECT role, content, vehicle_context, timestamp FROM (
                 SELECT seq, role, content, vehicle_context, timestamp FROM chat_history
                 WHERE user_id = ?1
                 ORDER BY seq DESC
                 LIMIT ?2
             )
             ORDER BY seq ASC",
            rusqlite::params![user.as_str(), limit as i64],
        )
    }

    fn query_turns(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ConversationTurn>, CarCareError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(params, |row| Ok(row_to_turn(row)))
                .map_err(storage_err)?;

            let mut turns = Vec::new();
            for row in rows {
                turns.push(row.map_err(storage_err)??);
            }
            Ok(turns)
        })
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn find_vehicle(
    conn: &Connection,
    user: &UserId,
    id: Uuid,
) -> Result<Option<Vehicle>, CarCareError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM vehicles WHERE id = ?1 AND user_id = ?2",
            VEHICLE_COLUMNS
        ))
        .map_err(storage_err)?;

    let result = stmt
        .query_row(rusqlite::params![id.to_string(), user.as_str()], |row| {
            Ok(row_to_vehicle(row))
        })
        .optional()
        .map_err(storage_err)?;

    result.transpose()
}

fn find_record(
    conn: &Connection,
    user: &UserId,
    id: Uuid,
) -> Result<Option<MaintenanceRecord>, CarCareError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM maintenance_records r
             JOIN vehicles v ON v.id = r.vehicle_id
             WHERE r.id = ?1 AND v.user_id = ?2",
            RECORD_COLUMNS
        ))
        .map_err(storage_err)?;

    let result = stmt
        .query_row(rusqlite::params![id.to_string(), user.as_str()], |row| {
            Ok(row_to_record(row))
        })
        .optional()
        .map_err(storage_err)?;

    result.transpose()
}

fn collect_records<F>(
    rows: rusqlite::MappedRows<'_, F>,
) -> Result<Vec<MaintenanceRecord>, CarCareError>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<Result<MaintenanceRecord, CarCareError>>,
{
    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(storage_err)??);
    }
    Ok(records)
}

fn row_to_vehicle(row: &rusqlite::Row<'_>) -> Result<Vehicle, CarCareError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let user_id: String = row.get(1).map_err(storage_err)?;
    let created_at: i64 = row.get(7).map_err(storage_err)?;

    Ok(Vehicle {
        id: parse_uuid(&id)?,
        user_id: UserId(user_id),
        make: row.get(2).map_err(storage_err)?,
        model: row.get(3).map_err(storage_err)?,
        year: row.get(4).map_err(storage_err)?,
        vin: row.get(5).map_err(storage_err)?,
        mileage: row.get(6).map_err(storage_err)?,
        created_at: from_millis(created_at)?,
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<MaintenanceRecord, CarCareError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let vehicle_id: String = row.get(1).map_err(storage_err)?;
    let date_performed: i64 = row.get(5).map_err(storage_err)?;
    let parts_used: Option<String> = row.get(8).map_err(storage_err)?;
    let created_at: i64 = row.get(9).map_err(storage_err)?;

    Ok(MaintenanceRecord {
        id: parse_uuid(&id)?,
        vehicle_id: parse_uuid(&vehicle_id)?,
        service_type: row.get(2).map_err(storage_err)?,
        description: row.get(3).map_err(storage_err)?,
        notes: row.get(4).map_err(storage_err)?,
        date_performed: from_millis(date_performed)?,
        mileage: row.get(6).map_err(storage_err)?,
        cost: row.get(7).map_err(storage_err)?,
        parts_used: parts_used
            .map(|json| serde_json::from_str::<Vec<PartUsed>>(&json))
            .transpose()?,
        created_at: from_millis(created_at)?,
    })
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> Result<ConversationTurn, CarCareError> {
    let role: String = row.get(0).map_err(storage_err)?;
    let content: String = row.get(1).map_err(storage_err)?;
    let vehicle_context: Option<String> = row.get(2).map_err(storage_err)?;
    let timestamp: i64 = row.get(3).map_err(storage_err)?;

    Ok(ConversationTurn {
        role: Role::parse(&role)
            .ok_or_else(|| CarCareError::Storage(format!("Unknown chat role: {}", role)))?,
        content,
        timestamp: from_millis(timestamp)?,
        vehicle_context: vehicle_context
            .map(|json| serde_json::from_str::<VehicleInfo>(&json))
            .transpose()?,
    })
}

fn encode_parts(parts: &Option<Vec<PartUsed>>) -> Result<Option<String>, CarCareError> {
    Ok(parts.as_ref().map(serde_json::to_string).transpose()?)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn storage_err(e: rusqlite::Error) -> CarCareError {
    CarCareError::Storage(e.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, CarCareError> {
    Uuid::parse_str(s).map_err(|e| CarCareError::Storage(format!("Invalid UUID: {}", e)))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, CarCareError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| CarCareError::Storage(format!("Invalid timestamp: {}", ms)))
}

/// Current time truncated to the millisecond precision the schema stores.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    from_millis(now.timestamp_millis()).unwrap_or(now)
}
