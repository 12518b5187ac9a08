use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{CarCareError, Result};

/// Earliest model year accepted at registration.
pub const MIN_VEHICLE_YEAR: i32 = 1900;
/// Latest model year accepted at registration.
pub const MAX_VEHICLE_YEAR: i32 = 2100;

// =============================================================================
// Identity
// =============================================================================

/// Caller identity threaded through every user-scoped store operation.
///
/// Resolution (header, config default) happens at the API boundary; nothing
/// below it verifies the identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Stable storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse the storage representation back into a role.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Vehicles
// =============================================================================

/// A registered vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub user_id: UserId,
    pub make: String,
    pub model: String,
    pub year: i32,
    /// Globally unique vehicle identification number.
    pub vin: String,
    /// Current odometer reading.
    pub mileage: i64,
    pub created_at: DateTime<Utc>,
}

/// Registration payload for a new vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub vin: String,
    pub mileage: i64,
}

impl NewVehicle {
    /// Reject out-of-range or blank fields before they reach the store.
    pub fn validate(&self) -> Result<()> {
        require_non_blank("make", &self.make)?;
        require_non_blank("model", &self.model)?;
        require_non_blank("vin", &self.vin)?;
        if !(MIN_VEHICLE_YEAR..=MAX_VEHICLE_YEAR).contains(&self.year) {
            return Err(CarCareError::Validation(format!(
                "Year must be between {} and {}",
                MIN_VEHICLE_YEAR, MAX_VEHICLE_YEAR
            )));
        }
        if self.mileage < 0 {
            return Err(CarCareError::Validation(
                "Mileage cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Maintenance records
// =============================================================================

/// One part consumed by a maintenance service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUsed {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

/// A logged maintenance event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub service_type: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub date_performed: DateTime<Utc>,
    /// Odometer reading at the time of service.
    pub mileage: i64,
    pub cost: f64,
    pub parts_used: Option<Vec<PartUsed>>,
    pub created_at: DateTime<Utc>,
}

/// Create/update payload for a maintenance record.
///
/// Field names follow the HTTP contract (`vehicleId`, `serviceType`, `date`)
/// with snake_case aliases accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecordInput {
    #[serde(alias = "vehicle_id")]
    pub vehicle_id: Uuid,
    #[serde(alias = "service_type")]
    pub service_type: String,
    #[serde(alias = "date_performed", deserialize_with = "deserialize_service_date")]
    pub date: DateTime<Utc>,
    pub mileage: i64,
    pub cost: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "parts_used")]
    pub parts_used: Option<Vec<PartUsed>>,
}

impl MaintenanceRecordInput {
    /// Reject negative mileage/cost and blank service types.
    pub fn validate(&self) -> Result<()> {
        require_non_blank("serviceType", &self.service_type)?;
        if self.mileage < 0 {
            return Err(CarCareError::Validation(
                "Mileage cannot be negative".to_string(),
            ));
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(CarCareError::Validation(
                "Cost cannot be negative".to_string(),
            ));
        }
        if let Some(parts) = &self.parts_used {
            for part in parts {
                require_non_blank("part name", &part.name)?;
                if part.unit_cost.is_some_and(|c| !c.is_finite() || c < 0.0) {
                    return Err(CarCareError::Validation(format!(
                        "Part '{}' cost cannot be negative",
                        part.name
                    )));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Vehicle facts supplied alongside a chat or suggestion request.
///
/// Every field is optional; absent facts render as placeholders when the
/// conversation context is assembled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub vin: Option<String>,
}

impl VehicleInfo {
    /// The make/model/year triple used to match a registered vehicle, if complete.
    pub fn identity(&self) -> Option<(&str, &str, i32)> {
        let make = self.make.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let model = self.model.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((make, model, self.year?))
    }

    /// Fill facts missing here (absent or blank) from `stored`. Facts
    /// already present are kept.
    pub fn fill_from(self, stored: VehicleInfo) -> Self {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|s| !s.trim().is_empty())
        }
        Self {
            make: present(self.make).or(stored.make),
            model: present(self.model).or(stored.model),
            year: self.year.or(stored.year),
            vin: present(self.vin).or(stored.vin),
        }
    }
}

impl From<&Vehicle> for VehicleInfo {
    fn from(v: &Vehicle) -> Self {
        Self {
            make: Some(v.make.clone()),
            model: Some(v.model.clone()),
            year: Some(v.year),
            vin: Some(v.vin.clone()),
        }
    }
}

/// A single message in a conversation. Turns are append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Vehicle facts attached when the turn was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_context: Option<VehicleInfo>,
}

impl ConversationTurn {
    /// A user turn stamped with the current time.
    pub fn user(content: impl Into<String>, vehicle_context: Option<VehicleInfo>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            vehicle_context,
        }
    }

    /// An assistant turn stamped with the current time.
    pub fn assistant(content: impl Into<String>, vehicle_context: Option<VehicleInfo>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            vehicle_context,
        }
    }
}

/// RFC 3339, or an offset-less `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
fn deserialize_service_date<'de, D>(
    deserializer: D,
) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid date '{}': {}", raw, e)))
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CarCareError::Validation(format!(
            "Field '{}' must not be empty",
            field
        )));
    }
    Ok(())
}
