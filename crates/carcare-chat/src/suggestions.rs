//! Rule-based maintenance suggestions.
//!
//! Pure functions over a vehicle and its recent maintenance records. No I/O,
//! no failure modes: every input yields a suggestion list.

use carcare_core::types::{MaintenanceRecord, Vehicle};

/// Mileage delta above which an oil change is suggested.
pub const OIL_CHANGE_THRESHOLD: i64 = 5_000;
/// Mileage delta above which a tire rotation is suggested.
pub const TIRE_ROTATION_THRESHOLD: i64 = 10_000;
/// Mileage delta above which a major service is suggested.
pub const MAJOR_SERVICE_THRESHOLD: i64 = 30_000;

/// Default number of recent records considered.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

pub const FIRST_SERVICE: &str = "Schedule your first maintenance service";

/// Appended to every suggestion list for a known vehicle.
pub const GENERIC_SUGGESTIONS: [&str; 3] = [
    "Check maintenance schedule",
    "View maintenance history",
    "Get maintenance cost estimate",
];

/// Returned when the vehicle cannot be matched.
pub const ONBOARDING_SUGGESTIONS: [&str; 3] = [
    "Add your vehicle to the system",
    "Schedule a maintenance check",
    "Get a vehicle inspection",
];

const TIERS: [(i64, &str); 3] = [
    (OIL_CHANGE_THRESHOLD, "Schedule an oil change"),
    (TIRE_ROTATION_THRESHOLD, "Schedule a tire rotation"),
    (MAJOR_SERVICE_THRESHOLD, "Schedule a major service"),
];

/// Suggestions for a registered vehicle.
///
/// `records` must be ordered most recent first; only the first `limit` are
/// considered. The delta is the most recent record's mileage minus the
/// vehicle's current mileage, and every tier it exceeds contributes one
/// suggestion in ascending threshold order.
pub fn suggest(vehicle: &Vehicle, records: &[MaintenanceRecord], limit: usize) -> Vec<String> {
    let recent = &records[..records.len().min(limit)];

    let mut suggestions = match recent.first() {
        None => vec![FIRST_SERVICE.to_string()],
        Some(last) => {
            let delta = last.mileage - vehicle.mileage;
            TIERS
                .iter()
                .filter(|(threshold, _)| delta > *threshold)
                .map(|(_, text)| text.to_string())
                .collect()
        }
    };

    suggestions.extend(GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()));
    suggestions
}

/// Suggestions for a caller whose vehicle is not (yet) registered.
pub fn onboarding() -> Vec<String> {
    ONBOARDING_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}
