//! Route handlers for the CarCare API.
//!
//! Each handler extracts its inputs via the `extract` wrappers, delegates to the
//! repositories or the chat service, and returns `Result<Json<T>, ApiError>`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use carcare_chat::{ChatReply, ChatRequest};
use carcare_core::types::{
    MaintenanceRecord, MaintenanceRecordInput, NewVehicle, Role, UserId, Vehicle, VehicleInfo,
};

use crate::error::ApiError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

/// Generic `{message}` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Query parameters for GET /maintenance/records.
#[derive(Debug, Deserialize)]
pub struct RecordListParams {
    pub vehicle_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

/// One entry of GET /chat/history.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Service endpoints
// =============================================================================

/// GET / - welcome message.
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse::new(
        "Welcome to the Car Maintenance Assistant API",
    ))
}

/// GET /health - liveness and uptime.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// =============================================================================
// Vehicles
// =============================================================================

/// GET /vehicles - the caller's vehicles in registration order.
pub async fn list_vehicles(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    Ok(Json(state.vehicles().list(&user)?))
}

/// POST /vehicles - register a vehicle.
pub async fn create_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppJson(body): AppJson<NewVehicle>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    let vehicle = state.vehicles().create(&user, &body)?;
    tracing::info!(vehicle_id = %vehicle.id, user = %user, "Vehicle registered");
    Ok((StatusCode::CREATED, Json(vehicle)))
}

/// DELETE /vehicles/{id} - delete a vehicle and its records.
pub async fn delete_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.vehicles().delete(&user, id)?;
    Ok(Json(MessageResponse::new("Vehicle deleted successfully")))
}

// =============================================================================
// Maintenance records
// =============================================================================

/// GET /maintenance/records - list, most recent first.
pub async fn list_records(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppQuery(params): AppQuery<RecordListParams>,
) -> Result<Json<Vec<MaintenanceRecord>>, ApiError> {
    Ok(Json(state.records().list(&user, params.vehicle_id)?))
}

/// GET /maintenance/records/{id}
pub async fn get_record(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MaintenanceRecord>, ApiError> {
    state
        .records()
        .find_by_id(&user, id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Maintenance record not found: {}", id)))
}

/// POST /maintenance/records - log a maintenance event.
pub async fn create_record(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppJson(body): AppJson<MaintenanceRecordInput>,
) -> Result<(StatusCode, Json<MaintenanceRecord>), ApiError> {
    let record = state.records().create(&user, &body)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /maintenance/records/{id} - replace all editable fields.
pub async fn update_record(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<MaintenanceRecordInput>,
) -> Result<Json<MaintenanceRecord>, ApiError> {
    Ok(Json(state.records().update(&user, id, &body)?))
}

/// DELETE /maintenance/records/{id}
pub async fn delete_record(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.records().delete(&user, id)?;
    Ok(Json(MessageResponse::new(
        "Maintenance record deleted successfully",
    )))
}

// =============================================================================
// Chat
// =============================================================================

/// GET /chat/history - the caller's conversation, oldest first.
pub async fn chat_history(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> Result<Json<Vec<ChatHistoryEntry>>, ApiError> {
    let entries = state
        .chat
        .history(&user)?
        .into_iter()
        .map(|turn| ChatHistoryEntry {
            role: turn.role,
            content: turn.content,
            timestamp: turn.timestamp,
        })
        .collect();
    Ok(Json(entries))
}

/// POST /chat/suggestions - maintenance suggestions for a vehicle.
pub async fn chat_suggestions(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppJson(info): AppJson<VehicleInfo>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let suggestions = state.chat.suggestions(&user, &info)?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

/// POST /chat - answer the last message of the conversation.
pub async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    tracing::debug!(user = %user, messages = request.messages.len(), "Chat request");
    Ok(Json(state.chat.handle_chat(&user, request).await?))
}
