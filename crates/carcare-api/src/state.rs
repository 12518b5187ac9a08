//! Application state shared across all route handlers.
//!
//! AppState holds references to the configuration, the record store, and
//! the chat service. It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use carcare_chat::{ChatService, CompletionGateway};
use carcare_core::config::CarCareConfig;
use carcare_core::types::UserId;
use carcare_storage::{Database, MaintenanceRepository, VehicleRepository};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<CarCareConfig>,
    /// SQLite database for persistent storage.
    pub database: Arc<Database>,
    /// Chat service (sessions, context, gateway, suggestions).
    pub chat: Arc<ChatService>,
    /// Identity used for requests without an `X-User-Id` header.
    pub default_user: UserId,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState, wiring the chat service from the config.
    pub fn new(
        config: CarCareConfig,
        database: Arc<Database>,
        gateway: Arc<dyn CompletionGateway>,
    ) -> Self {
        let chat = ChatService::new(
            Arc::clone(&database),
            gateway,
            config.chat.clone(),
            config.suggestions.history_limit,
        );
        Self {
            default_user: UserId::new(config.general.default_user.clone()),
            config: Arc::new(config),
            database,
            chat: Arc::new(chat),
            start_time: Instant::now(),
        }
    }

    pub fn vehicles(&self) -> VehicleRepository {
        VehicleRepository::new(Arc::clone(&self.database))
    }

    pub fn records(&self) -> MaintenanceRepository {
        MaintenanceRepository::new(Arc::clone(&self.database))
    }
}
