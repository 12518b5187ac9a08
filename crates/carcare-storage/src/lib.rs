//! CarCare storage crate - SQLite persistence for the record store.
//!
//! Provides a WAL-mode SQLite database with migrations and repository
//! implementations for vehicles, maintenance records, and chat history.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{ChatHistoryRepository, MaintenanceRepository, VehicleRepository};
