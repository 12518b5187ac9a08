//! CarCare API crate - axum HTTP server and route handlers.
//!
//! Provides the REST API for vehicles, maintenance records, maintenance
//! suggestions, and the maintenance chat assistant.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod identity;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
