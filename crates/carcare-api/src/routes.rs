//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, caller
//! identity resolution, and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use carcare_core::error::CarCareError;

use crate::handlers;
use crate::identity::{resolve_identity, USER_ID_HEADER};
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health));

    let user_routes = Router::new()
        .route(
            "/vehicles",
            get(handlers::list_vehicles).post(handlers::create_vehicle),
        )
        .route("/vehicles/{id}", delete(handlers::delete_vehicle))
        .route(
            "/maintenance/records",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route(
            "/maintenance/records/{id}",
            get(handlers::get_record)
                .put(handlers::update_record)
                .delete(handlers::delete_record),
        )
        .route("/chat", post(handlers::chat))
        .route("/chat/history", get(handlers::chat_history))
        .route("/chat/suggestions", post(handlers::chat_suggestions))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resolve_identity,
        ));

    public_routes
        .merge(user_routes)
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.server.cors_origins))
        .with_state(state)
}

/// CORS for the configured origins. Unparseable origins are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
        ])
}

/// Start the HTTP server on the configured port.
pub async fn start_server(state: AppState) -> Result<(), CarCareError> {
    let addr = format!("0.0.0.0:{}", state.config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind");
        CarCareError::Io(e)
    })?;

    axum::serve(listener, router).await?;

    Ok(())
}
