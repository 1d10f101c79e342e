pub mod common;
pub mod documents;
pub mod exceptions;
pub mod lots;
pub mod ops;
pub mod outbox;
pub mod recurring;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::health::{health_routes, HealthState};

// Handler modules import the state as crate::handlers::AppState.
pub use crate::AppState;

/// The full HTTP surface: device intake, operator actions, ops and health.
pub fn app_router(state: AppState) -> Router {
    let health = Arc::new(HealthState::new(
        state.db.clone(),
        state.config.posting.heartbeat_interval_secs,
    ));

    let api = Router::new()
        .nest("/api/v1/outbox", outbox::router())
        .nest("/api/v1/exceptions", exceptions::router())
        .nest("/api/v1/lots", lots::router())
        .nest("/api/v1/recurring-rules", recurring::router())
        .nest("/api/v1/documents", documents::router())
        .nest("/ops", ops::router())
        .with_state(state);

    api.nest("/health", health_routes(health))
        .layer(TraceLayer::new_for_http())
}
