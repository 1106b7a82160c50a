use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health_check))

        // Calculations
        .route("/calculations/distance", post(handlers::preview_distance))
        .route("/calculations/allowance", post(handlers::preview_allowance))
        .route("/calculations/preview", post(handlers::preview_combined))

        // Audit trail
        .route("/calculations/audit/{request_id}", get(handlers::get_audit_trail))
        .route(
            "/calculations/audit/employee/{employee_id}",
            get(handlers::get_employee_audit_trail),
        )

        // Cache administration
        .route("/calculations/cache/invalidate", post(handlers::invalidate_cache))
        .route("/calculations/cache/expired", delete(handlers::cleanup_expired))

        .with_state(state)
}
