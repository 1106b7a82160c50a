use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let calculations = &state.calculations;

    let mut response = HealthResponse {
        cache_entries: calculations.cache().entry_count(),
        in_flight: calculations.cache().in_flight_count(),
        audit_failures: calculations.audit_failures(),
        ..HealthResponse::default()
    };

    // Audit faults never fail a calculation, so they are reported here
    if let Err(err) = calculations.audit_health().await {
        tracing::warn!(error = %err, "Audit store health check failed");
        response.status = "degraded";
        response.audit_store = "unavailable";
    }

    Json(response)
}
