use std::sync::Arc;

use axum::{extract::State, Json};
use travelcost_store::InvalidationFilter;

use crate::dto::{InvalidateRequest, RemovedResponse};
use crate::state::AppState;

pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InvalidateRequest>,
) -> Json<RemovedResponse> {
    let filter = InvalidationFilter::from(request);
    let removed = state.calculations.invalidate(&filter);
    Json(RemovedResponse { removed })
}

pub async fn cleanup_expired(State(state): State<Arc<AppState>>) -> Json<RemovedResponse> {
    let removed = state.calculations.cleanup_expired();
    tracing::info!(removed, "Expired cache entries swept on request");
    Json(RemovedResponse { removed })
}
