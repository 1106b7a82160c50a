use std::sync::Arc;

use axum::{extract::State, Json};

use crate::dto::{
    AllowanceRequest, AllowanceResponse, CalculationRequest, DistanceResponse, PreviewResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

fn log_request(request: &CalculationRequest, operation: &'static str) {
    tracing::info!(
        operation,
        employee_id = %request.employee_id,
        subproject_id = %request.subproject_id,
        address_version = request.address_version,
        rate_version = request.rate_version,
        "Processing calculation request"
    );
}

pub async fn preview_distance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CalculationRequest>,
) -> Result<Json<DistanceResponse>, ApiError> {
    log_request(&request, "distance");
    let (input, travel_request_id) = request.into_parts();
    let response = state.calculations.preview_distance(input, travel_request_id).await?;
    Ok(Json(response))
}

pub async fn preview_allowance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AllowanceRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let response = match request {
        AllowanceRequest::Locations(request) => {
            log_request(&request, "allowance");
            let (input, travel_request_id) = request.into_parts();
            state.calculations.preview_allowance(input, travel_request_id).await?
        }
        AllowanceRequest::Distance(request) => {
            tracing::info!(
                distance_km = %request.distance_km,
                cost_per_km = %request.cost_per_km,
                "Processing allowance request for a given distance"
            );
            state.calculations.allowance_from_distance(request.distance_km, request.cost_per_km)?
        }
    };
    Ok(Json(response))
}

pub async fn preview_combined(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CalculationRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    log_request(&request, "preview");
    let (input, travel_request_id) = request.into_parts();
    let response = state.calculations.preview_combined(input, travel_request_id).await?;
    Ok(Json(response))
}
