use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use travelcost_core::models::{EmployeeId, TravelRequestId};

use crate::dto::{AuditTrailResponse, EmployeeAuditResponse};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_audit_trail(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<TravelRequestId>,
) -> Result<Json<AuditTrailResponse>, ApiError> {
    tracing::info!(travel_request_id = %request_id, "Reading audit trail");

    let records = state.calculations.audit_trail(request_id).await?;

    Ok(Json(AuditTrailResponse {
        travel_request_id: request_id,
        records,
    }))
}

pub async fn get_employee_audit_trail(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<EmployeeId>,
) -> Result<Json<EmployeeAuditResponse>, ApiError> {
    tracing::info!(employee_id = %employee_id, "Reading employee audit trail");

    let records = state.calculations.audit_trail_for_employee(employee_id).await?;

    Ok(Json(EmployeeAuditResponse {
        employee_id,
        records,
    }))
}
