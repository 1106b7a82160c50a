use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use travelcost_core::models::{AuditRecord, Currency, EmployeeId, TravelRequestId};

/// Distance-only projection of a calculation
#[derive(Debug, Clone, Serialize)]
pub struct DistanceResponse {
    pub distance_km: Decimal,
    pub cache_hit: bool,
    pub computed_at: DateTime<Utc>,
}

/// Distance and allowance
#[derive(Debug, Clone, Serialize)]
pub struct AllowanceResponse {
    pub distance_km: Decimal,
    pub allowance_amount: Decimal,
    pub currency: Currency,
    pub cache_hit: bool,
    pub computed_at: DateTime<Utc>,
}

/// Combined preview for a prospective travel request
#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub fingerprint: String,
    pub distance_km: Decimal,
    pub allowance_amount: Decimal,
    pub currency: Currency,
    pub cache_hit: bool,
    pub computed_at: DateTime<Utc>,
}

/// Number of cache entries removed by an administrative call
#[derive(Debug, Clone, Serialize)]
pub struct RemovedResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct AuditTrailResponse {
    pub travel_request_id: TravelRequestId,
    pub records: Vec<AuditRecord>,
}

#[derive(Debug, Serialize)]
pub struct EmployeeAuditResponse {
    pub employee_id: EmployeeId,
    pub records: Vec<AuditRecord>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub audit_store: &'static str,
    pub cache_entries: usize,
    pub in_flight: usize,
    pub audit_failures: u64,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            service: "travelcost-api",
            audit_store: "ok",
            cache_entries: 0,
            in_flight: 0,
            audit_failures: 0,
        }
    }
}
