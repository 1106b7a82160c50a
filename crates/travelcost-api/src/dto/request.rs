use rust_decimal::Decimal;
use serde::Deserialize;
use travelcost_core::models::{
    CalculationInput, EmployeeId, GeoPoint, SubprojectId, TravelRequestId,
};
use travelcost_store::InvalidationFilter;

/// Body shared by the distance, allowance and preview endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct CalculationRequest {
    pub employee_id: EmployeeId,
    pub subproject_id: SubprojectId,
    #[serde(default)]
    pub travel_request_id: Option<TravelRequestId>,
    pub home_location: GeoPoint,
    pub work_location: GeoPoint,
    /// Accepts `"0.70"` as well as `0.70`
    pub cost_per_km: Decimal,
    pub address_version: u64,
    pub rate_version: u64,
}

impl CalculationRequest {
    /// Split into the calculation input and the travel request it belongs to
    pub fn into_parts(self) -> (CalculationInput, Option<TravelRequestId>) {
        let input = CalculationInput {
            employee_id: self.employee_id,
            subproject_id: self.subproject_id,
            home_location: self.home_location,
            work_location: self.work_location,
            cost_per_km: self.cost_per_km,
            address_version: self.address_version,
            rate_version: self.rate_version,
        };
        (input, self.travel_request_id)
    }
}

/// Distance and rate supplied directly by the caller
#[derive(Debug, Clone, Deserialize)]
pub struct DistanceRateRequest {
    pub distance_km: Decimal,
    pub cost_per_km: Decimal,
}

/// `POST /calculations/allowance` accepts either resolved locations (cached
/// and audited) or a known distance
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AllowanceRequest {
    Locations(CalculationRequest),
    Distance(DistanceRateRequest),
}

/// Invalidation filter; omitted fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
    #[serde(default)]
    pub subproject_id: Option<SubprojectId>,
}

impl From<InvalidateRequest> for InvalidationFilter {
    fn from(request: InvalidateRequest) -> Self {
        InvalidationFilter {
            employee_id: request.employee_id,
            subproject_id: request.subproject_id,
        }
    }
}
