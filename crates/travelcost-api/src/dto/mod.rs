mod request;
mod response;

pub use request::{
    AllowanceRequest, CalculationRequest, DistanceRateRequest, InvalidateRequest,
};
pub use response::{
    AllowanceResponse, AuditTrailResponse, DistanceResponse, EmployeeAuditResponse,
    HealthResponse, PreviewResponse, RemovedResponse,
};
