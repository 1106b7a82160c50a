pub mod audit;
pub mod calculation;
pub mod ids;
pub mod location;

pub use audit::{AuditId, AuditRecord};
pub use calculation::{CalculationInput, CalculationResult, Currency};
pub use ids::{EmployeeId, SubprojectId, TravelRequestId};
pub use location::GeoPoint;
