use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{EmployeeId, GeoPoint, SubprojectId};

/// Everything a calculation depends on.
///
/// `address_version` and `rate_version` are bumped by the employee and project
/// collaborators whenever the home address or the cost rate changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationInput {
    pub employee_id: EmployeeId,
    pub subproject_id: SubprojectId,
    pub home_location: GeoPoint,
    pub work_location: GeoPoint,
    pub cost_per_km: Decimal,
    pub address_version: u64,
    pub rate_version: u64,
}

/// Allowance currency. Only Swiss francs are paid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    CHF,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::CHF => write!(f, "CHF"),
        }
    }
}

/// Outcome of a calculation; amounts carry two decimal places
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub distance_km: Decimal,
    pub allowance_amount: Decimal,
    pub currency: Currency,
    pub computed_at: DateTime<Utc>,
}
