use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{CalculationInput, CalculationResult, EmployeeId, SubprojectId, TravelRequestId};

/// Audit record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub Uuid);

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One served calculation, hit or miss. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditId,
    pub employee_id: EmployeeId,
    pub subproject_id: SubprojectId,
    pub travel_request_id: Option<TravelRequestId>,
    pub input: CalculationInput,
    pub result: CalculationResult,
    pub cache_hit: bool,
    pub calculated_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record a calculation with a fresh id
    pub fn new(
        input: CalculationInput,
        result: CalculationResult,
        travel_request_id: Option<TravelRequestId>,
        cache_hit: bool,
        calculated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditId(Uuid::new_v4()),
            employee_id: input.employee_id,
            subproject_id: input.subproject_id,
            travel_request_id,
            input,
            result,
            cache_hit,
            calculated_at,
        }
    }
}
