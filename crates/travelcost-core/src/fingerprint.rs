//! Deterministic cache keys for calculations.
//!
//! A key is built only from the ids and the two version counters. Coordinates
//! and rates never enter it: when either changes upstream, the owning
//! collaborator bumps its version, the key changes, and old entries become
//! unreachable without being touched.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{CalculationInput, EmployeeId, SubprojectId};

/// Prefix of the canonical key format; bump when the layout changes
const KEY_FORMAT: &str = "tc1";

/// Cache key for one employee/subproject pair at given versions.
///
/// Equality and hashing cover all four fields, so distinct inputs never
/// share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    employee_id: EmployeeId,
    subproject_id: SubprojectId,
    address_version: u64,
    rate_version: u64,
}

impl CacheKey {
    pub fn employee_id(&self) -> EmployeeId {
        self.employee_id
    }

    pub fn subproject_id(&self) -> SubprojectId {
        self.subproject_id
    }

    pub fn address_version(&self) -> u64 {
        self.address_version
    }

    pub fn rate_version(&self) -> u64 {
        self.rate_version
    }

    /// Stable string form, identical across processes and machines
    pub fn as_fingerprint(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated UUIDs are fixed width, so the layout is unambiguous.
        write!(
            f,
            "{}:{}:{}:a{}:r{}",
            KEY_FORMAT,
            self.employee_id.0.hyphenated(),
            self.subproject_id.0.hyphenated(),
            self.address_version,
            self.rate_version
        )
    }
}

/// Build the cache key for a calculation
pub fn fingerprint(
    employee_id: EmployeeId,
    subproject_id: SubprojectId,
    address_version: u64,
    rate_version: u64,
) -> CacheKey {
    CacheKey {
        employee_id,
        subproject_id,
        address_version,
        rate_version,
    }
}

impl From<&CalculationInput> for CacheKey {
    fn from(input: &CalculationInput) -> Self {
        fingerprint(
            input.employee_id,
            input.subproject_id,
            input.address_version,
            input.rate_version,
        )
    }
}
