//! Travel-cost core - Domain models, calculators and configuration
//!
//! This crate contains the pure calculation logic (geodesic distance,
//! per-kilometer allowance, cache fingerprints) shared by the store and API crates.

pub mod allowance;
pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod geodesy;
pub mod models;

pub use allowance::{allowance_amount, calculate, RatePolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CalculationSettings, LayeredConfig};
pub use error::{
    AuditWriteError, CacheComputationError, CalculationError, Result, TravelCostError,
};
pub use fingerprint::{fingerprint, CacheKey};
pub use geodesy::distance_km;
