//! Error types for the travel-cost engine

use rust_decimal::Decimal;
use thiserror::Error;

use crate::fingerprint::CacheKey;
use crate::models::AuditId;

/// Validation failures raised by the distance and allowance calculators.
///
/// `Clone` so that one failed computation can be handed to every caller
/// coalesced onto it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculationError {
    #[error("Invalid coordinate ({latitude}, {longitude}): {reason}")]
    InvalidCoordinate {
        latitude: f64,
        longitude: f64,
        reason: String,
    },

    #[error("Invalid rate {rate}: {reason}")]
    InvalidRate { rate: Decimal, reason: String },

    #[error("Address could not be resolved: {address}")]
    UnresolvableAddress { address: String },
}

impl CalculationError {
    pub fn invalid_coordinate(latitude: f64, longitude: f64, reason: impl Into<String>) -> Self {
        Self::InvalidCoordinate {
            latitude,
            longitude,
            reason: reason.into(),
        }
    }

    pub fn invalid_rate(rate: Decimal, reason: impl Into<String>) -> Self {
        Self::InvalidRate {
            rate,
            reason: reason.into(),
        }
    }
}

/// A calculation failure raised inside the cache's compute step
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Computation for {key} failed: {source}")]
pub struct CacheComputationError {
    pub key: CacheKey,
    #[source]
    pub source: CalculationError,
}

impl CacheComputationError {
    pub fn new(key: CacheKey, source: CalculationError) -> Self {
        Self { key, source }
    }
}

/// Audit append failure. Never surfaced to the caller as the operation's error.
#[derive(Debug, Clone, Error)]
#[error("Failed to write audit record {record_id}: {reason}")]
pub struct AuditWriteError {
    pub record_id: AuditId,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum TravelCostError {
    // Calculation errors
    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error(transparent)]
    CacheComputation(#[from] CacheComputationError),

    #[error("Timed out after {waited_ms}ms waiting for calculation {key}")]
    WaitTimeout { key: CacheKey, waited_ms: u64 },

    // Audit errors
    #[error(transparent)]
    AuditWrite(#[from] AuditWriteError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TravelCostError {
    /// The validation failure behind this error, if it is one
    pub fn validation(&self) -> Option<&CalculationError> {
        match self {
            TravelCostError::Calculation(err) => Some(err),
            TravelCostError::CacheComputation(err) => Some(&err.source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TravelCostError>;
