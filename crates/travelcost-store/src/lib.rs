//! Travel-cost Store - Calculation cache, audit ports and adapters
//!
//! This crate holds the only shared mutable state of the engine (the
//! calculation cache) and the append-only audit log with its in-memory and
//! PostgreSQL adapters.

pub mod cache;
pub mod memory;
pub mod ports;
pub mod postgres;

pub use cache::{CacheLookup, CacheOutcome, CalculationCache, InvalidationFilter};
pub use memory::MemoryAuditStore;
pub use ports::AuditStore;
