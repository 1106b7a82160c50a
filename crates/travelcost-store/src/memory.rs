//! In-memory audit storage for development and testing.
//!
//! Uses `RwLock::unwrap()` intentionally. Lock poisoning only occurs when
//! another thread panicked while holding the lock, which is an unrecoverable
//! state. For production workloads, use the PostgreSQL backend.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use travelcost_core::error::Result;
use travelcost_core::models::{AuditId, AuditRecord, EmployeeId, TravelRequestId};

use crate::ports::AuditStore;

#[derive(Debug, Default)]
struct AuditLog {
    records: Vec<AuditRecord>,
    ids: HashSet<AuditId>,
}

/// In-memory implementation of AuditStore
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditStore {
    log: Arc<RwLock<AuditLog>>,
}

impl MemoryAuditStore {
    /// Create a new in-memory audit store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.log.read().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record in append order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.log.read().unwrap().records.clone()
    }

    fn query<F>(&self, predicate: F) -> Vec<AuditRecord>
    where
        F: Fn(&AuditRecord) -> bool,
    {
        let log = self.log.read().unwrap();
        let mut matching: Vec<AuditRecord> =
            log.records.iter().filter(|record| predicate(record)).cloned().collect();

        // Stable sort keeps append order for equal timestamps
        matching.sort_by_key(|record| record.calculated_at);
        matching
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut log = self.log.write().unwrap();
        if log.ids.insert(record.id) {
            log.records.push(record.clone());
        }
        Ok(())
    }

    async fn query_by_travel_request(&self, id: TravelRequestId) -> Result<Vec<AuditRecord>> {
        Ok(self.query(|record| record.travel_request_id == Some(id)))
    }

    async fn query_by_employee(&self, id: EmployeeId) -> Result<Vec<AuditRecord>> {
        Ok(self.query(|record| record.employee_id == id))
    }
}
