use async_trait::async_trait;
use travelcost_core::error::Result;
use travelcost_core::models::{AuditRecord, EmployeeId, TravelRequestId};

/// Port for the append-only calculation audit log
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a record. Appending the same record id twice stores it once.
    async fn append(&self, record: &AuditRecord) -> Result<()>;

    /// All records for a travel request, oldest first
    async fn query_by_travel_request(&self, id: TravelRequestId) -> Result<Vec<AuditRecord>>;

    /// All records for an employee, oldest first
    async fn query_by_employee(&self, id: EmployeeId) -> Result<Vec<AuditRecord>>;

    /// Check that the backing storage is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
