use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use travelcost_core::error::{AuditWriteError, Result, TravelCostError};
use travelcost_core::models::{
    AuditId, AuditRecord, EmployeeId, SubprojectId, TravelRequestId,
};
use uuid::Uuid;

use super::PostgresStore;
use crate::ports::AuditStore;

const SELECT_COLUMNS: &str = r#"
    SELECT id, employee_id, subproject_id, travel_request_id, input, result,
           cache_hit, calculated_at
    FROM calculation_audit
"#;

fn row_to_record(row: PgRow) -> Result<AuditRecord> {
    let input: serde_json::Value = row.get("input");
    let result: serde_json::Value = row.get("result");
    let travel_request_id: Option<Uuid> = row.get("travel_request_id");
    let calculated_at: DateTime<Utc> = row.get("calculated_at");

    Ok(AuditRecord {
        id: AuditId(row.get("id")),
        employee_id: EmployeeId(row.get("employee_id")),
        subproject_id: SubprojectId(row.get("subproject_id")),
        travel_request_id: travel_request_id.map(TravelRequestId),
        input: serde_json::from_value(input).map_err(|e| {
            TravelCostError::Serialization(format!("Invalid audit input payload: {}", e))
        })?,
        result: serde_json::from_value(result).map_err(|e| {
            TravelCostError::Serialization(format!("Invalid audit result payload: {}", e))
        })?,
        cache_hit: row.get("cache_hit"),
        calculated_at,
    })
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let write_error = |reason: String| AuditWriteError {
            record_id: record.id,
            reason,
        };

        let input = serde_json::to_value(&record.input)
            .map_err(|e| write_error(format!("Failed to encode input: {}", e)))?;
        let result = serde_json::to_value(&record.result)
            .map_err(|e| write_error(format!("Failed to encode result: {}", e)))?;

        // ON CONFLICT keeps a retried append from duplicating the record
        sqlx::query(
            r#"
            INSERT INTO calculation_audit
                (id, employee_id, subproject_id, travel_request_id, input, result,
                 cache_hit, calculated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id.0)
        .bind(record.employee_id.0)
        .bind(record.subproject_id.0)
        .bind(record.travel_request_id.map(|id| id.0))
        .bind(input)
        .bind(result)
        .bind(record.cache_hit)
        .bind(record.calculated_at)
        .execute(self.pool())
        .await
        .map_err(|e| write_error(e.to_string()))?;

        Ok(())
    }

    async fn query_by_travel_request(&self, id: TravelRequestId) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE travel_request_id = $1 ORDER BY calculated_at, seq",
            SELECT_COLUMNS
        ))
        .bind(id.0)
        .fetch_all(self.pool())
        .await
        .map_err(|e| TravelCostError::Storage(format!("Failed to query audit trail: {}", e)))?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn query_by_employee(&self, id: EmployeeId) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE employee_id = $1 ORDER BY calculated_at, seq",
            SELECT_COLUMNS
        ))
        .bind(id.0)
        .fetch_all(self.pool())
        .await
        .map_err(|e| TravelCostError::Storage(format!("Failed to query audit trail: {}", e)))?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| TravelCostError::Storage(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}
