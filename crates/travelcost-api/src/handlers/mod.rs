mod audit;
mod cache;
mod calculations;
mod health;

pub use audit::{get_audit_trail, get_employee_audit_trail};
pub use cache::{cleanup_expired, invalidate_cache};
pub use calculations::{preview_allowance, preview_combined, preview_distance};
pub use health::health_check;
