use std::sync::Arc;

use crate::services::CalculationService;

#[derive(Clone)]
pub struct AppState {
    pub calculations: Arc<CalculationService>,
}

impl AppState {
    pub fn new(calculations: Arc<CalculationService>) -> Self {
        Self { calculations }
    }
}
