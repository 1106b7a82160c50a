mod calculation;

pub use calculation::{Calculation, CalculationService};
