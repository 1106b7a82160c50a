//! Allowance calculation: distance times per-kilometer rate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::CalculationError;
use crate::geodesy::{exact_distance_km, round_half_up};
use crate::models::{CalculationInput, CalculationResult, Currency};

/// Upper bound for a sane per-kilometer rate, in CHF
pub const DEFAULT_MAX_COST_PER_KM: Decimal = Decimal::ONE_HUNDRED;

/// Rate rules the calculator re-asserts at its boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_cost_per_km: Decimal,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            max_cost_per_km: DEFAULT_MAX_COST_PER_KM,
        }
    }
}

impl RatePolicy {
    pub fn new(max_cost_per_km: Decimal) -> Self {
        Self { max_cost_per_km }
    }

    /// Reject non-positive rates and rates above the ceiling
    pub fn check(&self, cost_per_km: Decimal) -> Result<(), CalculationError> {
        if cost_per_km <= Decimal::ZERO {
            return Err(CalculationError::invalid_rate(
                cost_per_km,
                "cost per kilometer must be positive",
            ));
        }

        if cost_per_km > self.max_cost_per_km {
            return Err(CalculationError::invalid_rate(
                cost_per_km,
                format!("cost per kilometer must not exceed {}", self.max_cost_per_km),
            ));
        }

        Ok(())
    }
}

/// `distance_km * cost_per_km`, rounded half-up to two decimals once at the end
pub fn allowance_amount(
    distance_km: Decimal,
    cost_per_km: Decimal,
    policy: &RatePolicy,
) -> Result<Decimal, CalculationError> {
    policy.check(cost_per_km)?;

    if distance_km < Decimal::ZERO {
        return Err(CalculationError::invalid_rate(
            cost_per_km,
            format!("distance must not be negative, got {}", distance_km),
        ));
    }

    let amount = distance_km
        .checked_mul(cost_per_km)
        .ok_or_else(|| CalculationError::invalid_rate(cost_per_km, "allowance overflows"))?;

    Ok(round_half_up(amount))
}

/// Run the full pipeline: distance, then allowance.
///
/// The allowance is computed from the unrounded distance, so the reported
/// amount can differ from `distance_km * cost_per_km` by a cent. The rate is
/// checked before any geometry so that a bad rate is reported even when the
/// coordinates are also bad.
pub fn calculate(
    input: &CalculationInput,
    policy: &RatePolicy,
    computed_at: DateTime<Utc>,
) -> Result<CalculationResult, CalculationError> {
    policy.check(input.cost_per_km)?;

    let exact = exact_distance_km(&input.home_location, &input.work_location)?;
    let allowance = allowance_amount(exact, input.cost_per_km, policy)?;

    Ok(CalculationResult {
        distance_km: round_half_up(exact),
        allowance_amount: allowance,
        currency: Currency::CHF,
        computed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmployeeId, GeoPoint, SubprojectId};
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn bern_to_zurich(cost_per_km: &str) -> CalculationInput {
        CalculationInput {
            employee_id: EmployeeId::new(),
            subproject_id: SubprojectId::new(),
            home_location: GeoPoint::new(46.9480, 7.4474).unwrap(),
            work_location: GeoPoint::new(47.3769, 8.5417).unwrap(),
            cost_per_km: dec(cost_per_km),
            address_version: 1,
            rate_version: 1,
        }
    }

    #[test]
    fn test_allowance_rounds_half_up() {
        let policy = RatePolicy::default();
        assert_eq!(allowance_amount(dec("95.49"), dec("0.70"), &policy).unwrap(), dec("66.84"));
        assert_eq!(allowance_amount(dec("95.50"), dec("0.70"), &policy).unwrap(), dec("66.85"));
        let amount = allowance_amount(dec("10.01"), dec("0.50"), &policy).unwrap();
        assert_eq!(amount.to_string(), "5.01");
    }

    #[test]
    fn test_zero_distance_is_zero_allowance() {
        let amount = allowance_amount(Decimal::ZERO, dec("0.70"), &RatePolicy::default()).unwrap();
        assert_eq!(amount, Decimal::ZERO);
    }

    #[test]
    fn test_rate_must_be_positive() {
        let policy = RatePolicy::default();

        let err = allowance_amount(dec("10"), Decimal::ZERO, &policy).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid rate 0: cost per kilometer must be positive"
        );
        assert!(allowance_amount(dec("10"), dec("-0.7"), &policy).is_err());
    }

    #[test]
    fn test_rate_ceiling() {
        let policy = RatePolicy::new(dec("2.00"));
        assert!(allowance_amount(dec("10"), dec("2.00"), &policy).is_ok());
        assert!(matches!(
            allowance_amount(dec("10"), dec("2.01"), &policy),
            Err(CalculationError::InvalidRate { .. })
        ));
    }

    #[test]
    fn test_calculate_bern_to_zurich() {
        let at = Utc::now();
        let result = calculate(&bern_to_zurich("0.70"), &RatePolicy::default(), at).unwrap();

        assert_eq!(result.distance_km.to_string(), "95.49");
        // 95.4937.. * 0.70 = 66.8456.., rounded once
        assert_eq!(result.allowance_amount.to_string(), "66.85");
        assert_eq!(result.currency, Currency::CHF);
        assert_eq!(result.computed_at, at);
    }

    #[test]
    fn test_allowance_is_not_computed_from_rounded_distance() {
        let result =
            calculate(&bern_to_zurich("0.70"), &RatePolicy::default(), Utc::now()).unwrap();
        let from_rounded =
            allowance_amount(result.distance_km, dec("0.70"), &RatePolicy::default()).unwrap();

        assert_eq!(from_rounded.to_string(), "66.84");
        assert_ne!(result.allowance_amount, from_rounded);
    }

    #[test]
    fn test_calculate_checks_rate_first() {
        let mut input = bern_to_zurich("0");
        input.home_location =
            serde_json::from_str(r#"{"latitude": 95.0, "longitude": 0.0}"#).unwrap();

        let err = calculate(&input, &RatePolicy::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, CalculationError::InvalidRate { .. }));
    }

    proptest! {
        #[test]
        fn prop_calculation_is_reproducible(
            lat1 in -90.0f64..=90.0,
            lon1 in -180.0f64..=180.0,
            lat2 in -90.0f64..=90.0,
            lon2 in -180.0f64..=180.0,
            cents in 1u32..=10_000,
        ) {
            let mut input = bern_to_zurich("1");
            input.home_location = GeoPoint::new(lat1, lon1).unwrap();
            input.work_location = GeoPoint::new(lat2, lon2).unwrap();
            input.cost_per_km = Decimal::new(cents as i64, 2);

            let at = Utc::now();
            let first = calculate(&input, &RatePolicy::default(), at).unwrap();
            let second = calculate(&input, &RatePolicy::default(), at).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
