use geo::{Distance, Haversine};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::CalculationError;
use crate::models::GeoPoint;

/// Earth's mean radius (IUGG), the sphere the haversine formula runs on.
///
/// Matches PostGIS `geography` distances on the sphere and the radius `geo`'s
/// `Haversine` uses.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0088;

/// Decimal places kept for distances and amounts
pub const MONEY_SCALE: u32 = 2;

/// Round half-up (away from zero) to two decimal places, keeping the scale fixed
pub fn round_half_up(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Unrounded great-circle distance in meters
pub fn geodesic_distance_meters(a: &GeoPoint, b: &GeoPoint) -> Result<f64, CalculationError> {
    a.validate()?;
    b.validate()?;

    if a == b {
        return Ok(0.0);
    }

    Ok(Haversine.distance(a.to_geo_point(), b.to_geo_point()))
}

/// Unrounded great-circle distance in kilometers.
///
/// Feeds the allowance, which is rounded once at the end.
pub fn exact_distance_km(a: &GeoPoint, b: &GeoPoint) -> Result<Decimal, CalculationError> {
    let meters = geodesic_distance_meters(a, b)?;

    Decimal::from_f64(meters / 1000.0).ok_or_else(|| {
        CalculationError::invalid_coordinate(
            b.latitude(),
            b.longitude(),
            "distance is not representable",
        )
    })
}

/// Great-circle distance in kilometers, rounded half-up to two decimals
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> Result<Decimal, CalculationError> {
    exact_distance_km(a, b).map(round_half_up)
}
