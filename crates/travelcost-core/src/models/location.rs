use serde::{Deserialize, Serialize};

use crate::error::CalculationError;

/// A WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub const MIN_LATITUDE: f64 = -90.0;
    pub const MAX_LATITUDE: f64 = 90.0;
    pub const MIN_LONGITUDE: f64 = -180.0;
    pub const MAX_LONGITUDE: f64 = 180.0;

    /// Create a validated point
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CalculationError> {
        let point = Self { latitude, longitude };
        point.validate()?;
        Ok(point)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Check the coordinate range.
    ///
    /// Deserialized points skip `new`, so the calculators call this again.
    pub fn validate(&self) -> Result<(), CalculationError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(CalculationError::invalid_coordinate(
                self.latitude,
                self.longitude,
                "coordinates must be finite",
            ));
        }

        if !(Self::MIN_LATITUDE..=Self::MAX_LATITUDE).contains(&self.latitude) {
            return Err(CalculationError::invalid_coordinate(
                self.latitude,
                self.longitude,
                "latitude must be between -90 and 90",
            ));
        }

        if !(Self::MIN_LONGITUDE..=Self::MAX_LONGITUDE).contains(&self.longitude) {
            return Err(CalculationError::invalid_coordinate(
                self.latitude,
                self.longitude,
                "longitude must be between -180 and 180",
            ));
        }

        Ok(())
    }

    /// Convert to a `geo` point (x = longitude, y = latitude)
    pub fn to_geo_point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_point() {
        let bern = GeoPoint::new(46.9480, 7.4474).unwrap();
        assert_eq!(bern.latitude(), 46.9480);
        assert_eq!(bern.longitude(), 7.4474);

        let geo_point = bern.to_geo_point();
        assert_eq!(geo_point.x(), 7.4474);
        assert_eq!(geo_point.y(), 46.9480);
    }

    #[test]
    fn test_range_boundaries_are_valid() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            GeoPoint::new(90.5, 0.0),
            Err(CalculationError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            GeoPoint::new(0.0, -180.1),
            Err(CalculationError::InvalidCoordinate { .. })
        ));
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_deserialized_point_is_checked_by_validate() {
        let point: GeoPoint =
            serde_json::from_str(r#"{"latitude": 123.0, "longitude": 8.0}"#).unwrap();
        assert!(point.validate().is_err());
    }
}
