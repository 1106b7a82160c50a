//! Geodesy: distance calculations
//!
//! Great-circle distances between WGS84 points, rounded for payout.

pub mod distance;

pub use distance::{
    distance_km, exact_distance_km, geodesic_distance_meters, round_half_up, EARTH_MEAN_RADIUS_KM,
};
