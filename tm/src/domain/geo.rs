//! Coordinates and great-circle distance

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Distance to another point in kilometres
    pub fn distance_km(&self, other: &LatLng) -> f64 {
        haversine_km(self, other)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

impl FromStr for LatLng {
    type Err = String;

    /// Parse the provider's `"lat,lng"` form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("Expected 'lat,lng', got '{}'", s))?;
        let lat = lat.trim().parse::<f64>().map_err(|e| format!("Bad latitude '{}': {}", lat, e))?;
        let lng = lng.trim().parse::<f64>().map_err(|e| format!("Bad longitude '{}': {}", lng, e))?;
        Ok(Self { lat, lng })
    }
}

/// Haversine distance between two points in kilometres
pub fn haversine_km(a: &LatLng, b: &LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (b.lng - a.lng).to_radians();
    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Round a distance to 10 m precision
///
/// Ranking compares rounded distances so that equal-looking candidates tie.
pub fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = LatLng::new(37.7951, 128.8965);
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // Gangneung station to Gyeongpo lake is roughly 3.6 km
        let station = LatLng::new(37.7640, 128.8996);
        let lake = LatLng::new(37.7956, 128.9081);
        let d = station.distance_km(&lake);
        assert!(d > 3.0 && d < 4.5, "unexpected distance {}", d);
    }

    #[test]
    fn test_round_km() {
        assert_eq!(round_km(1.23456), 1.23);
        assert_eq!(round_km(0.006), 0.01);
    }

    #[test]
    fn test_parse_latlng() {
        let p: LatLng = "37.5, 127.25".parse().unwrap();
        assert_eq!(p, LatLng::new(37.5, 127.25));
        assert!("37.5".parse::<LatLng>().is_err());
        assert!("abc,1".parse::<LatLng>().is_err());
        assert_eq!(p.to_string(), "37.5,127.25");
    }
}
