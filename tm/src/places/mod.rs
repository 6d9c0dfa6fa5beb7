//! Place search and parking lookup
//!
//! [`PlaceLookup`] is the seam to the place provider. [`GooglePlacesClient`]
//! talks to the Google Places web service; [`ParkingFinder`] uses any lookup to
//! attach the nearest parking lots to itinerary stops.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::LatLng;

mod google;
mod parking;

pub use google::GooglePlacesClient;
pub use parking::ParkingFinder;

/// A place returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub place_id: Option<String>,
}

impl Place {
    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// A keyword search around a center point
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceQuery {
    pub center: LatLng,
    pub keyword: String,
    pub radius_km: f64,
}

impl PlaceQuery {
    pub fn new(center: LatLng, keyword: impl Into<String>, radius_km: f64) -> Self {
        Self {
            center,
            keyword: keyword.into(),
            radius_km,
        }
    }

    /// Radius in whole meters, never below 1 km
    pub fn radius_m(&self) -> u32 {
        (self.radius_km * 1000.0).round().max(1000.0) as u32
    }
}

/// Errors from the place provider
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Place lookup not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Provider returned {status}: {message}")]
    Api { status: String, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Lookup timed out")]
    Timeout,
}

/// Place search and geocoding provider
#[async_trait]
pub trait PlaceLookup: Send + Sync {
    /// Places matching the keyword near the center, in provider order
    async fn search(&self, query: &PlaceQuery) -> Result<Vec<Place>, LookupError>;

    /// Resolve a free-text title to the best matching place
    async fn geocode(&self, title: &str) -> Result<Option<Place>, LookupError>;
}
