//! Google Places web service client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{LookupError, Place, PlaceLookup, PlaceQuery};
use crate::config::PlacesConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 2;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 500;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504)
}

/// Google Places client (nearby search, find-place, details)
pub struct GooglePlacesClient {
    api_key: String,
    base_url: String,
    language: String,
    region: String,
    http: Client,
}

impl GooglePlacesClient {
    pub fn from_config(config: &PlacesConfig) -> Result<Self, LookupError> {
        debug!(base_url = %config.base_url, "from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LookupError::NotConfigured(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LookupError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            region: config.region.clone(),
            http,
        })
    }

    /// GET a Places endpoint and decode the JSON body, retrying transient failures
    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, LookupError> {
        debug!(%path, "get_json: called");
        let url = format!("{}/{}", self.base_url, path);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, %path, "get_json: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .get(url.clone())
                .query(&[("key", self.api_key.as_str()), ("language", self.language.as_str())])
                .query(params)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "get_json: network error");
                    last_error = Some(LookupError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if is_retryable_status(status) && attempt < MAX_RETRIES {
                debug!(attempt, status, "get_json: retryable error");
                last_error = Some(LookupError::Api {
                    status: status.to_string(),
                    message: response.text().await.unwrap_or_default(),
                });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "get_json: HTTP error");
                return Err(LookupError::Api {
                    status: status.to_string(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            return response.json::<T>().await.map_err(LookupError::Network);
        }

        Err(last_error.unwrap_or_else(|| LookupError::InvalidResponse("Max retries exceeded".to_string())))
    }

    /// Fetch details for a place id (used to fill in a precise address)
    pub async fn details(&self, place_id: &str) -> Result<Option<Place>, LookupError> {
        debug!(%place_id, "details: called");
        let params = [
            ("place_id", place_id.to_string()),
            ("fields", "place_id,name,formatted_address,vicinity,geometry,rating".to_string()),
            ("region", self.region.clone()),
        ];
        let body: DetailsResponse = self.get_json("place/details/json", &params).await?;
        check_status(&body.status, body.error_message.as_deref())?;
        Ok(body.result.and_then(GoogleResult::into_place))
    }
}

/// Map a Places `status` field onto success or [`LookupError::Api`]
fn check_status(status: &str, message: Option<&str>) -> Result<(), LookupError> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => Err(LookupError::Api {
            status: other.to_string(),
            message: message.unwrap_or_default().to_string(),
        }),
    }
}

#[async_trait]
impl PlaceLookup for GooglePlacesClient {
    async fn search(&self, query: &PlaceQuery) -> Result<Vec<Place>, LookupError> {
        debug!(keyword = %query.keyword, center = %query.center, radius_m = query.radius_m(), "search: called");
        let params = [
            ("location", query.center.to_string()),
            ("keyword", query.keyword.clone()),
            ("radius", query.radius_m().to_string()),
        ];
        let body: NearbyResponse = self.get_json("place/nearbysearch/json", &params).await?;
        check_status(&body.status, body.error_message.as_deref())?;

        let places: Vec<Place> = body.results.into_iter().filter_map(GoogleResult::into_place).collect();
        debug!(count = places.len(), keyword = %query.keyword, "search: results");
        Ok(places)
    }

    async fn geocode(&self, title: &str) -> Result<Option<Place>, LookupError> {
        debug!(%title, "geocode: called");
        let params = [
            ("input", title.to_string()),
            ("inputtype", "textquery".to_string()),
            ("fields", "place_id,name,formatted_address,geometry,rating".to_string()),
            ("region", self.region.clone()),
        ];
        let body: FindPlaceResponse = self.get_json("place/findplacefromtext/json", &params).await?;
        check_status(&body.status, body.error_message.as_deref())?;

        let Some(candidate) = body.candidates.into_iter().find_map(GoogleResult::into_place) else {
            debug!(%title, "geocode: no candidates");
            return Ok(None);
        };

        if candidate.address.is_empty() {
            if let Some(pid) = candidate.place_id.as_deref() {
                match self.details(pid).await {
                    Ok(Some(detailed)) => return Ok(Some(detailed)),
                    Ok(None) => {}
                    Err(e) => warn!(%title, error = %e, "geocode: details lookup failed"),
                }
            }
        }
        Ok(Some(candidate))
    }
}

// Places API response types

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindPlaceResponse {
    status: String,
    #[serde(default)]
    candidates: Vec<GoogleResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<GoogleResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    name: Option<String>,
    formatted_address: Option<String>,
    vicinity: Option<String>,
    geometry: Option<Geometry>,
    rating: Option<f64>,
    place_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: GeoPoint,
}

#[derive(Debug, Deserialize)]
struct GeoPoint {
    lat: f64,
    lng: f64,
}

impl GoogleResult {
    /// Results without a name or coordinates are dropped
    fn into_place(self) -> Option<Place> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        let geometry = self.geometry?;
        Some(Place {
            name,
            address: self.formatted_address.or(self.vicinity).unwrap_or_default(),
            lat: geometry.location.lat,
            lng: geometry.location.lng,
            rating: self.rating,
            place_id: self.place_id,
        })
    }
}
