//! Nearest-parking enrichment for itinerary stops

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{LookupError, PlaceLookup, PlaceQuery};
use crate::config::ParkingConfig;
use crate::domain::{ItineraryStop, LatLng, ParkingLot, Plan, StopKind, round_km};

/// Finds parking lots near stops through a [`PlaceLookup`]
#[derive(Clone)]
pub struct ParkingFinder {
    lookup: Arc<dyn PlaceLookup>,
    config: ParkingConfig,
}

impl ParkingFinder {
    pub fn new(lookup: Arc<dyn PlaceLookup>, config: ParkingConfig) -> Self {
        Self { lookup, config }
    }

    /// Parking lots within the configured radius, nearest first, at most top-N
    pub async fn nearest(&self, center: LatLng) -> Result<Vec<ParkingLot>, LookupError> {
        debug!(%center, keyword = %self.config.keyword, "nearest: called");
        if self.config.top_n == 0 {
            return Ok(Vec::new());
        }

        let query = PlaceQuery::new(center, self.config.keyword.clone(), self.config.radius_km);
        let places = self.lookup.search(&query).await?;

        let mut lots: Vec<ParkingLot> = Vec::with_capacity(places.len());
        for place in places {
            if lots.iter().any(|l| l.name == place.name) {
                continue;
            }
            let distance_km = round_km(center.distance_km(&place.location()));
            if distance_km > self.config.radius_km {
                continue;
            }
            lots.push(ParkingLot {
                name: place.name,
                address: place.address,
                lat: place.lat,
                lng: place.lng,
                distance_km,
            });
        }

        lots.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        lots.truncate(self.config.top_n);
        debug!(count = lots.len(), "nearest: done");
        Ok(lots)
    }

    /// Parking for a single stop; stops without coordinates get none
    pub async fn for_stop(&self, stop: &ItineraryStop) -> Result<Vec<ParkingLot>, LookupError> {
        match stop.location() {
            Some(center) if wants_parking(stop) => self.nearest(center).await,
            _ => Ok(Vec::new()),
        }
    }

    /// Attach parking to every eligible stop of the plan
    ///
    /// Lookups run concurrently. A failed lookup leaves that stop's parking
    /// list empty and is logged.
    pub async fn attach(&self, plan: &Plan) -> Plan {
        debug!(stops = plan.len(), "attach: called");
        let lookups = plan.itinerary.iter().map(|stop| self.for_stop(stop));
        let results = join_all(lookups).await;

        let mut enriched = plan.clone();
        let mut attached = 0usize;
        for (stop, result) in enriched.itinerary.iter_mut().zip(results) {
            match result {
                Ok(lots) => {
                    if !lots.is_empty() {
                        attached += 1;
                    }
                    stop.parking = lots;
                }
                Err(e) => {
                    warn!(index = stop.index, title = %stop.title, error = %e, "attach: parking lookup failed");
                    stop.parking.clear();
                }
            }
        }
        info!(attached, stops = enriched.len(), "attach: parking attached");
        enriched
    }
}

/// Travel legs and parking entries never get their own parking list
fn wants_parking(stop: &ItineraryStop) -> bool {
    !matches!(stop.kind, StopKind::Travel | StopKind::Parking)
}
