//! Domain types for itineraries
//!
//! A [`Plan`] is an ordered list of [`ItineraryStop`]s produced upstream. The
//! rest of the crate reads plans freely but only the session store mutates
//! them.

mod geo;
mod plan;

pub use geo::{LatLng, haversine_km, round_km};
pub use plan::{ItineraryStop, ParkingLot, Plan, StopKind, Totals, kst, parse_itinerary_date};
