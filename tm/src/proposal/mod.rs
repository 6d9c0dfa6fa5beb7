//! Rain alternative proposals
//!
//! Decides which stops are exposed to rain and proposes ranked indoor
//! substitutes for each of them. Proposals are read-only; applying one is the
//! session store's job.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{LatLng, round_km};
use crate::places::{LookupError, Place};

mod engine;
mod policy;
mod ranking;

pub use engine::ProposalEngine;
pub use policy::{Exposure, ExposurePolicy};
pub use ranking::rank_candidates;

pub use crate::weather::RainSignal;

/// A substitute place for an exposed stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeCandidate {
    pub title: String,
    pub rating: Option<f64>,
    /// Distance from the original stop, rounded to 0.01 km
    pub distance_km: f64,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl AlternativeCandidate {
    pub fn from_place(place: Place, origin: LatLng) -> Self {
        let distance_km = round_km(origin.distance_km(&place.location()));
        Self {
            title: place.name,
            rating: place.rating,
            distance_km,
            address: place.address,
            place_id: place.place_id,
            lat: place.lat,
            lng: place.lng,
        }
    }
}

/// Why a stop was left out of the proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepReason {
    ProtectedTitle,
    FirstStop,
    ProtectedKind(String),
    Travel,
    IndoorKeyword(String),
    NotRainyDate,
    NoCoordinates,
    NoAlternatives,
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeepReason::ProtectedTitle => f.write_str("protected:title"),
            KeepReason::FirstStop => f.write_str("protected:first_stop"),
            KeepReason::ProtectedKind(kind) => write!(f, "protected:type:{}", kind),
            KeepReason::Travel => f.write_str("travel"),
            KeepReason::IndoorKeyword(kw) => write!(f, "indoor:keyword:{}", kw),
            KeepReason::NotRainyDate => f.write_str("not_rainy_date"),
            KeepReason::NoCoordinates => f.write_str("no_coordinates"),
            KeepReason::NoAlternatives => f.write_str("no_alternatives"),
        }
    }
}

impl Serialize for KeepReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A stop that gets no alternatives, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeptStop {
    pub index: usize,
    pub title: String,
    pub reason: KeepReason,
}

/// Result of a proposal run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProposalOutcome {
    /// Ranked alternatives keyed by 1-based stop index; stops with none are omitted
    pub proposals: BTreeMap<usize, Vec<AlternativeCandidate>>,
    /// True when no forecast was available and every eligible stop was assumed exposed
    pub degraded: bool,
    pub kept: Vec<KeptStop>,
}

impl ProposalOutcome {
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn candidate_count(&self) -> usize {
        self.proposals.values().map(Vec::len).sum()
    }
}

/// Errors from a proposal run
#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Place lookup unavailable for stop {stop_index}: {source}")]
    AdapterUnavailable {
        stop_index: usize,
        #[source]
        source: LookupError,
    },
}
