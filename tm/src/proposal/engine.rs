//! Proposal engine

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::policy::{Exposure, ExposurePolicy};
use super::ranking::rank_candidates;
use super::{AlternativeCandidate, KeepReason, KeptStop, ProposalError, ProposalOutcome, RainSignal};
use crate::config::ProposalConfig;
use crate::domain::{ItineraryStop, LatLng, Plan};
use crate::places::{LookupError, Place, PlaceLookup, PlaceQuery};

/// Default bound on a single lookup call
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Computes rain alternatives for a plan
#[derive(Clone)]
pub struct ProposalEngine {
    lookup: Arc<dyn PlaceLookup>,
    config: ProposalConfig,
    policy: ExposurePolicy,
    lookup_timeout: Duration,
}

impl ProposalEngine {
    pub fn new(lookup: Arc<dyn PlaceLookup>, config: ProposalConfig) -> Self {
        let policy = ExposurePolicy::from_config(&config);
        Self {
            lookup,
            config,
            policy,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ProposalConfig {
        &self.config
    }

    /// Propose up to `top_n` ranked alternatives for each exposed stop
    ///
    /// `RainSignal::Unavailable` switches to degraded mode: every eligible stop
    /// is treated as exposed and the outcome is flagged.
    pub async fn propose(
        &self,
        plan: &Plan,
        rain: &RainSignal,
        protect_titles: &BTreeSet<String>,
        top_n: usize,
    ) -> Result<ProposalOutcome, ProposalError> {
        debug!(stops = plan.len(), ?rain, protected = protect_titles.len(), top_n, "propose: called");
        if top_n == 0 {
            return Err(ProposalError::InvalidArgument("top_n must be at least 1".to_string()));
        }

        let mut outcome = ProposalOutcome {
            degraded: rain.is_unavailable(),
            ..Default::default()
        };
        if outcome.degraded {
            warn!("propose: no forecast available, assuming rain for every eligible stop");
        }

        let existing: HashSet<&str> = plan.titles();

        for (pos, stop) in plan.itinerary.iter().enumerate() {
            match self.policy.classify(stop, pos == 0, protect_titles, rain) {
                Exposure::Kept(reason) => outcome.kept.push(kept(stop, reason)),
                Exposure::Exposed => {
                    let Some(center) = self.center_for(stop).await else {
                        outcome.kept.push(kept(stop, KeepReason::NoCoordinates));
                        continue;
                    };
                    let candidates = self.alternatives_for(stop, center, &existing, top_n).await?;
                    if candidates.is_empty() {
                        outcome.kept.push(kept(stop, KeepReason::NoAlternatives));
                    } else {
                        outcome.proposals.insert(stop.index, candidates);
                    }
                }
            }
        }

        info!(
            groups = outcome.proposals.len(),
            candidates = outcome.candidate_count(),
            kept = outcome.kept.len(),
            degraded = outcome.degraded,
            "propose: done"
        );
        Ok(outcome)
    }

    /// The stop's coordinates, else a geocode of its title
    async fn center_for(&self, stop: &ItineraryStop) -> Option<LatLng> {
        if let Some(location) = stop.location() {
            return Some(location);
        }
        debug!(index = stop.index, title = %stop.title, "center_for: geocoding title");
        match tokio::time::timeout(self.lookup_timeout, self.lookup.geocode(&stop.title)).await {
            Ok(Ok(Some(place))) => Some(place.location()),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(index = stop.index, error = %e, "center_for: geocode failed");
                None
            }
            Err(_) => {
                warn!(index = stop.index, "center_for: geocode timed out");
                None
            }
        }
    }

    async fn search(&self, query: PlaceQuery) -> Result<Vec<Place>, LookupError> {
        match tokio::time::timeout(self.lookup_timeout, self.lookup.search(&query)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout),
        }
    }

    /// Query every search keyword around `center`, merge, filter and rank
    async fn alternatives_for(
        &self,
        stop: &ItineraryStop,
        center: LatLng,
        existing: &HashSet<&str>,
        top_n: usize,
    ) -> Result<Vec<AlternativeCandidate>, ProposalError> {
        debug!(index = stop.index, %center, "alternatives_for: called");
        let queries = self
            .config
            .search_keywords
            .iter()
            .map(|kw| self.search(PlaceQuery::new(center, kw.clone(), self.config.radius_km)));
        let results = join_all(queries).await;

        let mut failures = 0usize;
        let mut last_error = None;
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged = Vec::new();

        for (keyword, result) in self.config.search_keywords.iter().zip(results) {
            let places = match result {
                Ok(places) => places,
                Err(e) => {
                    warn!(index = stop.index, %keyword, error = %e, "alternatives_for: search failed");
                    failures += 1;
                    last_error = Some(e);
                    continue;
                }
            };
            for place in places {
                if existing.contains(place.name.as_str()) || !seen.insert(place.name.clone()) {
                    continue;
                }
                let candidate = AlternativeCandidate::from_place(place, center);
                if let Some(max) = self.config.max_distance_km {
                    if candidate.distance_km > max {
                        continue;
                    }
                }
                merged.push(candidate);
            }
        }

        if failures == self.config.search_keywords.len() {
            if let Some(source) = last_error {
                return Err(ProposalError::AdapterUnavailable {
                    stop_index: stop.index,
                    source,
                });
            }
        }

        let ranked = rank_candidates(merged, top_n);
        debug!(index = stop.index, count = ranked.len(), "alternatives_for: ranked");
        Ok(ranked)
    }
}

fn kept(stop: &ItineraryStop, reason: KeepReason) -> KeptStop {
    KeptStop {
        index: stop.index,
        title: stop.title.clone(),
        reason,
    }
}
