//! Which stops are exposed to rain

use std::collections::BTreeSet;

use tracing::debug;

use super::{KeepReason, RainSignal};
use crate::config::ProposalConfig;
use crate::domain::{ItineraryStop, StopKind};

/// Outcome of classifying one stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exposure {
    Exposed,
    Kept(KeepReason),
}

/// Protection and indoor rules applied to each stop
#[derive(Debug, Clone)]
pub struct ExposurePolicy {
    indoor_keywords: Vec<String>,
    protect_first_stop: bool,
}

impl ExposurePolicy {
    pub fn new(indoor_keywords: Vec<String>, protect_first_stop: bool) -> Self {
        Self {
            indoor_keywords: indoor_keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            protect_first_stop,
        }
    }

    pub fn from_config(config: &ProposalConfig) -> Self {
        Self::new(config.indoor_keywords.clone(), config.protect_first_stop)
    }

    /// Protected or already-indoor stops, independent of the weather
    pub fn ineligible(&self, stop: &ItineraryStop, is_first: bool, protect_titles: &BTreeSet<String>) -> Option<KeepReason> {
        if protect_titles.contains(stop.title.trim()) {
            return Some(KeepReason::ProtectedTitle);
        }
        if is_first && self.protect_first_stop {
            return Some(KeepReason::FirstStop);
        }
        if stop.kind.is_protected() {
            return Some(KeepReason::ProtectedKind(stop.kind.to_string()));
        }
        if stop.kind == StopKind::Travel {
            return Some(KeepReason::Travel);
        }
        let text = stop.search_text();
        self.indoor_keywords
            .iter()
            .find(|kw| !kw.is_empty() && text.contains(kw.as_str()))
            .map(|kw| KeepReason::IndoorKeyword(kw.clone()))
    }

    /// Classify a stop against the rain signal
    ///
    /// With no forecast every eligible stop counts as exposed.
    pub fn classify(
        &self,
        stop: &ItineraryStop,
        is_first: bool,
        protect_titles: &BTreeSet<String>,
        rain: &RainSignal,
    ) -> Exposure {
        if let Some(reason) = self.ineligible(stop, is_first, protect_titles) {
            debug!(index = stop.index, %reason, "classify: kept");
            return Exposure::Kept(reason);
        }
        match rain {
            RainSignal::Unavailable => Exposure::Exposed,
            RainSignal::Dates(dates) if stop.overlaps_any(dates) => Exposure::Exposed,
            RainSignal::Dates(_) => Exposure::Kept(KeepReason::NotRainyDate),
        }
    }
}
