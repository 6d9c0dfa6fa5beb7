//! Session data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ItineraryStop, ParkingLot, Plan, StopKind};
use crate::proposal::{AlternativeCandidate, ProposalOutcome};

/// One applied substitution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Monotonic per session; never reused, even after rollback or reset
    pub seq: u64,
    pub stop_index: usize,
    pub before: ItineraryStop,
    pub after: ItineraryStop,
    pub applied_at: DateTime<Utc>,
}

/// Alternatives for one stop, as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalGroup {
    pub stop_index: usize,
    pub stop_title: String,
    pub candidates: Vec<AlternativeCandidate>,
}

/// Proposal awaiting the user's choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingProposal {
    pub id: String,
    /// Groups in itinerary order
    pub groups: Vec<ProposalGroup>,
    pub degraded: bool,
    /// Plan version the proposal was computed against
    #[serde(default)]
    pub plan_version: u64,
    pub created_at: DateTime<Utc>,
}

impl PendingProposal {
    pub fn from_outcome(outcome: &ProposalOutcome, plan: &Plan, plan_version: u64) -> Self {
        let groups = outcome
            .proposals
            .iter()
            .map(|(index, candidates)| ProposalGroup {
                stop_index: *index,
                stop_title: plan.stop(*index).map(|s| s.title.clone()).unwrap_or_default(),
                candidates: candidates.clone(),
            })
            .collect();
        Self {
            id: Uuid::now_v7().to_string(),
            groups,
            degraded: outcome.degraded,
            plan_version,
            created_at: Utc::now(),
        }
    }

    pub fn group(&self, stop_index: usize) -> Option<&ProposalGroup> {
        self.groups.iter().find(|g| g.stop_index == stop_index)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.candidates.is_empty())
    }
}

/// Coarse conversation state derived from the pending proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Fresh,
    ProposalPending,
}

/// A user's plan and edit history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub key: String,
    /// Set at init, never edited afterwards
    pub original_plan: Plan,
    pub current_plan: Plan,
    pub history: Vec<ChangeRecord>,
    pub pending_proposal: Option<PendingProposal>,
    /// Most recently referenced stop, for ordinal references
    pub focus_stop: Option<usize>,
    pub next_seq: u64,
    /// Bumped by every change to `current_plan`
    pub plan_version: u64,
    /// A reset happened since the last init, so init may replace the plan
    #[serde(skip)]
    pub(crate) reinit_allowed: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>, plan: Plan) -> Self {
        Self {
            key: key.into(),
            original_plan: plan.clone(),
            current_plan: plan,
            history: Vec::new(),
            pending_proposal: None,
            focus_stop: None,
            next_seq: 1,
            plan_version: 0,
            reinit_allowed: false,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.pending_proposal {
            Some(_) => SessionState::ProposalPending,
            None => SessionState::Fresh,
        }
    }
}

/// Build the stop that replaces `original` with a chosen alternative
///
/// Keeps the position and time window. Cafe and restaurant stops keep their
/// kind; everything else becomes a plain place.
pub fn replacement_stop(original: &ItineraryStop, alt: &AlternativeCandidate, parking: Vec<ParkingLot>) -> ItineraryStop {
    let kind = match original.kind {
        StopKind::Cafe | StopKind::Restaurant => original.kind.clone(),
        _ => StopKind::Place,
    };
    ItineraryStop {
        index: original.index,
        kind,
        title: alt.title.clone(),
        description: Some(format!("우천 대안 적용 · 주소: {}", alt.address)),
        start_time: original.start_time.clone(),
        end_time: original.end_time.clone(),
        lat: Some(alt.lat),
        lng: Some(alt.lng),
        place_id: alt.place_id.clone(),
        rating: alt.rating,
        address: Some(alt.address.clone()),
        parking,
    }
}
