//! In-memory session store
//!
//! Sessions live in a registry guarded by a `RwLock`; each session has its own
//! `Mutex`, so mutations on one key are serialized while different keys run in
//! parallel. The registry lock is only held to look up or insert an entry.

use std::collections::HashMap;
use std::collections::hash_map::Entry as HashEntry;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::{SessionError, SessionResult};
use super::model::{ChangeRecord, PendingProposal, Session, replacement_stop};
use crate::domain::{ItineraryStop, ParkingLot, Plan};

type Entry = Arc<Mutex<Session>>;

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, key: &str) -> SessionResult<Entry> {
        let sessions = self.sessions.read().await;
        sessions
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }

    /// Create a session, or replace the plan of one that was reset since its last init
    pub async fn init(&self, key: &str, plan: Plan) -> SessionResult<Plan> {
        debug!(%key, stops = plan.len(), "init: called");
        let plan = plan.normalized();

        let existing = self.sessions.read().await.get(key).cloned();
        if let Some(entry) = existing {
            let mut session = entry.lock().await;
            if !session.reinit_allowed {
                debug!(%key, "init: already initialized");
                return Err(SessionError::AlreadyInitialized(key.to_string()));
            }
            session.original_plan = plan.clone();
            session.current_plan = plan.clone();
            session.history.clear();
            session.pending_proposal = None;
            session.focus_stop = None;
            session.reinit_allowed = false;
            session.plan_version += 1;
            info!(%key, stops = plan.len(), "init: session re-initialized after reset");
            return Ok(plan);
        }

        match self.sessions.write().await.entry(key.to_string()) {
            // another init won the race; that session is fresh, so no reinit
            HashEntry::Occupied(_) => {
                debug!(%key, "init: already initialized");
                Err(SessionError::AlreadyInitialized(key.to_string()))
            }
            HashEntry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(Session::new(key, plan.clone()))));
                info!(%key, stops = plan.len(), "init: session created");
                Ok(plan)
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// A clone of the session, for read-only use within one request
    pub async fn snapshot(&self, key: &str) -> SessionResult<Session> {
        let entry = self.entry(key).await?;
        let session = entry.lock().await;
        Ok(session.clone())
    }

    /// Replace the stop at `stop_index`, recording the change
    pub async fn apply(&self, key: &str, stop_index: usize, new_stop: ItineraryStop) -> SessionResult<Plan> {
        debug!(%key, stop_index, title = %new_stop.title, "apply: called");
        let entry = self.entry(key).await?;
        let mut session = entry.lock().await;
        let record = apply_locked(&mut session, stop_index, new_stop)?;
        info!(%key, stop_index, seq = record.seq, "apply: change recorded");
        Ok(session.current_plan.clone())
    }

    /// Undo the most recent change
    pub async fn rollback(&self, key: &str) -> SessionResult<(Plan, ChangeRecord)> {
        debug!(%key, "rollback: called");
        let entry = self.entry(key).await?;
        let mut session = entry.lock().await;

        let record = session.history.pop().ok_or(SessionError::NothingToRollback)?;
        let len = session.current_plan.len();
        let slot = session
            .current_plan
            .stop_mut(record.stop_index)
            .ok_or(SessionError::IndexOutOfRange {
                index: record.stop_index,
                len,
            })?;
        *slot = record.before.clone();
        session.plan_version += 1;
        session.pending_proposal = None;
        session.focus_stop = Some(record.stop_index);

        info!(%key, seq = record.seq, stop_index = record.stop_index, "rollback: change undone");
        Ok((session.current_plan.clone(), record))
    }

    /// Restore the original plan and drop history and any pending proposal
    pub async fn reset(&self, key: &str) -> SessionResult<Plan> {
        debug!(%key, "reset: called");
        let entry = self.entry(key).await?;
        let mut session = entry.lock().await;

        session.current_plan = session.original_plan.clone();
        session.history.clear();
        session.pending_proposal = None;
        session.focus_stop = None;
        session.reinit_allowed = true;
        session.plan_version += 1;

        info!(%key, "reset: plan restored");
        Ok(session.current_plan.clone())
    }

    pub async fn history(&self, key: &str) -> SessionResult<Vec<ChangeRecord>> {
        let entry = self.entry(key).await?;
        let session = entry.lock().await;
        Ok(session.history.clone())
    }

    /// Store (or clear) the pending proposal computed against `plan_version`
    ///
    /// Fails with `StaleProposal` when the plan changed since that version.
    /// Focus moves to the only group when there is exactly one, otherwise it is cleared.
    pub async fn set_pending_proposal(
        &self,
        key: &str,
        plan_version: u64,
        pending: Option<PendingProposal>,
    ) -> SessionResult<()> {
        debug!(%key, plan_version, has_pending = pending.is_some(), "set_pending_proposal: called");
        let entry = self.entry(key).await?;
        let mut session = entry.lock().await;
        if session.plan_version != plan_version {
            warn!(%key, plan_version, current = session.plan_version, "set_pending_proposal: plan changed meanwhile");
            return Err(SessionError::StaleProposal);
        }

        session.focus_stop = match pending.as_ref().map(|p| p.groups.as_slice()) {
            Some([only]) => Some(only.stop_index),
            _ => None,
        };
        session.pending_proposal = pending;
        Ok(())
    }

    pub async fn set_focus_stop(&self, key: &str, stop_index: Option<usize>) -> SessionResult<()> {
        debug!(%key, ?stop_index, "set_focus_stop: called");
        let entry = self.entry(key).await?;
        let mut session = entry.lock().await;
        if let Some(index) = stop_index {
            if session.current_plan.stop(index).is_none() {
                return Err(SessionError::IndexOutOfRange {
                    index,
                    len: session.current_plan.len(),
                });
            }
        }
        session.focus_stop = stop_index;
        Ok(())
    }

    /// Apply a candidate from the pending proposal and clear it, under one lock
    ///
    /// `proposal_id` must match the pending proposal the caller resolved
    /// against; a replaced or cleared proposal yields `NoPendingProposal`.
    /// A proposal that no longer fits the current plan yields `StaleProposal`.
    pub async fn apply_proposed(
        &self,
        key: &str,
        proposal_id: &str,
        stop_index: usize,
        alternative_index: usize,
        parking: Vec<ParkingLot>,
    ) -> SessionResult<(Plan, ChangeRecord)> {
        debug!(%key, %proposal_id, stop_index, alternative_index, "apply_proposed: called");
        let entry = self.entry(key).await?;
        let mut session = entry.lock().await;

        let pending = match session.pending_proposal.as_ref() {
            Some(p) if p.id == proposal_id => p,
            _ => return Err(SessionError::NoPendingProposal),
        };
        if pending.plan_version != session.plan_version {
            warn!(%key, %proposal_id, "apply_proposed: plan changed since the proposal");
            return Err(SessionError::StaleProposal);
        }
        let group = pending.group(stop_index).ok_or(SessionError::IndexOutOfRange {
            index: stop_index,
            len: session.current_plan.len(),
        })?;
        let candidate = group
            .candidates
            .get(alternative_index)
            .ok_or(SessionError::IndexOutOfRange {
                index: alternative_index,
                len: group.candidates.len(),
            })?
            .clone();

        let original = session
            .current_plan
            .stop(stop_index)
            .ok_or(SessionError::IndexOutOfRange {
                index: stop_index,
                len: session.current_plan.len(),
            })?;
        if original.title != group.stop_title {
            warn!(%key, stop_index, expected = %group.stop_title, found = %original.title, "apply_proposed: stop replaced since the proposal");
            return Err(SessionError::StaleProposal);
        }
        let new_stop = replacement_stop(original, &candidate, parking);

        let record = apply_locked(&mut session, stop_index, new_stop)?;
        session.pending_proposal = None;
        session.focus_stop = Some(stop_index);

        info!(%key, stop_index, title = %candidate.title, seq = record.seq, "apply_proposed: alternative applied");
        Ok((session.current_plan.clone(), record))
    }
}

/// Replace a stop in a locked session and push the change record
fn apply_locked(session: &mut Session, stop_index: usize, mut new_stop: ItineraryStop) -> SessionResult<ChangeRecord> {
    let len = session.current_plan.len();
    let seq = session.next_seq;
    let slot = session
        .current_plan
        .stop_mut(stop_index)
        .ok_or(SessionError::IndexOutOfRange { index: stop_index, len })?;

    new_stop.index = stop_index;
    let before = std::mem::replace(slot, new_stop.clone());
    let record = ChangeRecord {
        seq,
        stop_index,
        before,
        after: new_stop,
        applied_at: Utc::now(),
    };
    session.next_seq += 1;
    session.plan_version += 1;
    session.history.push(record.clone());
    Ok(record)
}
