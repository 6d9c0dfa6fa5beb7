//! Conversation state machine
//!
//! Session state lives in the [`SessionStore`]; each turn takes a snapshot,
//! does its adapter I/O without holding any session lock, then commits through
//! a single store call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use eyre::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{Action, ChatResponse, render};
use crate::config::Config;
use crate::domain::{LatLng, ParkingLot, Plan};
use crate::error::AssistantError;
use crate::interpret::{Command, Interpreter, LlmIntentClassifier, TargetRef, Unrecognized};
use crate::places::{GooglePlacesClient, ParkingFinder, PlaceLookup};
use crate::proposal::{ProposalEngine, ProposalOutcome, RainSignal};
use crate::session::{ChangeRecord, PendingProposal, SessionError, SessionStore};
use crate::weather::{ForecastFunctionClient, GridPoint, WeatherSource, fetch_rain_signal};

/// Default bound on a single adapter call
const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(15);

/// Input of a one-off proposal run
#[derive(Debug, Clone, Default)]
pub struct ProposalRequest {
    pub plan: Plan,
    /// Known rainy dates; the forecast is fetched when absent
    pub rainy_dates: Option<Vec<NaiveDate>>,
    pub protect_titles: Vec<String>,
    /// Falls back to the configured top-N
    pub top_n: Option<usize>,
}

/// Runs chat turns against shared sessions
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<SessionStore>,
    interpreter: Interpreter,
    engine: ProposalEngine,
    parking: ParkingFinder,
    weather: Option<Arc<dyn WeatherSource>>,
    grid: GridPoint,
    adapter_timeout: Duration,
    top_n: usize,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        interpreter: Interpreter,
        engine: ProposalEngine,
        parking: ParkingFinder,
        weather: Option<Arc<dyn WeatherSource>>,
    ) -> Self {
        let top_n = engine.config().top_n.max(1);
        Self {
            store,
            interpreter,
            engine,
            parking,
            weather,
            grid: GridPoint::default(),
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
            top_n,
        }
    }

    pub fn with_grid(mut self, grid: GridPoint) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Wire the production adapters from configuration
    ///
    /// Weather is optional: without a function URL every proposal runs degraded.
    pub fn from_config(config: &Config) -> Result<Self> {
        debug!(provider = %config.llm.provider, "from_config: called");
        let adapter_timeout = Duration::from_millis(config.chat.adapter_timeout_ms);

        let llm = crate::llm::create_client(&config.llm).context("Failed to create LLM client")?;
        let classifier = Arc::new(LlmIntentClassifier::new(llm));
        let interpreter = Interpreter::new(classifier).with_timeout(adapter_timeout);

        let lookup: Arc<dyn PlaceLookup> =
            Arc::new(GooglePlacesClient::from_config(&config.places).context("Failed to create places client")?);
        let engine = ProposalEngine::new(lookup.clone(), config.proposal.clone()).with_lookup_timeout(adapter_timeout);
        let parking = ParkingFinder::new(lookup, config.parking.clone());

        let weather: Option<Arc<dyn WeatherSource>> = match config.weather.function_url {
            Some(_) => Some(Arc::new(
                ForecastFunctionClient::from_config(&config.weather).context("Failed to create weather client")?,
            )),
            None => {
                warn!("from_config: no forecast function configured, proposals will run degraded");
                None
            }
        };

        Ok(Self::new(Arc::new(SessionStore::new()), interpreter, engine, parking, weather)
            .with_grid(GridPoint::new(config.weather.nx, config.weather.ny))
            .with_adapter_timeout(adapter_timeout))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle one user message
    ///
    /// `plan` initializes the session on first reference (or after a reset);
    /// it is ignored for a session that already holds a plan.
    pub async fn chat(&self, session_id: &str, message: &str, plan: Option<Plan>) -> ChatResponse {
        debug!(%session_id, message_len = message.len(), has_plan = plan.is_some(), "chat: called");
        if let Some(plan) = plan {
            if let Err(e) = self.open_session(session_id, plan).await {
                return ChatResponse::failure(Action::Error, &e);
            }
        }

        let session = match self.store.snapshot(session_id).await {
            Ok(session) => session,
            Err(e) => return ChatResponse::failure(Action::Error, &AssistantError::from(e)),
        };

        let command = match self.interpreter.interpret(&session, message).await {
            Ok(command) => command,
            Err(e) => {
                warn!(%session_id, error = %e, "chat: interpretation failed");
                return ChatResponse::failure(Action::Error, &AssistantError::from(e));
            }
        };
        self.execute(session_id, command).await
    }

    /// Run a structured command against a session
    pub async fn execute(&self, session_id: &str, command: Command) -> ChatResponse {
        debug!(%session_id, ?command, "execute: called");
        let action = Action::for_command(&command);
        let result = match command {
            Command::CheckAlternatives => self.check_alternatives(session_id).await,
            Command::ApplyChange { target } => self.apply_target(session_id, target).await,
            Command::Rollback => self.rollback(session_id).await,
            Command::Reset => self.reset(session_id).await,
            Command::ShowPlan => self.show_plan(session_id).await,
            Command::ShowHistory => self.show_history(session_id).await,
            Command::Help => Ok(ChatResponse::ok(Action::Help, render::HELP_TEXT, None)),
            Command::Unrecognized(reason) => {
                if let Unrecognized::AmbiguousReference { focus: Some(index), .. } = &reason {
                    if let Err(e) = self.store.set_focus_stop(session_id, Some(*index)).await {
                        warn!(%session_id, index, error = %e, "execute: could not focus named stop");
                    }
                }
                let response = render::unrecognized(&reason);
                let err = AssistantError::from(reason);
                Ok(ChatResponse {
                    response,
                    ..ChatResponse::failure(Action::Unrecognized, &err)
                })
            }
        };

        result.unwrap_or_else(|e| {
            warn!(%session_id, kind = %e.kind(), error = %e, "execute: command failed");
            ChatResponse::failure(action, &e)
        })
    }

    /// Apply an alternative by group position and list position, both 0-based
    pub async fn apply_choice(
        &self,
        session_id: &str,
        candidate_index: usize,
        alternative_index: usize,
    ) -> Result<Plan, AssistantError> {
        debug!(%session_id, candidate_index, alternative_index, "apply_choice: called");
        let session = self.store.snapshot(session_id).await?;
        let pending = session.pending_proposal.ok_or(SessionError::NoPendingProposal)?;
        let group = pending.groups.get(candidate_index).ok_or(SessionError::IndexOutOfRange {
            index: candidate_index,
            len: pending.groups.len(),
        })?;
        let target = TargetRef {
            stop_index: group.stop_index,
            alternative_index,
        };
        let (plan, _) = self.apply_pending(session_id, &pending, target).await?;
        Ok(plan)
    }

    /// Run the proposal engine outside any session
    pub async fn propose(&self, request: ProposalRequest) -> Result<ProposalOutcome, AssistantError> {
        propose_once(
            &self.engine,
            self.weather.as_deref(),
            self.grid,
            self.adapter_timeout,
            request,
        )
        .await
    }

    /// Init a session from `plan`, with parking attached, unless it already holds one
    pub async fn open_session(&self, session_id: &str, plan: Plan) -> Result<(), AssistantError> {
        let needs_init = match self.store.snapshot(session_id).await {
            Ok(session) => session.reinit_allowed,
            Err(_) => true,
        };
        if !needs_init {
            debug!(%session_id, "open_session: already initialized, ignoring plan");
            return Ok(());
        }

        let plan = plan.normalized();
        let plan = match tokio::time::timeout(self.adapter_timeout, self.parking.attach(&plan)).await {
            Ok(with_parking) => with_parking,
            Err(_) => {
                warn!(%session_id, "open_session: parking lookup timed out");
                plan
            }
        };

        match self.store.init(session_id, plan).await {
            Ok(_) => {
                info!(%session_id, "open_session: session initialized");
                Ok(())
            }
            Err(SessionError::AlreadyInitialized(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn check_alternatives(&self, session_id: &str) -> Result<ChatResponse, AssistantError> {
        let session = self.store.snapshot(session_id).await?;
        let rain = rain_signal(self.weather.as_deref(), self.grid, self.adapter_timeout).await;
        let outcome = self
            .engine
            .propose(&session.current_plan, &rain, &BTreeSet::new(), self.top_n)
            .await?;

        if outcome.is_empty() {
            self.store
                .set_pending_proposal(session_id, session.plan_version, None)
                .await?;
            info!(%session_id, degraded = outcome.degraded, "check_alternatives: nothing to replace");
            return Ok(ChatResponse::ok(
                Action::CheckAlternatives,
                render::nothing_to_propose(outcome.degraded, &outcome.kept),
                Some(json!({
                    "proposal_id": null,
                    "groups": [],
                    "degraded": outcome.degraded,
                    "kept": outcome.kept,
                })),
            ));
        }

        let pending = PendingProposal::from_outcome(&outcome, &session.current_plan, session.plan_version);
        let response = render::proposal(&pending);
        let data = json!({
            "proposal_id": pending.id,
            "groups": pending.groups,
            "degraded": pending.degraded,
            "kept": outcome.kept,
        });
        // the plan may have changed while the lookups ran
        self.store
            .set_pending_proposal(session_id, session.plan_version, Some(pending))
            .await?;
        info!(
            %session_id,
            stops = outcome.proposals.len(),
            candidates = outcome.candidate_count(),
            "check_alternatives: proposal pending"
        );
        Ok(ChatResponse::ok(Action::CheckAlternatives, response, Some(data)))
    }

    async fn apply_target(&self, session_id: &str, target: TargetRef) -> Result<ChatResponse, AssistantError> {
        let session = self.store.snapshot(session_id).await?;
        let pending = session.pending_proposal.ok_or(SessionError::NoPendingProposal)?;
        let (plan, record) = self.apply_pending(session_id, &pending, target).await?;
        Ok(ChatResponse::ok(
            Action::ApplyChange,
            render::applied(&record),
            Some(json!({ "plan": plan, "change": record })),
        ))
    }

    /// Look up parking for the chosen candidate, then commit
    async fn apply_pending(
        &self,
        session_id: &str,
        pending: &PendingProposal,
        target: TargetRef,
    ) -> Result<(Plan, ChangeRecord), AssistantError> {
        let group = pending.group(target.stop_index).ok_or(SessionError::IndexOutOfRange {
            index: target.stop_index,
            len: pending.groups.len(),
        })?;
        let candidate = group
            .candidates
            .get(target.alternative_index)
            .ok_or(SessionError::IndexOutOfRange {
                index: target.alternative_index,
                len: group.candidates.len(),
            })?;

        let parking = self.parking_near(LatLng::new(candidate.lat, candidate.lng)).await;
        let applied = self
            .store
            .apply_proposed(session_id, &pending.id, target.stop_index, target.alternative_index, parking)
            .await?;
        Ok(applied)
    }

    /// Parking near a point; lookup failures leave the list empty
    async fn parking_near(&self, center: LatLng) -> Vec<ParkingLot> {
        match tokio::time::timeout(self.adapter_timeout, self.parking.nearest(center)).await {
            Ok(Ok(lots)) => lots,
            Ok(Err(e)) => {
                warn!(%center, error = %e, "parking_near: lookup failed");
                Vec::new()
            }
            Err(_) => {
                warn!(%center, "parking_near: lookup timed out");
                Vec::new()
            }
        }
    }

    async fn rollback(&self, session_id: &str) -> Result<ChatResponse, AssistantError> {
        let (plan, undone) = self.store.rollback(session_id).await?;
        Ok(ChatResponse::ok(
            Action::Rollback,
            render::rolled_back(&undone),
            Some(json!({ "plan": plan, "undone": undone })),
        ))
    }

    async fn reset(&self, session_id: &str) -> Result<ChatResponse, AssistantError> {
        let plan = self.store.reset(session_id).await?;
        Ok(ChatResponse::ok(Action::Reset, render::reset(), Some(json!({ "plan": plan }))))
    }

    async fn show_plan(&self, session_id: &str) -> Result<ChatResponse, AssistantError> {
        let session = self.store.snapshot(session_id).await?;
        Ok(ChatResponse::ok(
            Action::ShowPlan,
            render::plan(&session.current_plan),
            Some(json!({ "plan": session.current_plan, "state": session.state() })),
        ))
    }

    async fn show_history(&self, session_id: &str) -> Result<ChatResponse, AssistantError> {
        let history = self.store.history(session_id).await?;
        Ok(ChatResponse::ok(
            Action::ShowHistory,
            render::history(&history),
            Some(json!({ "history": history })),
        ))
    }
}

/// Forecast for `grid`, or `Unavailable` without a source
async fn rain_signal(weather: Option<&dyn WeatherSource>, grid: GridPoint, timeout: Duration) -> RainSignal {
    match weather {
        Some(source) => fetch_rain_signal(source, grid, timeout).await,
        None => RainSignal::Unavailable,
    }
}

/// One proposal run with no session behind it
///
/// Explicit rainy dates skip the forecast; a missing top-N falls back to the
/// engine's configured value.
pub async fn propose_once(
    engine: &ProposalEngine,
    weather: Option<&dyn WeatherSource>,
    grid: GridPoint,
    timeout: Duration,
    request: ProposalRequest,
) -> Result<ProposalOutcome, AssistantError> {
    debug!(stops = request.plan.len(), has_dates = request.rainy_dates.is_some(), "propose_once: called");
    let rain = match request.rainy_dates {
        Some(dates) => RainSignal::Dates(dates.into_iter().collect()),
        None => rain_signal(weather, grid, timeout).await,
    };
    let protect: BTreeSet<String> = request.protect_titles.into_iter().collect();
    let top_n = request.top_n.unwrap_or_else(|| engine.config().top_n.max(1));
    Ok(engine.propose(&request.plan, &rain, &protect, top_n).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParkingConfig, ProposalConfig};
    use crate::domain::{ItineraryStop, StopKind};
    use crate::interpret::mock::ScriptedClassifier;
    use crate::interpret::{Intent, InterpretError};
    use crate::places::mock::{StaticLookup, place};
    use crate::session::SessionState;
    use crate::weather::mock::StaticWeather;

    fn aug(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    fn gangneung_plan() -> Plan {
        let mut start = ItineraryStop::new(1, "강릉역");
        start.kind = StopKind::Travel;
        let mut lake = ItineraryStop::new(2, "경포호");
        lake.lat = Some(37.7956);
        lake.lng = Some(128.9081);
        lake.start_time = Some("2025-08-20T13:00:00+09:00".to_string());
        lake.end_time = Some("2025-08-20T15:00:00+09:00".to_string());
        Plan::new(vec![start, lake])
    }

    fn lookup() -> StaticLookup {
        StaticLookup::new()
            .with(
                "박물관",
                vec![place("참소리축음기박물관", 37.7960, 128.8970, Some(4.5))],
            )
            .with(
                "카페",
                vec![
                    place("카페 툇마루", 37.7900, 128.9100, Some(4.7)),
                    place("보헤미안 카페", 37.8000, 128.9000, Some(4.5)),
                ],
            )
            .with("공영주차장", vec![place("경포 공영주차장", 37.8005, 128.9010, None)])
    }

    fn proposal_config() -> ProposalConfig {
        ProposalConfig {
            search_keywords: vec!["박물관".to_string(), "카페".to_string()],
            ..Default::default()
        }
    }

    fn orchestrator(script: Vec<Result<Option<Intent>, InterpretError>>, weather: StaticWeather) -> ChatOrchestrator {
        let lookup: Arc<dyn PlaceLookup> = Arc::new(lookup());
        ChatOrchestrator::new(
            Arc::new(SessionStore::new()),
            Interpreter::new(Arc::new(ScriptedClassifier::new(script))),
            ProposalEngine::new(lookup.clone(), proposal_config()),
            ParkingFinder::new(lookup, ParkingConfig::default()),
            Some(Arc::new(weather)),
        )
        .with_adapter_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_check_then_apply_by_ordinal() {
        let chat = orchestrator(
            vec![Ok(Some(Intent::CheckAlternatives)), Ok(Some(Intent::ApplyChange))],
            StaticWeather::Rainy(vec![aug(20)]),
        );

        let resp = chat.chat("s1", "비 오면 대안 찾아줘", Some(gangneung_plan())).await;
        assert!(resp.success, "{resp:?}");
        assert_eq!(resp.action, Action::CheckAlternatives);
        let data = resp.data.unwrap();
        assert_eq!(data["degraded"], false);
        assert_eq!(data["groups"][0]["stop_index"], 2);
        assert_eq!(data["groups"][0]["candidates"][0]["title"], "카페 툇마루");

        let resp = chat.chat("s1", "두 번째 대안으로 해줘", None).await;
        assert!(resp.success, "{resp:?}");
        assert_eq!(resp.action, Action::ApplyChange);

        let session = chat.store().snapshot("s1").await.unwrap();
        let stop = session.current_plan.stop(2).unwrap();
        assert_eq!(stop.title, "보헤미안 카페");
        assert_eq!(stop.kind, StopKind::Place);
        assert_eq!(stop.parking[0].name, "경포 공영주차장");
        assert_eq!(session.state(), SessionState::Fresh);
        assert_eq!(session.history.len(), 1);
    }

    #[tokio::test]
    async fn test_weather_failure_runs_degraded() {
        let chat = orchestrator(vec![Ok(Some(Intent::CheckAlternatives))], StaticWeather::Failing);
        let resp = chat.chat("s", "대안", Some(gangneung_plan())).await;
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["degraded"], true);
        assert!(resp.response.contains("날씨 정보를 가져오지 못해서"));
    }

    #[tokio::test]
    async fn test_dry_forecast_clears_pending() {
        let chat = orchestrator(vec![Ok(Some(Intent::CheckAlternatives))], StaticWeather::Dry(vec![aug(20)]));
        let resp = chat.chat("s", "대안", Some(gangneung_plan())).await;
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["proposal_id"], serde_json::Value::Null);
        let session = chat.store().snapshot("s").await.unwrap();
        assert!(session.pending_proposal.is_none());
    }

    #[tokio::test]
    async fn test_rollback_on_empty_history() {
        let chat = orchestrator(vec![Ok(Some(Intent::Rollback))], StaticWeather::Failing);
        let resp = chat.chat("s", "되돌려줘", Some(gangneung_plan())).await;
        assert!(!resp.success);
        assert_eq!(resp.action, Action::Rollback);
        assert_eq!(resp.error_kind(), Some("nothing_to_rollback"));
        assert!(resp.response.starts_with("죄송해요"));
    }

    #[tokio::test]
    async fn test_unknown_session_without_plan() {
        let chat = orchestrator(vec![Ok(Some(Intent::ShowPlan))], StaticWeather::Failing);
        let resp = chat.chat("missing", "일정 보여줘", None).await;
        assert!(!resp.success);
        assert_eq!(resp.action, Action::Error);
        assert_eq!(resp.error_kind(), Some("session_not_found"));
    }

    #[tokio::test]
    async fn test_classifier_failure_is_adapter_unavailable() {
        let chat = orchestrator(
            vec![Err(InterpretError::AdapterUnavailable("down".to_string()))],
            StaticWeather::Failing,
        );
        let resp = chat.chat("s", "아무거나", Some(gangneung_plan())).await;
        assert!(!resp.success);
        assert_eq!(resp.error_kind(), Some("adapter_unavailable"));
        assert!(!resp.response.contains("down"));
    }

    #[tokio::test]
    async fn test_apply_without_proposal() {
        let chat = orchestrator(vec![Ok(Some(Intent::ApplyChange))], StaticWeather::Failing);
        let resp = chat.chat("s", "첫 번째로 해줘", Some(gangneung_plan())).await;
        assert!(!resp.success);
        assert_eq!(resp.action, Action::Unrecognized);
        assert_eq!(resp.error_kind(), Some("no_pending_proposal"));
    }

    #[tokio::test]
    async fn test_second_plan_is_ignored() {
        let chat = orchestrator(vec![Ok(Some(Intent::ShowPlan))], StaticWeather::Failing);
        chat.chat("s", "일정", Some(gangneung_plan())).await;
        let other = Plan::new(vec![ItineraryStop::new(1, "다른 일정")]);
        let resp = chat.chat("s", "일정", Some(other)).await;
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["plan"]["itinerary"][1]["title"], "경포호");
    }

    #[tokio::test]
    async fn test_apply_choice_and_reset() {
        let chat = orchestrator(vec![Ok(Some(Intent::CheckAlternatives))], StaticWeather::Rainy(vec![aug(20)]));
        chat.chat("s", "대안", Some(gangneung_plan())).await;

        let plan = chat.apply_choice("s", 0, 2).await.unwrap();
        assert_eq!(plan.stop(2).unwrap().title, "참소리축음기박물관");

        let err = chat.apply_choice("s", 0, 0).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "no_pending_proposal");

        let resp = chat.execute("s", Command::Reset).await;
        assert!(resp.success);
        let session = chat.store().snapshot("s").await.unwrap();
        assert_eq!(session.current_plan, session.original_plan);
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_apply_choice_out_of_range() {
        let chat = orchestrator(vec![Ok(Some(Intent::CheckAlternatives))], StaticWeather::Rainy(vec![aug(20)]));
        chat.chat("s", "대안", Some(gangneung_plan())).await;
        let err = chat.apply_choice("s", 3, 0).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "index_out_of_range");
        let err = chat.apply_choice("s", 0, 9).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "index_out_of_range");
    }

    #[tokio::test]
    async fn test_propose_with_explicit_dates() {
        let chat = orchestrator(vec![], StaticWeather::Failing);
        let outcome = chat
            .propose(ProposalRequest {
                plan: gangneung_plan(),
                rainy_dates: Some(vec![aug(20)]),
                protect_titles: vec![],
                top_n: Some(1),
            })
            .await
            .unwrap();
        assert!(!outcome.degraded);
        assert_eq!(outcome.proposals[&2].len(), 1);

        let err = chat
            .propose(ProposalRequest {
                plan: gangneung_plan(),
                top_n: Some(0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid_argument");
    }
}
