//! Natural-language command interpretation
//!
//! Free text is classified into a fixed set of intents by an
//! [`IntentClassifier`]; which alternative an apply request refers to is then
//! resolved deterministically against the session's pending proposal. Nothing
//! here mutates the session.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::Session;

mod classifier;
mod resolve;

pub use classifier::{IntentClassifier, IntentContext, LlmIntentClassifier, parse_intent_tag};
pub use resolve::{Ordinal, parse_ordinal, resolve_target};

#[cfg(test)]
pub use classifier::mock;

/// Default bound on a classifier call
const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// The fixed intent taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CheckAlternatives,
    ApplyChange,
    Rollback,
    Reset,
    ShowPlan,
    ShowHistory,
    Help,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::CheckAlternatives,
        Intent::ApplyChange,
        Intent::Rollback,
        Intent::Reset,
        Intent::ShowPlan,
        Intent::ShowHistory,
        Intent::Help,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CheckAlternatives => "check_alternatives",
            Intent::ApplyChange => "apply_change",
            Intent::Rollback => "rollback",
            Intent::Reset => "reset",
            Intent::ShowPlan => "show_plan",
            Intent::ShowHistory => "show_history",
            Intent::Help => "help",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown intent tag: {}", s))
    }
}

/// Which alternative to apply: stop index (1-based) and position in its list (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub stop_index: usize,
    pub alternative_index: usize,
}

/// Why a message did not become an executable command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unrecognized {
    /// Text fits none of the intents
    Intent,
    /// Reference matched zero or several candidates
    ///
    /// `focus` is the one stop the text named, if any, so a follow-up ordinal
    /// can resolve against it.
    AmbiguousReference {
        prompt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        focus: Option<usize>,
    },
    /// Apply requested with nothing on offer
    NoPendingProposal,
}

/// A structured command for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CheckAlternatives,
    ApplyChange { target: TargetRef },
    Rollback,
    Reset,
    ShowPlan,
    ShowHistory,
    Help,
    Unrecognized(Unrecognized),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpretError {
    #[error("Intent classifier unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Failed to render classifier prompt: {0}")]
    Prompt(String),
}

/// Turns free text into a [`Command`]
#[derive(Clone)]
pub struct Interpreter {
    classifier: Arc<dyn IntentClassifier>,
    timeout: Duration,
}

impl Interpreter {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self {
            classifier,
            timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn interpret(&self, session: &Session, text: &str) -> Result<Command, InterpretError> {
        debug!(key = %session.key, text_len = text.len(), "interpret: called");
        let context = IntentContext::from_session(session);

        let intent = match tokio::time::timeout(self.timeout, self.classifier.classify(text, &context)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "interpret: classifier timed out");
                return Err(InterpretError::AdapterUnavailable(format!(
                    "classifier timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let command = match intent {
            None => Command::Unrecognized(Unrecognized::Intent),
            Some(Intent::CheckAlternatives) => Command::CheckAlternatives,
            Some(Intent::ApplyChange) => match resolve_target(session, text) {
                Ok(target) => Command::ApplyChange { target },
                Err(reason) => Command::Unrecognized(reason),
            },
            Some(Intent::Rollback) => Command::Rollback,
            Some(Intent::Reset) => Command::Reset,
            Some(Intent::ShowPlan) => Command::ShowPlan,
            Some(Intent::ShowHistory) => Command::ShowHistory,
            Some(Intent::Help) => Command::Help,
        };
        debug!(?command, "interpret: done");
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::ScriptedClassifier;
    use super::*;
    use crate::domain::{ItineraryStop, Plan};
    use crate::proposal::AlternativeCandidate;
    use crate::session::{PendingProposal, ProposalGroup};
    use async_trait::async_trait;

    fn session_with_pending() -> Session {
        let plan = Plan::new(vec![ItineraryStop::new(1, "강릉 단오제"), ItineraryStop::new(2, "경포호")]);
        let mut session = Session::new("s", plan);
        session.pending_proposal = Some(PendingProposal {
            id: "p".to_string(),
            groups: vec![ProposalGroup {
                stop_index: 2,
                stop_title: "경포호".to_string(),
                candidates: ["강릉시립미술관", "참소리축음기박물관", "카페 툇마루"]
                    .iter()
                    .map(|t| AlternativeCandidate {
                        title: t.to_string(),
                        rating: None,
                        distance_km: 1.0,
                        address: String::new(),
                        place_id: None,
                        lat: 0.0,
                        lng: 0.0,
                    })
                    .collect(),
            }],
            degraded: false,
            plan_version: 0,
            created_at: chrono::Utc::now(),
        });
        session.focus_stop = Some(2);
        session
    }

    #[test]
    fn test_intent_tags_round_trip() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>(), Ok(intent));
        }
        assert!("undo".parse::<Intent>().is_err());
    }

    #[tokio::test]
    async fn test_apply_change_resolves_ordinal() {
        let interpreter = Interpreter::new(Arc::new(ScriptedClassifier::always(Intent::ApplyChange)));
        let command = interpreter
            .interpret(&session_with_pending(), "두 번째 대안으로 해줘")
            .await
            .unwrap();
        assert_eq!(
            command,
            Command::ApplyChange {
                target: TargetRef {
                    stop_index: 2,
                    alternative_index: 1
                }
            }
        );
    }

    #[tokio::test]
    async fn test_apply_without_pending() {
        let interpreter = Interpreter::new(Arc::new(ScriptedClassifier::always(Intent::ApplyChange)));
        let mut session = session_with_pending();
        session.pending_proposal = None;
        let command = interpreter.interpret(&session, "두 번째").await.unwrap();
        assert_eq!(command, Command::Unrecognized(Unrecognized::NoPendingProposal));
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let interpreter = Interpreter::new(Arc::new(ScriptedClassifier::new(vec![Ok(None)])));
        let command = interpreter.interpret(&session_with_pending(), "날씨 어때?").await.unwrap();
        assert_eq!(command, Command::Unrecognized(Unrecognized::Intent));
    }

    #[tokio::test]
    async fn test_simple_intents_pass_through() {
        let interpreter = Interpreter::new(Arc::new(ScriptedClassifier::new(vec![
            Ok(Some(Intent::Rollback)),
            Ok(Some(Intent::ShowPlan)),
        ])));
        let session = session_with_pending();
        assert_eq!(interpreter.interpret(&session, "되돌려").await.unwrap(), Command::Rollback);
        assert_eq!(interpreter.interpret(&session, "일정").await.unwrap(), Command::ShowPlan);
    }

    #[tokio::test]
    async fn test_classifier_failure_is_adapter_unavailable() {
        let interpreter = Interpreter::new(Arc::new(ScriptedClassifier::new(vec![Err(
            InterpretError::AdapterUnavailable("503".to_string()),
        )])));
        let err = interpreter.interpret(&session_with_pending(), "아무거나").await.unwrap_err();
        assert!(matches!(err, InterpretError::AdapterUnavailable(_)));
    }

    struct Stalled;

    #[async_trait]
    impl IntentClassifier for Stalled {
        async fn classify(&self, _text: &str, _context: &IntentContext) -> Result<Option<Intent>, InterpretError> {
            std::future::pending::<()>().await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_classifier_timeout() {
        let interpreter = Interpreter::new(Arc::new(Stalled)).with_timeout(Duration::from_millis(20));
        let err = interpreter.interpret(&session_with_pending(), "두 번째").await.unwrap_err();
        assert!(matches!(err, InterpretError::AdapterUnavailable(_)));
    }
}
