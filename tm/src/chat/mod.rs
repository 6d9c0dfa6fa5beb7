//! Chat orchestration
//!
//! Drives one conversational turn: interpret the message, run the command
//! against the session store and the adapters, then render a Korean reply with
//! a structured payload.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::AssistantError;
use crate::interpret::Command;

mod orchestrator;
pub mod render;

pub use orchestrator::{ChatOrchestrator, ProposalRequest, propose_once};

/// Machine-readable tag for what a turn did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CheckAlternatives,
    ApplyChange,
    Rollback,
    Reset,
    ShowPlan,
    ShowHistory,
    Help,
    Unrecognized,
    Error,
}

impl Action {
    pub fn for_command(command: &Command) -> Self {
        match command {
            Command::CheckAlternatives => Action::CheckAlternatives,
            Command::ApplyChange { .. } => Action::ApplyChange,
            Command::Rollback => Action::Rollback,
            Command::Reset => Action::Reset,
            Command::ShowPlan => Action::ShowPlan,
            Command::ShowHistory => Action::ShowHistory,
            Command::Help => Action::Help,
            Command::Unrecognized(_) => Action::Unrecognized,
        }
    }
}

/// Reply for one chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub action: Action,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ChatResponse {
    pub fn ok(action: Action, response: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            response: response.into(),
            action,
            success: true,
            data,
        }
    }

    /// Apologetic reply carrying `data.error = {kind, detail}`
    pub fn failure(action: Action, err: &AssistantError) -> Self {
        Self {
            response: render::error(err),
            action,
            success: false,
            data: Some(json!({
                "error": {
                    "kind": err.kind(),
                    "detail": err.to_string(),
                }
            })),
        }
    }

    /// Kind tag of a failed turn
    pub fn error_kind(&self) -> Option<&str> {
        self.data.as_ref()?.get("error")?.get("kind")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;

    #[test]
    fn test_failure_payload() {
        let err = AssistantError::from(SessionError::NothingToRollback);
        let resp = ChatResponse::failure(Action::Rollback, &err);
        assert!(!resp.success);
        assert_eq!(resp.error_kind(), Some("nothing_to_rollback"));

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["action"], "rollback");
        assert_eq!(value["data"]["error"]["detail"], "Nothing to roll back");
    }

    #[test]
    fn test_ok_without_data_omits_field() {
        let resp = ChatResponse::ok(Action::Help, render::HELP_TEXT, None);
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("data").is_none());
        assert_eq!(resp.error_kind(), None);
    }
}
