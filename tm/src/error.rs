//! Crate-level error type with stable kind tags

use serde::Serialize;
use thiserror::Error;

use crate::interpret::{InterpretError, Unrecognized};
use crate::proposal::ProposalError;
use crate::session::SessionError;

/// Stable, machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SessionNotFound,
    AlreadyInitialized,
    IndexOutOfRange,
    NothingToRollback,
    AdapterUnavailable,
    AmbiguousReference,
    Unrecognized,
    NoPendingProposal,
    InvalidArgument,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::AlreadyInitialized => "already_initialized",
            ErrorKind::IndexOutOfRange => "index_out_of_range",
            ErrorKind::NothingToRollback => "nothing_to_rollback",
            ErrorKind::AdapterUnavailable => "adapter_unavailable",
            ErrorKind::AmbiguousReference => "ambiguous_reference",
            ErrorKind::Unrecognized => "unrecognized",
            ErrorKind::NoPendingProposal => "no_pending_proposal",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error(transparent)]
    Interpret(#[from] InterpretError),

    #[error("Ambiguous reference: {0}")]
    AmbiguousReference(String),

    #[error("Request not recognized")]
    Unrecognized,
}

impl AssistantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssistantError::Session(e) => match e {
                SessionError::NotFound(_) => ErrorKind::SessionNotFound,
                SessionError::AlreadyInitialized(_) => ErrorKind::AlreadyInitialized,
                SessionError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
                SessionError::NothingToRollback => ErrorKind::NothingToRollback,
                SessionError::NoPendingProposal => ErrorKind::NoPendingProposal,
                SessionError::StaleProposal => ErrorKind::Conflict,
            },
            AssistantError::Proposal(ProposalError::InvalidArgument(_)) => ErrorKind::InvalidArgument,
            AssistantError::Proposal(ProposalError::AdapterUnavailable { .. }) => ErrorKind::AdapterUnavailable,
            AssistantError::Interpret(InterpretError::AdapterUnavailable(_)) => ErrorKind::AdapterUnavailable,
            AssistantError::Interpret(InterpretError::Prompt(_)) => ErrorKind::AdapterUnavailable,
            AssistantError::AmbiguousReference(_) => ErrorKind::AmbiguousReference,
            AssistantError::Unrecognized => ErrorKind::Unrecognized,
        }
    }
}

impl From<Unrecognized> for AssistantError {
    fn from(reason: Unrecognized) -> Self {
        match reason {
            Unrecognized::Intent => AssistantError::Unrecognized,
            Unrecognized::AmbiguousReference { prompt, .. } => AssistantError::AmbiguousReference(prompt),
            Unrecognized::NoPendingProposal => AssistantError::Session(SessionError::NoPendingProposal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::LookupError;

    #[test]
    fn test_kinds() {
        let cases: Vec<(AssistantError, &str)> = vec![
            (SessionError::NotFound("x".into()).into(), "session_not_found"),
            (SessionError::AlreadyInitialized("x".into()).into(), "already_initialized"),
            (SessionError::IndexOutOfRange { index: 9, len: 3 }.into(), "index_out_of_range"),
            (SessionError::NothingToRollback.into(), "nothing_to_rollback"),
            (SessionError::StaleProposal.into(), "conflict"),
            (
                ProposalError::AdapterUnavailable {
                    stop_index: 2,
                    source: LookupError::Timeout,
                }
                .into(),
                "adapter_unavailable",
            ),
            (InterpretError::AdapterUnavailable("t".into()).into(), "adapter_unavailable"),
            (ProposalError::InvalidArgument("top_n".into()).into(), "invalid_argument"),
            (Unrecognized::Intent.into(), "unrecognized"),
            (Unrecognized::NoPendingProposal.into(), "no_pending_proposal"),
            (
                Unrecognized::AmbiguousReference {
                    prompt: "p".into(),
                    focus: None,
                }
                .into(),
                "ambiguous_reference",
            ),
        ];
        for (err, tag) in cases {
            assert_eq!(err.kind().as_str(), tag, "{err}");
            assert_eq!(serde_json::to_value(err.kind()).unwrap(), tag);
        }
    }
}
