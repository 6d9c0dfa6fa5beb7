//! Intent classification

use std::sync::Arc;

use async_trait::async_trait;
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Intent, InterpretError};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::session::Session;

/// Prompt used by [`LlmIntentClassifier`]
const INTENT_PROMPT: &str = include_str!("../../prompts/intent.pmt");

/// Tokens allowed for the classifier's reply
const CLASSIFY_MAX_TOKENS: u32 = 32;

/// What the classifier may see of the session
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntentContext {
    pub has_pending: bool,
    pub stops: Vec<String>,
    pub candidates: Vec<String>,
}

impl IntentContext {
    pub fn from_session(session: &Session) -> Self {
        let stops = session
            .current_plan
            .itinerary
            .iter()
            .map(|s| format!("{}. {}", s.index, s.title))
            .collect();
        let candidates = session
            .pending_proposal
            .iter()
            .flat_map(|p| p.groups.iter())
            .flat_map(|g| g.candidates.iter().map(move |c| format!("{} → {}", g.stop_title, c.title)))
            .collect();
        Self {
            has_pending: session.pending_proposal.is_some(),
            stops,
            candidates,
        }
    }
}

/// Maps free text onto the fixed intent taxonomy
///
/// `Ok(None)` means the text matched no intent.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str, context: &IntentContext) -> Result<Option<Intent>, InterpretError>;
}

/// Classifier backed by an LLM completion
pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmClient>,
    hbs: Handlebars<'static>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let mut hbs = Handlebars::new();
        // plain-text prompt, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        Self { llm, hbs }
    }

    fn render_prompt(&self, context: &IntentContext) -> Result<String, InterpretError> {
        self.hbs
            .render_template(INTENT_PROMPT, context)
            .map_err(|e| InterpretError::Prompt(e.to_string()))
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, text: &str, context: &IntentContext) -> Result<Option<Intent>, InterpretError> {
        debug!(text_len = text.len(), has_pending = context.has_pending, "classify: called");
        let request = CompletionRequest {
            system_prompt: self.render_prompt(context)?,
            messages: vec![Message::user(text)],
            max_tokens: CLASSIFY_MAX_TOKENS,
        };

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| InterpretError::AdapterUnavailable(e.to_string()))?;

        let raw = response.content.unwrap_or_default();
        let intent = parse_intent_tag(&raw);
        if intent.is_none() {
            warn!(%raw, "classify: output outside the command set");
        }
        debug!(?intent, "classify: done");
        Ok(intent)
    }
}

/// Read a tag from model output: bare (`rollback`) or JSON (`{"command": "rollback"}`)
///
/// Code fences, quotes and surrounding punctuation are ignored. Anything else
/// is `None`.
pub fn parse_intent_tag(raw: &str) -> Option<Intent> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        return value.get("command")?.as_str()?.trim().parse().ok();
    }

    trimmed
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace())
        .to_lowercase()
        .parse()
        .ok()
}
