//! tripmate - conversational travel itinerary assistant
//!
//! Holds a travel plan per chat session and lets the user edit it in natural
//! language: look for indoor alternatives when rain is forecast, apply one,
//! undo, reset, and review the change history.
//!
//! # Modules
//!
//! - [`domain`] - Plan, stops and geo helpers
//! - [`proposal`] - Rain exposure policy, candidate ranking and the proposal engine
//! - [`session`] - Per-session plan state with history and rollback
//! - [`interpret`] - Intent classification and target resolution
//! - [`chat`] - Turn orchestration and Korean reply templates
//! - [`places`] - Place search, geocoding and nearby parking
//! - [`weather`] - Forecast function adapter
//! - [`llm`] - LLM client trait with OpenAI and Anthropic implementations
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod chat;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod interpret;
pub mod llm;
pub mod places;
pub mod proposal;
pub mod repl;
pub mod session;
pub mod weather;

// Re-export commonly used types
pub use chat::{Action, ChatOrchestrator, ChatResponse, ProposalRequest};
pub use config::{Config, LlmConfig};
pub use domain::{ItineraryStop, LatLng, ParkingLot, Plan, StopKind};
pub use error::{AssistantError, ErrorKind};
pub use interpret::{Command, Intent, IntentClassifier, Interpreter, TargetRef, Unrecognized};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
pub use places::{LookupError, Place, PlaceLookup, PlaceQuery};
pub use proposal::{AlternativeCandidate, ProposalEngine, ProposalOutcome, RainSignal};
pub use session::{ChangeRecord, PendingProposal, Session, SessionError, SessionStore};
pub use weather::{Forecast, GridPoint, WeatherError, WeatherSource};
