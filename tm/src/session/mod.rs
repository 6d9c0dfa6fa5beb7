//! Session state: plans, edit history and pending proposals per session key

mod error;
mod model;
mod store;

pub use error::{SessionError, SessionResult};
pub use model::{ChangeRecord, PendingProposal, ProposalGroup, Session, SessionState, replacement_stop};
pub use store::SessionStore;
