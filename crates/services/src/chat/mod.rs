//! Per-session chat transcripts with optimistic sends and regeneration.

mod state;
mod store;

pub use store::{AI_ERROR_TEXT, RegenerateOutcome, SendOutcome, SessionMessageStore};
