//! Conversation memory
//!
//! Session-scoped slot accumulation with provenance, plus the running summary
//! of established facts.

pub mod state;
pub mod summary;

pub use state::{ConversationState, PendingIntent, SlotEntry, SlotSource, SlotValue};
pub use summary::StateSummarizer;
