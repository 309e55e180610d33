//! Transaction Insights Agent
//!
//! A conversational agent that answers questions about a customer's own
//! transactions:
//! - Routes each turn to CLEAR (answerable) or VAGUE (one clarifying question)
//! - Resolves time expressions and category phrases deterministically
//! - Accumulates slots per session across turns
//! - Executes exact transaction queries (language model excluded from data access)
//! - Grounds every customer message in tool results before it is shown
//! - Keeps a sealed, replayable audit record of every answered turn
//!
//! TURN LOOP:
//! QUERY → ROUTE → CLEAR? → EXECUTE → VERIFY → ASSEMBLE

pub mod agent;
pub mod api;
pub mod assembler;
pub mod audit;
pub mod category;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod memory;
pub mod models;
pub mod router;
pub mod state;
pub mod temporal;
pub mod text;
pub mod tools;
pub mod verification;

#[cfg(test)]
mod test_support;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::{create_agent, InsightsAgent, TurnResponse};
pub use models::*;
