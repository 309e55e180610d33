//! Error types for the transaction insights agent
//!
//! Conversational ambiguity (a missing or unresolved slot) is NOT an error:
//! it is the VAGUE path of the router. Only tool, model and infrastructure
//! failures end up here.

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Resolution outcomes
    // =============================
    // Handled inside the router and turned into a clarifying question.

    #[error("Unresolvable temporal expression: {0}")]
    UnresolvableTemporalExpression(String),

    #[error("Unresolved category: {0}")]
    UnresolvedCategory(String),

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Tool invocation failed ({tool}): {detail}")]
    ToolInvocationFailure { tool: String, detail: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Grounding violation: {0}")]
    GroundingViolation(String),

    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("Router output is not executable: {0}")]
    NotExecutable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Session {0} already has a turn in flight")]
    SessionBusy(String),

    #[error("Session {0} belongs to another customer")]
    SessionMismatch(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgentError {
    /// Timeouts are the only failure kind worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Timeout(_))
    }
}
