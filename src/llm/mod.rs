//! Language model layer
//!
//! Models are fallible, structured-in / text-out collaborators. Nothing in
//! the pipeline trusts their output without a parse or validation step.

pub mod gemini;
pub mod structured;

pub use gemini::GeminiClient;
pub use structured::{generate_structured, generate_text, parse_structured, strip_code_fences};

use crate::error::AgentError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelTask {
    ClarifyingQuestion,
    AnswerComposition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub task: ModelTask,
    pub system_instruction: String,
    pub prompt: String,
    /// Ask the model for a bare JSON object.
    pub json_output: bool,
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: &ModelRequest) -> Result<String>;
}

/// One canned reply of a [`ScriptedModel`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
    /// Never answers within any reasonable timeout.
    Hang,
}

/// Model that replays a fixed script. Used by tests and the offline demo.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| ScriptedReply::Text(t.into())).collect())
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| AgentError::LlmError("scripted model poisoned".to_string()))?
            .pop_front();

        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(reason)) => Err(AgentError::LlmError(reason)),
            Some(ScriptedReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AgentError::LlmError("scripted hang elapsed".to_string()))
            }
            None => Err(AgentError::LlmError("script exhausted".to_string())),
        }
    }
}
