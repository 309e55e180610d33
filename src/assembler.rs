//! Output assembly
//!
//! Merges the router's question or the executor's answer into the
//! dual-channel response.

use crate::error::AgentError;
use crate::models::{Classification, DualResponse, RouterOutput};
use crate::Result;

pub struct OutputAssembler;

impl OutputAssembler {
    /// VAGUE turns carry only the clarifying question.
    pub fn clarification(output: &RouterOutput) -> Result<DualResponse> {
        if output.classification != Classification::Vague {
            return Err(AgentError::NotExecutable(
                "only VAGUE outputs carry a clarifying question".to_string(),
            ));
        }
        output.check_invariant()?;

        let question = output
            .clarifying_question
            .clone()
            .ok_or_else(|| AgentError::NotExecutable("VAGUE output without a question".to_string()))?;

        Ok(DualResponse {
            customer_message: question,
            audit_record: None,
        })
    }

    /// CLEAR turns pass the executor response through unchanged.
    pub fn answer(response: DualResponse) -> Result<DualResponse> {
        if response.audit_record.is_none() {
            return Err(AgentError::AuditError(
                "answered turn is missing its audit record".to_string(),
            ));
        }
        Ok(response)
    }
}
