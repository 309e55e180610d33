//! Typed parsing of model output with bounded retries.

use super::{LanguageModel, ModelRequest};
use crate::error::AgentError;
use crate::Result;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = strip_code_fences(raw);

    // tolerate prose around a single JSON object
    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned,
    };

    serde_json::from_str(candidate).map_err(|e| {
        AgentError::MalformedModelOutput(format!("{} | raw={}", e, truncate(raw, 200)))
    })
}

/// One model call under a timeout.
pub async fn generate_text(
    model: &dyn LanguageModel,
    request: &ModelRequest,
    timeout: Duration,
) -> Result<String> {
    tokio::time::timeout(timeout, model.generate(request))
        .await
        .map_err(|_| AgentError::Timeout(format!("{} model call", model.name())))?
}

/// Call the model until its output parses as `T`.
///
/// Malformed output and timeouts are retried up to `max_attempts` calls in
/// total; any other model error is returned at once. Returns the value and
/// the number of calls made.
pub async fn generate_structured<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    request: &ModelRequest,
    timeout: Duration,
    max_attempts: u32,
) -> Result<(T, u32)> {
    let mut last_error = AgentError::MalformedModelOutput("no attempt made".to_string());

    for attempt in 1..=max_attempts.max(1) {
        let outcome = match generate_text(model, request, timeout).await {
            Ok(raw) => parse_structured::<T>(&raw),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if e.is_retryable() || matches!(e, AgentError::MalformedModelOutput(_)) => {
                warn!(attempt = attempt, error = %e, "Model output rejected, retrying");
                last_error = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelTask, ScriptedModel, ScriptedReply};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        message: String,
    }

    fn request() -> ModelRequest {
        ModelRequest {
            task: ModelTask::AnswerComposition,
            system_instruction: String::new(),
            prompt: String::new(),
            json_output: true,
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_structured_with_surrounding_prose() {
        let parsed: Answer = parse_structured("Sure! {\"message\": \"hi\"} Hope that helps").unwrap();
        assert_eq!(parsed.message, "hi");
    }

    #[test]
    fn test_parse_structured_rejects_garbage() {
        let err = parse_structured::<Answer>("not json at all").unwrap_err();
        assert!(matches!(err, AgentError::MalformedModelOutput(_)));
    }

    #[tokio::test]
    async fn test_retries_until_valid() {
        let model = ScriptedModel::texts(["oops", "{\"message\": \"ok\"}"]);
        let (answer, attempts): (Answer, u32) =
            generate_structured(&model, &request(), Duration::from_secs(1), 3)
                .await
                .unwrap();
        assert_eq!(answer.message, "ok");
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let model = ScriptedModel::texts(["oops", "still oops", "{\"message\": \"late\"}"]);
        let result = generate_structured::<Answer>(&model, &request(), Duration::from_secs(1), 2).await;
        assert!(matches!(result, Err(AgentError::MalformedModelOutput(_))));
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_timeout() {
        let model = ScriptedModel::new(vec![ScriptedReply::Hang]);
        let result = generate_text(&model, &request(), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AgentError::Timeout(_))));
    }
}
