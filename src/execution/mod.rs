//! Execution of CLEAR routing decisions
//!
//! Plans tool calls from the router output, runs them under timeouts,
//! derives the figures, composes and grounds the customer message, and
//! returns it together with a sealed audit record.
//! The model only ever phrases facts computed here.

pub mod calculations;
pub mod compose;
pub mod plan;

pub use compose::{AnswerFacts, AnswerShape, FAILURE_MESSAGE};
pub use plan::{check_traceability, plan_invocations};

use crate::audit::seal;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::llm::{generate_structured, LanguageModel};
use crate::models::{
    AuditOutcome, AuditRecord, Calculation, CategoryRef, ComparisonTarget, CompositionSource,
    CompositionTrace, DualResponse, GroundingReport, QueryResponse, QueryResult, RejectedDraft,
    RouterOutput, RoutingSnapshot, StageLatency, TimeRange, ToolCallRecord, ToolCallStatus,
    ToolInvocation, UseCase,
};
use crate::tools::ToolRegistry;
use crate::verification::extract::scan_message;
use crate::verification::{GroundingContext, GroundingVerifier};
use crate::Result;
use chrono::Utc;
use compose::{
    composition_request, no_data_message, period_phrase, subject_phrase, template_message,
    ComposedAnswer, RowFact, SideFacts, MAX_LISTED_ROWS,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Number of model drafts per turn: the first one plus one regeneration.
const MAX_DRAFTS: usize = 2;

/// Result of answering, before it is written into the audit record.
struct Answer {
    outcome: AuditOutcome,
    message: String,
    calculations: Vec<Calculation>,
    grounding: Option<GroundingReport>,
    composition: Option<CompositionTrace>,
}

impl Answer {
    fn failed(
        calculations: Vec<Calculation>,
        grounding: Option<GroundingReport>,
        composition: Option<CompositionTrace>,
    ) -> Self {
        Self {
            outcome: AuditOutcome::Failed,
            message: FAILURE_MESSAGE.to_string(),
            calculations,
            grounding,
            composition,
        }
    }
}

enum Composed {
    Grounded {
        message: String,
        report: GroundingReport,
        trace: CompositionTrace,
    },
    /// Neither a draft nor the template passed grounding.
    Ungrounded {
        report: GroundingReport,
        trace: CompositionTrace,
    },
    /// The model kept returning unparsable output.
    Malformed { trace: CompositionTrace },
}

/// Executes CLEAR router outputs deterministically
pub struct Executor {
    registry: ToolRegistry,
    verifier: GroundingVerifier,
    model: Option<Arc<dyn LanguageModel>>,
    tool_timeout: Duration,
    tool_retries: u32,
    model_timeout: Duration,
    max_model_attempts: u32,
}

impl Executor {
    pub fn new(
        config: &AgentConfig,
        registry: ToolRegistry,
        verifier: GroundingVerifier,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        Self {
            registry,
            verifier,
            model,
            tool_timeout: config.tool_timeout,
            tool_retries: config.tool_retries,
            model_timeout: config.model_timeout,
            max_model_attempts: config.max_model_attempts,
        }
    }

    pub async fn execute(&self, output: &RouterOutput) -> Result<DualResponse> {
        if !output.is_clear() {
            return Err(AgentError::NotExecutable(format!(
                "classification is {}",
                output.classification
            )));
        }
        output.check_invariant()?;

        let started = Instant::now();
        let invocations = plan_invocations(output);
        check_traceability(output, &invocations)?;

        debug!(
            session_id = %output.query.session_id,
            invocation_count = invocations.len(),
            "Executing tool plan"
        );

        let mut tool_calls = Vec::with_capacity(invocations.len());
        let mut results = Vec::with_capacity(invocations.len());
        for invocation in &invocations {
            let (record, result) = self.run_tool(invocation).await;
            tool_calls.push(record);
            results.push(result);
        }

        let failed = tool_calls
            .iter()
            .any(|c| matches!(c.status, ToolCallStatus::Failed | ToolCallStatus::TimedOut));

        let answer = if failed {
            warn!(
                session_id = %output.query.session_id,
                "Tool call failed, returning generic failure message"
            );
            Answer::failed(Vec::new(), None, None)
        } else {
            self.answer(output, &results).await?
        };

        let mut record = AuditRecord {
            audit_id: Uuid::new_v4(),
            session_id: output.query.session_id.clone(),
            customer_id: output.query.customer_id.clone(),
            turn_index: output.query.turn_index,
            created_at: Utc::now(),
            query: output.query.text.clone(),
            routing: RoutingSnapshot::from(output),
            resolved_filters: output.resolved.clone(),
            tool_calls,
            calculations: answer.calculations,
            grounding: answer.grounding,
            composition: answer.composition,
            outcome: answer.outcome,
            final_answer: answer.message,
            execution_time_ms: started.elapsed().as_millis() as u64,
            preferences_used: Vec::new(),
            latency: StageLatency::default(),
            integrity_hash: String::new(),
        };
        seal(&mut record);

        info!(
            audit_id = %record.audit_id,
            outcome = ?record.outcome,
            execution_time_ms = record.execution_time_ms,
            "Turn executed"
        );

        Ok(DualResponse {
            customer_message: record.final_answer.clone(),
            audit_record: Some(record),
        })
    }

    // ================= Tools =================

    /// Run one invocation, retrying timeouts up to `tool_retries` times.
    async fn run_tool(&self, invocation: &ToolInvocation) -> (ToolCallRecord, Option<QueryResult>) {
        let started = Instant::now();
        let mut attempts = 0;

        let (status, raw_result, error, result) = loop {
            attempts += 1;
            match self.call_once(invocation).await {
                Ok(response) => {
                    let raw = serde_json::to_value(&response).unwrap_or_default();
                    break match response {
                        QueryResponse::Matches { result } => {
                            (ToolCallStatus::Success, raw, None, Some(result))
                        }
                        QueryResponse::NoMatches => (ToolCallStatus::Empty, raw, None, None),
                    };
                }
                Err(e) if e.is_retryable() && attempts <= self.tool_retries => {
                    warn!(
                        order = invocation.order,
                        attempt = attempts,
                        error = %e,
                        "Tool call timed out, retrying"
                    );
                }
                Err(e) => {
                    let status = if e.is_retryable() {
                        ToolCallStatus::TimedOut
                    } else {
                        ToolCallStatus::Failed
                    };
                    warn!(order = invocation.order, error = %e, "Tool call failed");
                    break (
                        status,
                        serde_json::json!({ "error": e.to_string() }),
                        Some(e.to_string()),
                        None,
                    );
                }
            }
        };

        let record = ToolCallRecord {
            invocation: invocation.clone(),
            status,
            raw_result,
            error,
            attempts,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };
        (record, result)
    }

    async fn call_once(&self, invocation: &ToolInvocation) -> Result<QueryResponse> {
        let tool = self
            .registry
            .get(&invocation.tool_name)
            .ok_or_else(|| AgentError::ToolNotFound(invocation.tool_name.clone()))?;
        let input = invocation.to_input()?;

        let output = tokio::time::timeout(self.tool_timeout, tool.execute(&input))
            .await
            .map_err(|_| {
                AgentError::Timeout(format!("{} invocation {}", invocation.tool_name, invocation.order))
            })??;

        if !output.success {
            return Err(AgentError::ToolInvocationFailure {
                tool: invocation.tool_name.clone(),
                detail: output.error.unwrap_or_else(|| "tool reported failure".to_string()),
            });
        }

        Ok(serde_json::from_value(output.data)?)
    }

    // ================= Answer =================

    async fn answer(&self, output: &RouterOutput, results: &[Option<QueryResult>]) -> Result<Answer> {
        let primary = results.first().and_then(Option::as_ref);
        let comparison = results.get(1).map(Option::as_ref);
        let no_data = results.iter().all(Option::is_none);

        let (facts, calculations) = build_facts(output, primary, comparison);
        let ctx = grounding_context(output, &facts, results, &calculations);

        if no_data {
            let message = no_data_message(&facts);
            let report = self.verifier.verify(&message, &ctx);
            if !report.grounded {
                error!(violations = ?report.violations, "No-data message failed grounding");
                return Ok(Answer::failed(calculations, Some(report), None));
            }
            return Ok(Answer {
                outcome: AuditOutcome::NoData,
                message,
                calculations,
                grounding: Some(report),
                composition: Some(template_trace()),
            });
        }

        Ok(match self.compose(&facts, &ctx).await? {
            Composed::Grounded {
                message,
                report,
                trace,
            } => Answer {
                outcome: AuditOutcome::Answered,
                message,
                calculations,
                grounding: Some(report),
                composition: Some(trace),
            },
            Composed::Ungrounded { report, trace } => {
                error!(violations = ?report.violations, "Template failed grounding, blocking answer");
                Answer::failed(calculations, Some(report), Some(trace))
            }
            Composed::Malformed { trace } => {
                warn!("Model output stayed malformed, returning generic failure message");
                Answer::failed(calculations, None, Some(trace))
            }
        })
    }

    /// Draft with the model when configured, regenerate once on a grounding
    /// violation, then fall back to the template.
    async fn compose(&self, facts: &AnswerFacts, ctx: &GroundingContext) -> Result<Composed> {
        let mut trace = template_trace();

        if let Some(model) = &self.model {
            let mut feedback: Option<Vec<String>> = None;

            for _ in 0..MAX_DRAFTS {
                let request = composition_request(facts, feedback.as_deref())?;
                let drafted = generate_structured::<ComposedAnswer>(
                    model.as_ref(),
                    &request,
                    self.model_timeout,
                    self.max_model_attempts,
                )
                .await;

                match drafted {
                    Ok((answer, attempts)) => {
                        trace.model_attempts += attempts;
                        let report = self.verifier.verify(&answer.message, ctx);
                        if report.grounded {
                            trace.source = CompositionSource::LanguageModel;
                            return Ok(Composed::Grounded {
                                message: answer.message,
                                report,
                                trace,
                            });
                        }
                        warn!(violations = ?report.violations, "Draft failed grounding");
                        trace.rejected_drafts.push(RejectedDraft {
                            draft: answer.message,
                            violations: report.violations.clone(),
                        });
                        feedback = Some(report.violations);
                    }
                    Err(AgentError::MalformedModelOutput(detail)) => {
                        trace.model_attempts += self.max_model_attempts;
                        trace.model_error = Some(detail);
                        return Ok(Composed::Malformed { trace });
                    }
                    Err(e) => {
                        warn!(error = %e, "Answer composition failed, using template");
                        trace.model_error = Some(e.to_string());
                        break;
                    }
                }
            }
        }

        let message = template_message(facts);
        let report = self.verifier.verify(&message, ctx);
        if report.grounded {
            Ok(Composed::Grounded {
                message,
                report,
                trace,
            })
        } else {
            Ok(Composed::Ungrounded { report, trace })
        }
    }
}

fn template_trace() -> CompositionTrace {
    CompositionTrace {
        source: CompositionSource::Template,
        model_attempts: 0,
        rejected_drafts: Vec::new(),
        model_error: None,
    }
}

fn names(categories: &[CategoryRef]) -> Vec<String> {
    categories.iter().map(|c| c.name.clone()).collect()
}

fn side(range: Option<&TimeRange>, categories: &[CategoryRef], value: f64, count: usize) -> SideFacts {
    SideFacts {
        subject: subject_phrase(&names(categories)),
        period: range.map(period_phrase).unwrap_or_default(),
        value,
        transaction_count: count,
    }
}

/// Facts for the message plus the calculations behind them.
fn build_facts(
    output: &RouterOutput,
    primary: Option<&QueryResult>,
    comparison: Option<Option<&QueryResult>>,
) -> (AnswerFacts, Vec<Calculation>) {
    let resolved = &output.resolved;
    let measure = output.intent.measure;
    let primary_range = resolved.time_range.as_ref().map(|t| &t.range);

    let shape = if !plan::is_listing(output) {
        AnswerShape::Total
    } else if output.intent.primary == UseCase::DirectRetrieval {
        AnswerShape::Latest
    } else {
        AnswerShape::Listing
    };

    let mut calculations = Vec::new();
    let count = |r: Option<&QueryResult>| r.map(|r| r.total_count).unwrap_or(0);

    let primary_value = if shape == AnswerShape::Total {
        let total = calculations::measure_total("primary_total", measure, primary);
        let value = total.result.unwrap_or(0.0);
        calculations.push(total);
        value
    } else {
        0.0
    };

    let mut comparison_facts = None;
    let mut difference = None;
    let mut percent_change = None;

    if let Some(other) = comparison {
        let total = calculations::measure_total("comparison_total", measure, other);
        let other_value = total.result.unwrap_or(0.0);
        calculations.push(total);

        let diff = calculations::difference(primary_value, other_value);
        let pct = calculations::percent_change(primary_value, other_value);
        difference = diff.result;
        percent_change = pct.result;
        calculations.push(diff);
        calculations.push(pct);

        let (range, categories) = match &resolved.comparison_target {
            Some(ComparisonTarget::Period { period }) => (Some(&period.range), resolved.category_ids.as_slice()),
            Some(ComparisonTarget::Categories { categories }) => (primary_range, categories.as_slice()),
            None => (primary_range, resolved.category_ids.as_slice()),
        };
        comparison_facts = Some(side(range, categories, other_value, count(other)));
    }

    let shown = match shape {
        AnswerShape::Total => 0,
        AnswerShape::Latest => 1,
        AnswerShape::Listing => MAX_LISTED_ROWS,
    };
    let rows: Vec<RowFact> = primary
        .map(|r| r.transactions.iter().take(shown).map(RowFact::from).collect())
        .unwrap_or_default();

    let account = resolved
        .account_scope
        .filter(|scope| scope.account_type().is_some())
        .map(|scope| format!(" using your {}", scope))
        .unwrap_or_default();
    let threshold = resolved
        .amount_threshold
        .map(|amount| format!(" over ${:.2}", amount))
        .unwrap_or_default();

    let facts = AnswerFacts {
        shape,
        measure,
        account,
        threshold,
        primary: side(primary_range, &resolved.category_ids, primary_value, count(primary)),
        comparison: comparison_facts,
        difference,
        percent_change,
        rows,
    };
    (facts, calculations)
}

/// Everything a message for this turn may state.
fn grounding_context(
    output: &RouterOutput,
    facts: &AnswerFacts,
    results: &[Option<QueryResult>],
    calculations: &[Calculation],
) -> GroundingContext {
    let resolved = &output.resolved;
    let mut ctx = GroundingContext::new();

    if let Some(time_range) = &resolved.time_range {
        ctx.allow_range(time_range.range);
    }
    for category in &resolved.category_ids {
        ctx.allow_category_name(&category.name);
    }
    match &resolved.comparison_target {
        Some(ComparisonTarget::Period { period }) => ctx.allow_range(period.range),
        Some(ComparisonTarget::Categories { categories }) => {
            for category in categories {
                ctx.allow_category_name(&category.name);
            }
        }
        None => {}
    }
    if let Some(amount) = resolved.amount_threshold {
        ctx.allow_number(amount);
    }

    for result in results.iter().flatten() {
        ctx.allow_numbers([
            result.total_count as f64,
            result.total_debit_amount,
            result.total_credit_amount,
            result.net_amount,
        ]);
        ctx.allow_numbers(
            [result.avg_amount, result.max_amount, result.min_amount]
                .into_iter()
                .flatten(),
        );
        for row in &result.transactions {
            ctx.allow_number(row.amount);
            ctx.allow_date(row.date);
            if let Some(merchant) = &row.merchant {
                ctx.allow_numbers(scan_message(merchant).numbers.into_iter().map(|n| n.value));
            }
            ctx.allow_category_name(&row.category_group_name);
            if let Some(sub) = &row.sub_category_name {
                ctx.allow_category_name(sub);
            }
        }
    }

    for calculation in calculations {
        ctx.allow_numbers(calculation.result);
        ctx.allow_numbers(calculation.inputs.iter().map(|i| i.value));
    }
    ctx.allow_number(facts.rows.len() as f64);
    ctx.allow_number(0.0);

    if let Some(difference) = facts.difference {
        ctx.set_difference(difference);
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedModel, ScriptedReply};
    use crate::models::{
        Classification, Measure, Query, QueryIntent, ResolvedSlots, ResolvedTimeRange, ToolInput,
        ToolOutput, TransactionFilters,
    };
    use crate::test_support::{category, day, fixture_store, knowledge_base};
    use crate::tools::{create_registry, Tool, TransactionStore};
    use crate::verification::create_default_grounding_verifier;

    fn month(m: u32) -> ResolvedTimeRange {
        let end = if m == 11 { day(2025, 11, 30) } else { day(2025, 10, 31) };
        ResolvedTimeRange {
            range: TimeRange::new(day(2025, m, 1), end).unwrap(),
            phrase: "month".to_string(),
            interpretation: "calendar month".to_string(),
        }
    }

    fn aggregation(comparison: bool) -> QueryIntent {
        QueryIntent {
            primary: UseCase::Aggregation,
            measure: Measure::Spending,
            comparison,
            limit: None,
        }
    }

    fn clear(text: &str, intent: QueryIntent, resolved: ResolvedSlots) -> RouterOutput {
        RouterOutput::clear(
            Query::new("s1", "CUST_001", 1, text),
            vec![intent.primary],
            intent,
            resolved,
            "resolved",
        )
    }

    fn dining_november() -> RouterOutput {
        clear(
            "How much did I spend on dining last month?",
            aggregation(false),
            ResolvedSlots {
                time_range: Some(month(11)),
                category_ids: vec![category("CG800")],
                ..ResolvedSlots::default()
            },
        )
    }

    fn executor(model: Option<Arc<dyn LanguageModel>>) -> Executor {
        executor_with_registry(create_registry(fixture_store()), model)
    }

    fn executor_with_registry(registry: ToolRegistry, model: Option<Arc<dyn LanguageModel>>) -> Executor {
        let config = AgentConfig {
            tool_timeout: Duration::from_millis(200),
            model_timeout: Duration::from_millis(200),
            ..AgentConfig::default()
        };
        Executor::new(
            &config,
            registry,
            create_default_grounding_verifier(&knowledge_base()),
            model,
        )
    }

    /// Store that never answers in time.
    struct StalledStore;

    #[async_trait::async_trait]
    impl TransactionStore for StalledStore {
        async fn query(&self, _filters: &TransactionFilters) -> Result<QueryResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(QueryResponse::NoMatches)
        }
    }

    /// Tool that reports failure without erroring.
    struct BrokenTool;

    #[async_trait::async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &'static str {
            crate::tools::QUERY_TRANSACTIONS
        }

        fn description(&self) -> &'static str {
            "always fails"
        }

        async fn execute(&self, _input: &ToolInput) -> Result<ToolOutput> {
            Ok(ToolOutput {
                success: false,
                data: serde_json::Value::Null,
                error: Some("database unavailable".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_dining_total_from_template() {
        let response = executor(None).execute(&dining_november()).await.unwrap();

        assert_eq!(
            response.customer_message,
            "You spent $389.40 on Dining in November 2025 across 3 transactions."
        );
        let record = response.audit_record.unwrap();
        assert_eq!(record.outcome, AuditOutcome::Answered);
        assert_eq!(record.tool_calls.len(), 1);
        assert_eq!(record.tool_calls[0].status, ToolCallStatus::Success);
        assert_eq!(record.calculations[0].result, Some(389.40));
        assert!(record.grounding.as_ref().unwrap().grounded);
        assert_eq!(record.integrity_hash, crate::audit::compute_record_hash(&record));
    }

    #[tokio::test]
    async fn test_groceries_comparison_records_difference() {
        let output = clear(
            "How much on groceries in Nov vs Oct?",
            aggregation(true),
            ResolvedSlots {
                time_range: Some(month(11)),
                category_ids: vec![category("CG10000")],
                comparison_target: Some(ComparisonTarget::Period { period: month(10) }),
                ..ResolvedSlots::default()
            },
        );

        let response = executor(None).execute(&output).await.unwrap();
        let record = response.audit_record.unwrap();

        assert_eq!(record.tool_calls.len(), 2);
        let calc = |name: &str| {
            record
                .calculations
                .iter()
                .find(|c| c.name == name)
                .and_then(|c| c.result)
        };
        assert_eq!(calc("primary_total"), Some(291.65));
        assert_eq!(calc("comparison_total"), Some(270.15));
        assert_eq!(calc("difference"), Some(21.50));
        assert_eq!(calc("percent_change"), Some(7.96));
        assert!(response.customer_message.contains("an increase of $21.50 (7.96%)"));
    }

    #[tokio::test]
    async fn test_vague_output_is_not_executable() {
        let mut output = dining_november();
        output.classification = Classification::Vague;
        let result = executor(None).execute(&output).await;
        assert!(matches!(result, Err(AgentError::NotExecutable(_))));
    }

    #[tokio::test]
    async fn test_empty_result_is_no_data() {
        let output = clear(
            "How much did I spend on travel in November?",
            aggregation(false),
            ResolvedSlots {
                time_range: Some(month(11)),
                category_ids: vec![category("CG500")],
                ..ResolvedSlots::default()
            },
        );

        let response = executor(None).execute(&output).await.unwrap();
        let record = response.audit_record.unwrap();
        assert_eq!(record.outcome, AuditOutcome::NoData);
        assert_eq!(record.tool_calls[0].status, ToolCallStatus::Empty);
        assert_eq!(
            response.customer_message,
            "I couldn't find any transactions on Travel in November 2025."
        );
    }

    #[tokio::test]
    async fn test_tool_timeout_is_retried_then_reported() {
        let executor = executor_with_registry(create_registry(Arc::new(StalledStore)), None);
        let response = executor.execute(&dining_november()).await.unwrap();

        assert_eq!(response.customer_message, FAILURE_MESSAGE);
        let record = response.audit_record.unwrap();
        assert_eq!(record.outcome, AuditOutcome::Failed);
        assert_eq!(record.tool_calls[0].status, ToolCallStatus::TimedOut);
        assert_eq!(record.tool_calls[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_tool_failure_keeps_detail_in_audit() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(BrokenTool));
        let response = executor_with_registry(registry, None)
            .execute(&dining_november())
            .await
            .unwrap();

        assert_eq!(response.customer_message, FAILURE_MESSAGE);
        let record = response.audit_record.unwrap();
        assert_eq!(record.tool_calls[0].status, ToolCallStatus::Failed);
        assert_eq!(record.tool_calls[0].attempts, 1);
        assert!(record.tool_calls[0].error.as_deref().unwrap().contains("database unavailable"));
    }

    #[tokio::test]
    async fn test_model_draft_used_when_grounded() {
        let model = Arc::new(ScriptedModel::texts([
            r#"{"message": "Dining cost you $389.40 in November 2025."}"#,
        ]));
        let response = executor(Some(model))
            .execute(&dining_november())
            .await
            .unwrap();

        assert_eq!(response.customer_message, "Dining cost you $389.40 in November 2025.");
        let composition = response.audit_record.unwrap().composition.unwrap();
        assert_eq!(composition.source, CompositionSource::LanguageModel);
        assert!(composition.rejected_drafts.is_empty());
    }

    #[tokio::test]
    async fn test_ungrounded_draft_regenerated_once() {
        let model = Arc::new(ScriptedModel::texts([
            r#"{"message": "You spent $412.00 on Dining in November 2025."}"#,
            r#"{"message": "You spent $389.40 on Dining in November 2025."}"#,
        ]));
        let response = executor(Some(model.clone()))
            .execute(&dining_november())
            .await
            .unwrap();

        assert_eq!(response.customer_message, "You spent $389.40 on Dining in November 2025.");
        let composition = response.audit_record.unwrap().composition.unwrap();
        assert_eq!(composition.rejected_drafts.len(), 1);
        assert!(model.requests()[1].prompt.contains("previous draft was rejected"));
    }

    #[tokio::test]
    async fn test_twice_ungrounded_falls_back_to_template() {
        let model = Arc::new(ScriptedModel::texts([
            r#"{"message": "You spent $412.00 on Travel."}"#,
            r#"{"message": "Spending rose 12% in October 2025."}"#,
        ]));
        let response = executor(Some(model))
            .execute(&dining_november())
            .await
            .unwrap();

        assert_eq!(
            response.customer_message,
            "You spent $389.40 on Dining in November 2025 across 3 transactions."
        );
        let record = response.audit_record.unwrap();
        assert_eq!(record.outcome, AuditOutcome::Answered);
        let composition = record.composition.unwrap();
        assert_eq!(composition.source, CompositionSource::Template);
        assert_eq!(composition.rejected_drafts.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_output_is_a_failure() {
        let model = Arc::new(ScriptedModel::texts(["not json", "still not json"]));
        let response = executor(Some(model))
            .execute(&dining_november())
            .await
            .unwrap();

        assert_eq!(response.customer_message, FAILURE_MESSAGE);
        let record = response.audit_record.unwrap();
        assert_eq!(record.outcome, AuditOutcome::Failed);
        assert!(record.composition.unwrap().model_error.is_some());
    }

    #[tokio::test]
    async fn test_model_error_falls_back_to_template() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedReply::Fail("quota".to_string())]));
        let response = executor(Some(model))
            .execute(&dining_november())
            .await
            .unwrap();

        assert!(response.customer_message.starts_with("You spent $389.40"));
        let composition = response.audit_record.unwrap().composition.unwrap();
        assert_eq!(composition.source, CompositionSource::Template);
        assert_eq!(composition.model_error.as_deref(), Some("LLM error: quota"));
    }

    #[tokio::test]
    async fn test_last_week_listing() {
        let last_week = ResolvedTimeRange {
            range: TimeRange::new(day(2025, 11, 24), day(2025, 11, 30)).unwrap(),
            phrase: "last week".to_string(),
            interpretation: "previous Monday-Sunday week".to_string(),
        };
        let intent = QueryIntent {
            primary: UseCase::Temporal,
            measure: Measure::Spending,
            comparison: false,
            limit: None,
        };
        let output = clear(
            "last week",
            intent,
            ResolvedSlots {
                time_range: Some(last_week),
                ..ResolvedSlots::default()
            },
        );

        let response = executor(None).execute(&output).await.unwrap();
        let message = response.customer_message;
        assert!(message.starts_with("You have 5 transactions between 2025-11-24 and 2025-11-30."), "{}", message);
        assert!(message.contains("- 2025-11-30 Amazon $25.00 credit (Refunds)"));
        assert!(response.audit_record.unwrap().grounding.unwrap().grounded);
    }

    #[tokio::test]
    async fn test_most_recent_transaction() {
        let intent = QueryIntent {
            primary: UseCase::DirectRetrieval,
            measure: Measure::Spending,
            comparison: false,
            limit: Some(1),
        };
        let output = clear("What was my most recent purchase?", intent, ResolvedSlots::default());

        let response = executor(None).execute(&output).await.unwrap();
        assert_eq!(
            response.customer_message,
            "Your most recent transaction was $4.50 at Bean There Cafe on 2025-12-01 (Cafes & Coffee Shops)."
        );
    }
}
