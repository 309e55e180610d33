//! Query router
//!
//! Decides, for one customer turn and the session's accumulated state,
//! whether the question can be answered (CLEAR) or needs one more detail
//! (VAGUE). Runs as a small state machine:
//! `Received -> Resolving -> Clear | Vague`.
//!
//! The router is the only writer of [`ConversationState`]. Given the same
//! query, state and reference date it always reaches the same decision.

pub mod clarify;
pub mod extract;
pub mod intent;

pub use clarify::{fallback_message, select_candidate, template_question, QuestionContext};
pub use extract::{extract, Extraction};
pub use intent::{detect_intent, IntentSignals};

use crate::category::{CategoryOutcome, CategoryResolver};
use crate::config::AgentConfig;
use crate::llm::LanguageModel;
use crate::memory::{ConversationState, PendingIntent, SlotValue, StateSummarizer};
use crate::models::{
    AccountScope, CategoryMatch, CategoryRef, ClarificationStep, ComparisonTarget, Query,
    QueryIntent, ResolvedTimeRange, RouterOutput, SlotName, UseCase,
};
use crate::temporal::{Resolution, TemporalResolver};
use crate::text::contains_any;
use crate::Result;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Router stages. Each transition consumes the data of the previous one.
enum Stage {
    Received(Query),
    Resolving(Box<Resolving>),
    Done(RouterOutput),
}

/// Analysed turn, with slots already merged into the state.
struct Resolving {
    query: Query,
    intent: QueryIntent,
    use_cases: Vec<UseCase>,
    required: BTreeSet<SlotName>,
    category_matches: Vec<CategoryMatch>,
    /// Turn that opened the clarification chain this turn answers.
    chain_start: Option<u32>,
    chain_query: Option<String>,
    vague_time: Option<String>,
    unresolved_category: Option<String>,
    /// Slots treated as unresolved this turn although a value is stored.
    reask: BTreeSet<SlotName>,
}

pub struct QueryRouter {
    temporal: TemporalResolver,
    categories: CategoryResolver,
    model: Option<Arc<dyn LanguageModel>>,
    reference_date: NaiveDate,
    max_clarification_turns: u32,
    model_timeout: Duration,
}

impl QueryRouter {
    pub fn new(
        config: &AgentConfig,
        categories: CategoryResolver,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        Self {
            temporal: TemporalResolver::new(config.period_policy),
            categories,
            model,
            reference_date: config.reference_date,
            max_clarification_turns: config.max_clarification_turns,
            model_timeout: config.model_timeout,
        }
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Route one turn, updating `state` in place.
    pub async fn route(&self, state: &mut ConversationState, query: Query) -> Result<RouterOutput> {
        let mut stage = Stage::Received(query);

        loop {
            stage = match stage {
                Stage::Received(query) => {
                    Stage::Resolving(Box::new(self.analyse(state, query).await))
                }
                Stage::Resolving(resolving) => Stage::Done(self.decide(state, *resolving).await?),
                Stage::Done(output) => {
                    state.summary = StateSummarizer::summarize(state);
                    info!(
                        session_id = %output.query.session_id,
                        turn = output.query.turn_index,
                        classification = %output.classification,
                        use_cases = ?output.use_cases,
                        missing = ?output.missing_slots,
                        "Query routed"
                    );
                    return Ok(output);
                }
            };
        }
    }

    // ================= Received =================

    async fn analyse(&self, state: &mut ConversationState, query: Query) -> Resolving {
        state.turn_count = query.turn_index;
        state.touch(Utc::now());

        let extraction = extract(&query.text, &self.temporal, self.reference_date);

        let mut phrases = extraction.category_phrases.clone();
        let selected = if state.category_candidates.is_empty() {
            None
        } else {
            select_candidate(extraction.ordinal, &phrases, &state.category_candidates)
        };
        if let Some((_, Some(named))) = &selected {
            phrases.retain(|p| p != named);
        }
        let selected: Option<CategoryRef> = selected.map(|(category, _)| category);
        // the offered candidates stay as evidence for the customer's choice
        let offered: Vec<CategoryMatch> = if selected.is_some() {
            state.category_candidates.clone()
        } else {
            Vec::new()
        };

        let outcome = self.resolve_categories(&phrases).await;
        let has_category = selected.is_some() || !phrases.is_empty();
        let signals = detect_intent(&extraction.tokens, has_category);

        // a turn without an intent of its own answers the open question
        let pending: Option<PendingIntent> = if signals.explicit {
            None
        } else {
            state.pending.clone()
        };
        let asked = pending.as_ref().map(|p| p.asked_slot);
        let follow_up = pending.is_some();
        let mut reask: BTreeSet<SlotName> = pending.as_ref().map(|p| p.reask.clone()).unwrap_or_default();
        let mut supplied: BTreeSet<SlotName> = BTreeSet::new();
        let mut doubted: BTreeSet<SlotName> = BTreeSet::new();

        let (intent, mut use_cases, mut required, chain_start, chain_query) = match pending {
            Some(p) => {
                state.record_answer(&query.text, query.turn_index);
                (p.intent, p.use_cases, p.required, Some(p.turn_id), Some(p.original_query))
            }
            None => {
                state.pending = None;
                let intent = match (signals.explicit, state.last_intent) {
                    (false, Some(last)) => last,
                    _ => signals.intent,
                };
                (intent, vec![intent.primary], required_slots(&intent), None, None)
            }
        };

        let turn = query.turn_index;
        let text = query.text.as_str();

        // ================= Time =================
        let exact: Vec<ResolvedTimeRange> = extraction
            .temporal
            .iter()
            .filter_map(|m| m.resolution.exact())
            .cloned()
            .collect();
        let mut vague_time = extraction.temporal.iter().find_map(|m| match &m.resolution {
            Resolution::Ambiguous { phrase, .. } => Some(phrase.clone()),
            Resolution::Exact(_) => None,
        });

        let answers_comparison = asked == Some(SlotName::ComparisonTarget);
        if answers_comparison && exact.len() == 1 {
            supply(
                state,
                &mut supplied,
                SlotValue::ComparisonTarget(ComparisonTarget::Period {
                    period: exact[0].clone(),
                }),
                turn,
                text,
            );
        } else if intent.comparison && exact.len() >= 2 {
            supply(state, &mut supplied, SlotValue::TimeRange(exact[0].clone()), turn, text);
            supply(
                state,
                &mut supplied,
                SlotValue::ComparisonTarget(ComparisonTarget::Period {
                    period: exact[1].clone(),
                }),
                turn,
                text,
            );
        } else if let Some(first) = exact.first() {
            supply(state, &mut supplied, SlotValue::TimeRange(first.clone()), turn, text);
        }

        if exact.is_empty() && vague_time.is_some() {
            doubted.insert(SlotName::TimeRange);
            required.insert(SlotName::TimeRange);
            add_use_case(&mut use_cases, UseCase::Ambiguity);
        } else {
            vague_time = None;
        }
        if !exact.is_empty() || vague_time.is_some() {
            add_use_case(&mut use_cases, UseCase::Temporal);
        }

        // ================= Categories =================
        let mut resolved_now: Vec<CategoryRef> = Vec::new();
        for category in selected.into_iter().chain(outcome.resolved.iter().cloned()) {
            if !resolved_now.iter().any(|c| c.id == category.id) {
                resolved_now.push(category);
            }
        }

        if answers_comparison && exact.is_empty() && !resolved_now.is_empty() {
            supply(
                state,
                &mut supplied,
                SlotValue::ComparisonTarget(ComparisonTarget::Categories {
                    categories: resolved_now.clone(),
                }),
                turn,
                text,
            );
        } else if intent.comparison && resolved_now.len() >= 2 && exact.len() < 2 {
            let mut primary = resolved_now.clone();
            let others = primary.split_off(1);
            supply(state, &mut supplied, SlotValue::Categories(primary), turn, text);
            supply(
                state,
                &mut supplied,
                SlotValue::ComparisonTarget(ComparisonTarget::Categories { categories: others }),
                turn,
                text,
            );
        } else if !resolved_now.is_empty() {
            supply(state, &mut supplied, SlotValue::Categories(resolved_now.clone()), turn, text);
        }

        let mut unresolved_category = None;
        if let Some((phrase, candidates)) = outcome.unresolved.first() {
            doubted.insert(SlotName::CategoryIds);
            required.insert(SlotName::CategoryIds);
            state.category_candidates = candidates.clone();
            unresolved_category = Some(phrase.clone());
            add_use_case(&mut use_cases, UseCase::Ambiguity);
        } else if !resolved_now.is_empty() || !follow_up {
            state.category_candidates.clear();
        } else {
            // still waiting on the earlier category question
            unresolved_category = state
                .category_candidates
                .first()
                .map(|m| m.query_phrase.clone());
        }
        if has_category {
            add_use_case(&mut use_cases, UseCase::CategoryBased);
        }

        // ================= Amount and account =================
        let mut amount = extraction.amount_threshold;
        if amount.is_none() && asked == Some(SlotName::AmountThreshold) {
            if let [only] = extraction.bare_amounts.as_slice() {
                amount = Some(*only);
            }
        }
        if let Some(amount) = amount {
            supply(state, &mut supplied, SlotValue::AmountThreshold(amount), turn, text);
        }
        if extraction.wants_large && state.slot(SlotName::AmountThreshold).is_none() {
            required.insert(SlotName::AmountThreshold);
            add_use_case(&mut use_cases, UseCase::Ambiguity);
        }

        let mut scope = extraction.account_scope;
        if scope.is_none()
            && asked == Some(SlotName::AccountScope)
            && contains_any(&extraction.tokens, &["all", "both", "every", "everything"])
        {
            scope = Some(AccountScope::All);
        }
        if let Some(scope) = scope {
            supply(state, &mut supplied, SlotValue::AccountScope(scope), turn, text);
        }
        if extraction.vague_account && state.slot(SlotName::AccountScope).is_none() {
            required.insert(SlotName::AccountScope);
            add_use_case(&mut use_cases, UseCase::Ambiguity);
        }

        reask.retain(|slot| !supplied.contains(slot));
        reask.extend(doubted);

        debug!(
            follow_up = follow_up,
            intent = ?intent,
            phrases = ?phrases,
            required = ?required,
            reask = ?reask,
            "Turn analysed"
        );

        Resolving {
            query,
            intent,
            use_cases,
            required,
            category_matches: offered.into_iter().chain(outcome.matches).collect(),
            chain_start,
            chain_query,
            vague_time,
            unresolved_category,
            reask,
        }
    }

    async fn resolve_categories(&self, phrases: &[String]) -> CategoryOutcome {
        if phrases.is_empty() {
            return CategoryOutcome::default();
        }

        match self.categories.resolve_phrases(phrases).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Category search failed, asking the customer instead");
                CategoryOutcome {
                    unresolved: phrases.iter().map(|p| (p.clone(), Vec::new())).collect(),
                    ..Default::default()
                }
            }
        }
    }

    // ================= Resolving -> Clear | Vague =================

    async fn decide(&self, state: &mut ConversationState, resolving: Resolving) -> Result<RouterOutput> {
        let Resolving {
            query,
            intent,
            use_cases,
            required,
            category_matches,
            chain_start,
            chain_query,
            vague_time,
            unresolved_category,
            reask,
        } = resolving;

        let mut resolved = state.resolved_slots();
        resolved.category_matches = category_matches;
        for slot in &reask {
            resolved.clear(*slot);
        }
        // a stored comparison only applies to comparison questions
        if !intent.comparison {
            resolved.clear(SlotName::ComparisonTarget);
        }

        let missing: BTreeSet<SlotName> = required
            .iter()
            .copied()
            .filter(|slot| !resolved.has(*slot))
            .collect();

        let clarifications: Vec<ClarificationStep> = match chain_start {
            Some(start) => state
                .clarification_history
                .iter()
                .filter(|step| step.turn_id > start)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let Some(first_missing) = missing.first().copied() else {
            state.pending = None;
            state.category_candidates.clear();
            state.consecutive_clarifications = 0;
            state.last_intent = Some(intent);

            let reason = if required.is_empty() {
                "no filters required".to_string()
            } else {
                format!("resolved {}", join_slots(&required))
            };
            let mut output = RouterOutput::clear(query, use_cases, intent, resolved, reason);
            output.clarifications = clarifications;
            return Ok(output);
        };

        let reason = format!("missing {}", join_slots(&missing));
        state.consecutive_clarifications += 1;

        if state.consecutive_clarifications > self.max_clarification_turns {
            warn!(
                session_id = %query.session_id,
                attempts = state.consecutive_clarifications,
                "Clarification limit reached"
            );
            state.pending = None;
            state.category_candidates.clear();
            state.consecutive_clarifications = 0;

            let mut output = RouterOutput::vague(
                query,
                use_cases,
                intent,
                resolved,
                missing,
                fallback_message(first_missing),
                reason,
            )?;
            output.clarifications = clarifications;
            output.clarification_limit_reached = true;
            return Ok(output);
        }

        let primary_label = resolved.time_range.as_ref().map(|t| t.range.label());
        let ctx = QuestionContext {
            slot: first_missing,
            time_phrase: vague_time.as_deref(),
            category_phrase: unresolved_category.as_deref(),
            candidates: &state.category_candidates,
            primary_label: primary_label.as_deref(),
        };
        let question =
            clarify::compose_question(self.model.as_deref(), &ctx, &state.summary, self.model_timeout)
                .await;

        state.pending = Some(PendingIntent {
            intent,
            use_cases: use_cases.clone(),
            required: required.clone(),
            original_query: chain_query.unwrap_or_else(|| query.text.clone()),
            turn_id: chain_start.unwrap_or(query.turn_index),
            asked_slot: first_missing,
            question: question.clone(),
            reask,
        });

        let mut output =
            RouterOutput::vague(query, use_cases, intent, resolved, missing, question, reason)?;
        output.clarifications = clarifications;
        Ok(output)
    }
}

/// Slots a fresh question needs before it can run.
fn required_slots(intent: &QueryIntent) -> BTreeSet<SlotName> {
    let mut required = BTreeSet::new();
    match intent.primary {
        UseCase::DirectRetrieval | UseCase::Ambiguity => {}
        UseCase::Aggregation => {
            required.insert(SlotName::TimeRange);
            if intent.comparison {
                required.insert(SlotName::ComparisonTarget);
            }
        }
        UseCase::Temporal => {
            required.insert(SlotName::TimeRange);
        }
        UseCase::CategoryBased => {
            required.insert(SlotName::TimeRange);
            required.insert(SlotName::CategoryIds);
        }
    }
    required
}

/// Store a value the customer gave this turn.
fn supply(
    state: &mut ConversationState,
    supplied: &mut BTreeSet<SlotName>,
    value: SlotValue,
    turn: u32,
    text: &str,
) {
    supplied.insert(value.slot());
    state.set_slot(value, turn, text);
}

fn add_use_case(use_cases: &mut Vec<UseCase>, use_case: UseCase) {
    if !use_cases.contains(&use_case) {
        use_cases.push(use_case);
    }
}

fn join_slots(slots: &BTreeSet<SlotName>) -> String {
    slots.iter().map(SlotName::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{CategoryKnowledgeBase, SemanticIndex, VectorIndex};
    use crate::memory::SlotSource;
    use crate::models::Classification;
    use crate::test_support::{day, StubIndex};

    fn router_with(config: AgentConfig, index: impl SemanticIndex + 'static) -> QueryRouter {
        let resolver = CategoryResolver::new(
            Arc::new(index),
            config.category.clone(),
            Duration::from_secs(1),
        );
        QueryRouter::new(&config, resolver, None)
    }

    fn stub_router() -> QueryRouter {
        router_with(AgentConfig::default(), StubIndex::bars())
    }

    async fn turn(router: &QueryRouter, state: &mut ConversationState, n: u32, text: &str) -> RouterOutput {
        router
            .route(state, Query::new("s1", "CUST_001", n, text))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_dining_last_month_is_clear() {
        let kb = CategoryKnowledgeBase::builtin().unwrap();
        let router = router_with(AgentConfig::default(), VectorIndex::build(&kb));
        let mut state = ConversationState::new("s1", "CUST_001");

        let output = turn(&router, &mut state, 1, "How much did I spend on dining last month?").await;

        assert_eq!(output.classification, Classification::Clear);
        assert!(output.check_invariant().is_ok());
        let period = output.resolved.time_range.unwrap().range;
        assert_eq!((period.start, period.end), (day(2025, 11, 1), day(2025, 11, 30)));
        assert_eq!(output.resolved.category_ids[0].id, "CG800");
        assert!(state.pending.is_none());
        assert!(state.summary.contains("Dining"));
    }

    #[tokio::test]
    async fn test_recent_transactions_then_last_week() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        let first = turn(&router, &mut state, 1, "Recent transactions").await;
        assert_eq!(first.classification, Classification::Vague);
        assert_eq!(first.first_missing_slot(), Some(SlotName::TimeRange));
        assert!(first.clarifying_question.as_deref().unwrap().contains("recent"));
        assert!(first.use_cases.contains(&UseCase::Ambiguity));
        assert!(state.pending.is_some());

        let second = turn(&router, &mut state, 2, "last week").await;
        assert!(second.is_clear());
        let period = second.resolved.time_range.unwrap().range;
        assert_eq!((period.start, period.end), (day(2025, 11, 24), day(2025, 11, 30)));
        assert_eq!(second.intent.primary, UseCase::Temporal);
        assert_eq!(second.clarifications.len(), 1);
        assert_eq!(second.clarifications[0].user_answer, "last week");
        assert_eq!(state.consecutive_clarifications, 0);
    }

    #[tokio::test]
    async fn test_month_comparison_in_one_turn() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        let output = turn(&router, &mut state, 1, "How much on groceries in Nov vs Oct?").await;

        assert!(output.is_clear());
        assert!(output.intent.comparison);
        assert_eq!(output.resolved.time_range.unwrap().range.start, day(2025, 11, 1));
        match output.resolved.comparison_target {
            Some(ComparisonTarget::Period { period }) => {
                assert_eq!(period.range.start, day(2025, 10, 1));
                assert_eq!(period.range.end, day(2025, 10, 31));
            }
            other => panic!("expected a period comparison, got {:?}", other),
        }
        assert_eq!(output.resolved.category_ids[0].id, "CG10000");
    }

    #[tokio::test]
    async fn test_comparison_target_asked_last() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        let first = turn(&router, &mut state, 1, "Compare my dining spending in November").await;
        assert_eq!(first.missing_slots.iter().collect::<Vec<_>>(), vec![&SlotName::ComparisonTarget]);
        assert!(first.clarifying_question.as_deref().unwrap().contains("November 2025"));

        let second = turn(&router, &mut state, 2, "October").await;
        assert!(second.is_clear());
        assert!(matches!(
            second.resolved.comparison_target,
            Some(ComparisonTarget::Period { ref period }) if period.range.start == day(2025, 10, 1)
        ));
        assert_eq!(second.resolved.time_range.unwrap().range.start, day(2025, 11, 1));
    }

    #[tokio::test]
    async fn test_ambiguous_category_lists_candidates_then_selects() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        let first = turn(&router, &mut state, 1, "How much did I spend at bars last month?").await;
        assert_eq!(first.first_missing_slot(), Some(SlotName::CategoryIds));
        let question = first.clarifying_question.unwrap();
        for name in ["Bars & Pubs", "Restaurants", "Liquor Store"] {
            assert!(question.contains(name), "{}", question);
        }
        assert_eq!(state.category_candidates.len(), 3);
        // time range is kept while the category is asked about
        assert!(first.resolved.time_range.is_some());

        let second = turn(&router, &mut state, 2, "the first one").await;
        assert!(second.is_clear());
        assert_eq!(second.resolved.category_ids[0].id, "C801");
        assert!(state.category_candidates.is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_overrides_category_and_keeps_period() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        turn(&router, &mut state, 1, "How much did I spend on dining last month?").await;
        let second = turn(&router, &mut state, 2, "What about groceries?").await;

        assert!(second.is_clear());
        assert_eq!(second.resolved.category_ids[0].id, "CG10000");
        assert_eq!(second.resolved.time_range.unwrap().range.start, day(2025, 11, 1));

        let entry = state.slot(SlotName::CategoryIds).unwrap();
        assert_eq!(entry.source, SlotSource::UserOverride);
        assert_eq!(entry.previous_turn_id, Some(1));
    }

    #[tokio::test]
    async fn test_vague_follow_up_keeps_stored_period() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        assert!(turn(&router, &mut state, 1, "How much did I spend on dining last month?")
            .await
            .is_clear());

        let second = turn(&router, &mut state, 2, "How much did I spend on dining recently?").await;
        assert_eq!(second.classification, Classification::Vague);
        assert_eq!(second.first_missing_slot(), Some(SlotName::TimeRange));
        assert!(second.resolved.time_range.is_none());
        // the earlier period stays stored while it is asked about again
        let stored = state.slot(SlotName::TimeRange).unwrap();
        assert_eq!(stored.turn_id, 1);
        assert!(state.slot(SlotName::CategoryIds).is_some());

        let third = turn(&router, &mut state, 3, "last week").await;
        assert!(third.is_clear());
        assert_eq!(third.resolved.time_range.unwrap().range.start, day(2025, 11, 24));
        let entry = state.slot(SlotName::TimeRange).unwrap();
        assert_eq!(entry.source, SlotSource::UserOverride);
        assert_eq!(entry.previous_turn_id, Some(1));
    }

    #[tokio::test]
    async fn test_unanswered_reask_stays_missing() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        turn(&router, &mut state, 1, "How much did I spend on dining last month?").await;
        turn(&router, &mut state, 2, "How much did I spend on dining recently?").await;

        let third = turn(&router, &mut state, 3, "not sure").await;
        assert_eq!(third.classification, Classification::Vague);
        assert_eq!(third.first_missing_slot(), Some(SlotName::TimeRange));
        assert!(state.slot(SlotName::TimeRange).is_some());
    }

    #[tokio::test]
    async fn test_stored_comparison_not_carried_into_plain_question() {
        let router = stub_router();
        let mut state = ConversationState::new("s1", "CUST_001");

        assert!(turn(&router, &mut state, 1, "How much on groceries in Nov vs Oct?")
            .await
            .intent
            .comparison);

        let second = turn(&router, &mut state, 2, "How much did I spend on dining last month?").await;
        assert!(second.is_clear());
        assert!(!second.intent.comparison);
        assert!(second.resolved.comparison_target.is_none());
        assert!(state.slot(SlotName::ComparisonTarget).is_some());
    }

    #[tokio::test]
    async fn test_account_and_amount_questions() {
        let router = stub_router();

        let mut state = ConversationState::new("s1", "CUST_001");
        let first = turn(&router, &mut state, 1, "How much did I spend from my account last month?").await;
        assert_eq!(first.first_missing_slot(), Some(SlotName::AccountScope));
        let second = turn(&router, &mut state, 2, "checking").await;
        assert!(second.is_clear());
        assert_eq!(second.resolved.account_scope, Some(AccountScope::Checking));

        let mut state = ConversationState::new("s2", "CUST_001");
        let first = turn(&router, &mut state, 1, "Show large transactions last month").await;
        assert_eq!(first.first_missing_slot(), Some(SlotName::AmountThreshold));
        let second = turn(&router, &mut state, 2, "$200").await;
        assert!(second.is_clear());
        assert_eq!(second.resolved.amount_threshold, Some(200.0));
    }

    #[tokio::test]
    async fn test_clarification_limit_falls_back() {
        let config = AgentConfig {
            max_clarification_turns: 2,
            ..AgentConfig::default()
        };
        let router = router_with(config, StubIndex::bars());
        let mut state = ConversationState::new("s1", "CUST_001");

        assert!(!turn(&router, &mut state, 1, "Recent transactions").await.is_clear());
        let second = turn(&router, &mut state, 2, "not sure").await;
        assert!(!second.clarification_limit_reached);

        let third = turn(&router, &mut state, 3, "not sure").await;
        assert_eq!(third.classification, Classification::Vague);
        assert!(third.clarification_limit_reached);
        assert!(third.clarifying_question.unwrap().contains("time period"));
        assert!(state.pending.is_none());
        assert_eq!(state.consecutive_clarifications, 0);
    }

    #[tokio::test]
    async fn test_category_search_failure_asks_instead() {
        let router = router_with(AgentConfig::default(), StubIndex::failing());
        let mut state = ConversationState::new("s1", "CUST_001");

        let output = turn(&router, &mut state, 1, "How much did I spend on dining last month?").await;
        assert_eq!(output.first_missing_slot(), Some(SlotName::CategoryIds));
        assert!(output.clarifying_question.unwrap().contains("\"dining\""));
    }

    #[tokio::test]
    async fn test_routing_is_deterministic() {
        let router = stub_router();
        let query = "How much on groceries in Nov vs Oct?";

        let mut a = ConversationState::new("a", "CUST_001");
        let mut b = ConversationState::new("b", "CUST_001");
        let first = turn(&router, &mut a, 1, query).await;
        let second = turn(&router, &mut b, 1, query).await;

        assert_eq!(first.classification, second.classification);
        assert_eq!(first.resolved, second.resolved);
        assert_eq!(first.use_cases, second.use_cases);
    }
}
