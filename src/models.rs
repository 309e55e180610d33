//! Core data models for the transaction insights agent

use crate::error::AgentError;
use crate::memory::SlotSource;
use crate::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Clear,
    Vague,
}

/// Slots a query may need before it can be answered.
///
/// Declaration order is the clarification priority order: the router always
/// asks about the first missing slot in this order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    TimeRange,
    CategoryIds,
    AmountThreshold,
    AccountScope,
    ComparisonTarget,
}

impl SlotName {
    pub const PRIORITY: [SlotName; 5] = [
        SlotName::TimeRange,
        SlotName::CategoryIds,
        SlotName::AmountThreshold,
        SlotName::AccountScope,
        SlotName::ComparisonTarget,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::TimeRange => "time_range",
            SlotName::CategoryIds => "category_ids",
            SlotName::AmountThreshold => "amount_threshold",
            SlotName::AccountScope => "account_scope",
            SlotName::ComparisonTarget => "comparison_target",
        }
    }
}

/// Use-case families a query can belong to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UseCase {
    #[serde(rename = "UC-01")]
    DirectRetrieval,
    #[serde(rename = "UC-02")]
    Aggregation,
    #[serde(rename = "UC-03")]
    Temporal,
    #[serde(rename = "UC-04")]
    CategoryBased,
    #[serde(rename = "UC-05")]
    Ambiguity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Spending,
    Income,
    Count,
    Average,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccountScope {
    All,
    Checking,
    Savings,
    CreditCard,
}

impl AccountScope {
    /// Account type value carried by transaction records, `None` for all accounts.
    pub fn account_type(&self) -> Option<&'static str> {
        match self {
            AccountScope::All => None,
            AccountScope::Checking => Some("checking"),
            AccountScope::Savings => Some("savings"),
            AccountScope::CreditCard => Some("credit_card"),
        }
    }
}

impl fmt::Display for AccountScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountScope::All => "all accounts",
            AccountScope::Checking => "checking account",
            AccountScope::Savings => "savings account",
            AccountScope::CreditCard => "credit card",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Query =================
//

/// One customer turn. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub session_id: String,
    pub customer_id: String,
    pub turn_index: u32,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(
        session_id: impl Into<String>,
        customer_id: impl Into<String>,
        turn_index: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            customer_id: customer_id.into(),
            turn_index,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

//
// ================= Time =================
//

/// Inclusive date range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeRange {
    /// Returns `None` when `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whether the range covers exactly one calendar month.
    pub fn is_full_month(&self) -> bool {
        self.start.day() == 1
            && self.start.year() == self.end.year()
            && self.start.month() == self.end.month()
            && self.end.succ_opt().map(|d| d.day() == 1).unwrap_or(false)
    }

    /// Human label used in customer messages: "November 2025", "2024",
    /// or the explicit range.
    pub fn label(&self) -> String {
        if self.is_full_month() {
            return self.start.format("%B %Y").to_string();
        }
        if self.start.month() == 1
            && self.start.day() == 1
            && self.end.month() == 12
            && self.end.day() == 31
            && self.start.year() == self.end.year()
        {
            return self.start.year().to_string();
        }
        if self.start == self.end {
            return self.start.format("%Y-%m-%d").to_string();
        }
        self.to_string()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// A time range together with the phrase it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedTimeRange {
    pub range: TimeRange,
    pub phrase: String,
    pub interpretation: String,
}

//
// ================= Categories =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Group,
    Subcategory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    pub kind: CategoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_group_id: Option<String>,
}

/// One ranked candidate for a category phrase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryMatch {
    pub query_phrase: String,
    pub category: CategoryRef,
    pub similarity_score: f32,
    pub rank: usize,
}

//
// ================= Slots =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonTarget {
    Period { period: ResolvedTimeRange },
    Categories { categories: Vec<CategoryRef> },
}

/// Filters the router resolved for a turn. Every executor parameter must
/// come from here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolvedSlots {
    pub time_range: Option<ResolvedTimeRange>,
    #[serde(default)]
    pub category_ids: Vec<CategoryRef>,
    #[serde(default)]
    pub category_matches: Vec<CategoryMatch>,
    pub account_scope: Option<AccountScope>,
    pub amount_threshold: Option<f64>,
    pub comparison_target: Option<ComparisonTarget>,
}

impl ResolvedSlots {
    /// Drop the value of `slot`.
    pub fn clear(&mut self, slot: SlotName) {
        match slot {
            SlotName::TimeRange => self.time_range = None,
            SlotName::CategoryIds => self.category_ids.clear(),
            SlotName::AmountThreshold => self.amount_threshold = None,
            SlotName::AccountScope => self.account_scope = None,
            SlotName::ComparisonTarget => self.comparison_target = None,
        }
    }

    pub fn has(&self, slot: SlotName) -> bool {
        match slot {
            SlotName::TimeRange => self.time_range.is_some(),
            SlotName::CategoryIds => !self.category_ids.is_empty(),
            SlotName::AmountThreshold => self.amount_threshold.is_some(),
            SlotName::AccountScope => self.account_scope.is_some(),
            SlotName::ComparisonTarget => self.comparison_target.is_some(),
        }
    }
}

/// A clarifying question together with the answer that followed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClarificationStep {
    pub question: String,
    pub user_answer: String,
    pub turn_id: u32,
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryIntent {
    pub primary: UseCase,
    pub measure: Measure,
    pub comparison: bool,
    /// Row limit for retrieval-style questions ("my last transaction").
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterOutput {
    pub query: Query,
    pub classification: Classification,
    pub use_cases: Vec<UseCase>,
    pub intent: QueryIntent,
    #[serde(flatten)]
    pub resolved: ResolvedSlots,
    pub missing_slots: BTreeSet<SlotName>,
    pub clarifying_question: Option<String>,
    pub clarity_reason: String,
    #[serde(default)]
    pub clarifications: Vec<ClarificationStep>,
    #[serde(default)]
    pub clarification_limit_reached: bool,
}

impl RouterOutput {
    pub fn clear(
        query: Query,
        use_cases: Vec<UseCase>,
        intent: QueryIntent,
        resolved: ResolvedSlots,
        clarity_reason: impl Into<String>,
    ) -> Self {
        Self {
            query,
            classification: Classification::Clear,
            use_cases,
            intent,
            resolved,
            missing_slots: BTreeSet::new(),
            clarifying_question: None,
            clarity_reason: clarity_reason.into(),
            clarifications: Vec::new(),
            clarification_limit_reached: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn vague(
        query: Query,
        use_cases: Vec<UseCase>,
        intent: QueryIntent,
        resolved: ResolvedSlots,
        missing_slots: BTreeSet<SlotName>,
        clarifying_question: String,
        clarity_reason: impl Into<String>,
    ) -> Result<Self> {
        let output = Self {
            query,
            classification: Classification::Vague,
            use_cases,
            intent,
            resolved,
            missing_slots,
            clarifying_question: Some(clarifying_question),
            clarity_reason: clarity_reason.into(),
            clarifications: Vec::new(),
            clarification_limit_reached: false,
        };
        output.check_invariant()?;
        Ok(output)
    }

    pub fn is_clear(&self) -> bool {
        self.classification == Classification::Clear
    }

    pub fn first_missing_slot(&self) -> Option<SlotName> {
        self.missing_slots.iter().next().copied()
    }

    /// `VAGUE ⇔ missing slots ∧ question`, `CLEAR ⇔ no missing slots ∧ no question`.
    pub fn check_invariant(&self) -> Result<()> {
        let has_question = self
            .clarifying_question
            .as_deref()
            .map(|q| !q.trim().is_empty())
            .unwrap_or(false);

        match self.classification {
            Classification::Vague if self.missing_slots.is_empty() || !has_question => {
                Err(AgentError::NotExecutable(
                    "VAGUE output needs missing slots and a clarifying question".to_string(),
                ))
            }
            Classification::Clear if !self.missing_slots.is_empty() || self.clarifying_question.is_some() => {
                Err(AgentError::NotExecutable(
                    "CLEAR output cannot carry missing slots or a question".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    #[serde(rename = "D")]
    Debit,
    #[serde(rename = "C")]
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub customer_id: String,
    pub account_id: String,
    #[serde(default)]
    pub account_type: Option<String>,
    /// Positive magnitude; the sign lives in `direction`.
    pub amount: f64,
    pub direction: Direction,
    pub date: NaiveDate,
    #[serde(default)]
    pub merchant: Option<String>,
    pub category_group_id: String,
    pub category_group_name: String,
    #[serde(default)]
    pub sub_category_id: Option<String>,
    #[serde(default)]
    pub sub_category_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirectionFilter {
    Debit,
    Credit,
    Both,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    DateAsc,
    DateDesc,
}

/// Parameters of a `query_transactions` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionFilters {
    pub customer_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub account_scope: Option<AccountScope>,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default)]
    pub direction: Option<DirectionFilter>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl TransactionFilters {
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            start_date: None,
            end_date: None,
            category_ids: Vec::new(),
            account_scope: None,
            min_amount: None,
            max_amount: None,
            direction: None,
            sort: None,
            limit: None,
        }
    }
}

/// Round a money amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub transactions: Vec<TransactionRecord>,
    pub total_count: usize,
    pub total_debit_amount: f64,
    pub total_credit_amount: f64,
    pub net_amount: f64,
    pub avg_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub min_amount: Option<f64>,
}

/// Store answer. An empty result is an outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Matches { result: QueryResult },
    NoMatches,
}

//
// ================= Tool I/O =================
//

/// Planned call of a tool. Parameters are copied from the router output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub order: u32,
    pub tool_name: String,
    /// "primary" or "comparison".
    pub purpose: String,
    pub parameters: TransactionFilters,
}

impl ToolInvocation {
    pub fn to_input(&self) -> Result<ToolInput> {
        Ok(ToolInput {
            tool_name: self.tool_name.clone(),
            parameters: serde_json::to_value(&self.parameters)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Empty,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub invocation: ToolInvocation,
    pub status: ToolCallStatus,
    pub raw_result: serde_json::Value,
    pub error: Option<String>,
    pub attempts: u32,
    pub execution_time_ms: u64,
}

//
// ================= Calculations =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationInput {
    pub label: String,
    pub value: f64,
}

/// Derived arithmetic, recorded so a reviewer can recompute it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Calculation {
    pub name: String,
    pub formula: String,
    pub inputs: Vec<CalculationInput>,
    pub result: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

//
// ================= Grounding =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingCheck {
    pub rule_name: String,
    pub passed: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingReport {
    pub grounded: bool,
    pub checks: Vec<GroundingCheck>,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompositionSource {
    LanguageModel,
    Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedDraft {
    pub draft: String,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionTrace {
    pub source: CompositionSource,
    pub model_attempts: u32,
    pub rejected_drafts: Vec<RejectedDraft>,
    pub model_error: Option<String>,
}

//
// ================= Audit =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Answered,
    NoData,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    pub classification: Classification,
    pub use_cases: Vec<UseCase>,
    pub intent: QueryIntent,
    pub clarity_reason: String,
    pub clarifications: Vec<ClarificationStep>,
}

impl From<&RouterOutput> for RoutingSnapshot {
    fn from(output: &RouterOutput) -> Self {
        Self {
            classification: output.classification,
            use_cases: output.use_cases.clone(),
            intent: output.intent,
            clarity_reason: output.clarity_reason.clone(),
            clarifications: output.clarifications.clone(),
        }
    }
}

/// Provenance of a stored slot that fed an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotProvenance {
    pub slot: SlotName,
    pub value: String,
    pub source: SlotSource,
    pub turn_id: u32,
    pub original_query: String,
    pub previous_value: Option<String>,
    pub previous_turn_id: Option<u32>,
}

/// Wall time spent in each stage of the turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageLatency {
    pub routing_ms: u64,
    pub execution_ms: u64,
    pub total_ms: u64,
}

/// Replayable trace of one answered turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub session_id: String,
    pub customer_id: String,
    pub turn_index: u32,
    pub created_at: DateTime<Utc>,
    pub query: String,
    pub routing: RoutingSnapshot,
    pub resolved_filters: ResolvedSlots,
    pub tool_calls: Vec<ToolCallRecord>,
    pub calculations: Vec<Calculation>,
    pub grounding: Option<GroundingReport>,
    pub composition: Option<CompositionTrace>,
    pub outcome: AuditOutcome,
    pub final_answer: String,
    pub execution_time_ms: u64,
    /// Slots stored in earlier or current turns that shaped this answer.
    #[serde(default)]
    pub preferences_used: Vec<SlotProvenance>,
    #[serde(default)]
    pub latency: StageLatency,
    /// SHA-256 over the record with this field blank.
    pub integrity_hash: String,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualResponse {
    pub customer_message: String,
    pub audit_record: Option<AuditRecord>,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Clear => "CLEAR",
            Classification::Vague => "VAGUE",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
