//! Transaction storage behind the `query_transactions` tool
//!
//! The store is a deterministic data-access boundary: given exact filters it
//! returns rows plus aggregates, or `NoMatches`. It never interprets text.

use crate::error::AgentError;
use crate::models::{
    round_cents, Direction, DirectionFilter, QueryResponse, QueryResult, SortOrder,
    TransactionFilters, TransactionRecord,
};
use crate::Result;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error};

const DEMO_TRANSACTIONS: &str = include_str!("../../data/transactions.json");

#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn query(&self, filters: &TransactionFilters) -> Result<QueryResponse>;
}

/// Reject filters no store could answer.
pub fn validate_filters(filters: &TransactionFilters) -> Result<()> {
    if filters.customer_id.trim().is_empty() {
        return Err(AgentError::InvalidToolInput("customer_id is required".to_string()));
    }
    if let (Some(start), Some(end)) = (filters.start_date, filters.end_date) {
        if start > end {
            return Err(AgentError::InvalidToolInput(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }
    }
    if filters.min_amount.map(|a| a < 0.0).unwrap_or(false)
        || filters.max_amount.map(|a| a < 0.0).unwrap_or(false)
    {
        return Err(AgentError::InvalidToolInput("amount bounds must be non-negative".to_string()));
    }
    if let (Some(min), Some(max)) = (filters.min_amount, filters.max_amount) {
        if min > max {
            return Err(AgentError::InvalidToolInput(format!(
                "min_amount {} exceeds max_amount {}",
                min, max
            )));
        }
    }
    if filters.limit == Some(0) {
        return Err(AgentError::InvalidToolInput("limit must be at least 1".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TransactionFile {
    transactions: Vec<TransactionRecord>,
}

/// Store over an in-memory list of records (JSON fixture).
pub struct InMemoryTransactionStore {
    records: Vec<TransactionRecord>,
}

impl InMemoryTransactionStore {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: TransactionFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.transactions))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Demo data set shipped with the crate.
    pub fn demo() -> Result<Self> {
        Self::from_json(DEMO_TRANSACTIONS)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matches(record: &TransactionRecord, filters: &TransactionFilters) -> bool {
        if record.customer_id != filters.customer_id {
            return false;
        }
        if filters.start_date.map(|s| record.date < s).unwrap_or(false)
            || filters.end_date.map(|e| record.date > e).unwrap_or(false)
        {
            return false;
        }
        if !filters.category_ids.is_empty() {
            let in_group = filters.category_ids.contains(&record.category_group_id);
            let in_sub = record
                .sub_category_id
                .as_ref()
                .map(|id| filters.category_ids.contains(id))
                .unwrap_or(false);
            if !in_group && !in_sub {
                return false;
            }
        }
        if let Some(account_type) = filters.account_scope.and_then(|s| s.account_type()) {
            if record.account_type.as_deref() != Some(account_type) {
                return false;
            }
        }
        if filters.min_amount.map(|m| record.amount < m).unwrap_or(false)
            || filters.max_amount.map(|m| record.amount > m).unwrap_or(false)
        {
            return false;
        }
        match filters.direction.unwrap_or(DirectionFilter::Both) {
            DirectionFilter::Debit => record.direction == Direction::Debit,
            DirectionFilter::Credit => record.direction == Direction::Credit,
            DirectionFilter::Both => true,
        }
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn query(&self, filters: &TransactionFilters) -> Result<QueryResponse> {
        validate_filters(filters)?;

        let mut rows: Vec<TransactionRecord> = self
            .records
            .iter()
            .filter(|r| Self::matches(r, filters))
            .cloned()
            .collect();

        debug!(
            customer_id = %filters.customer_id,
            matched = rows.len(),
            "Transaction query evaluated"
        );

        if rows.is_empty() {
            return Ok(QueryResponse::NoMatches);
        }

        match filters.sort.unwrap_or(SortOrder::DateDesc) {
            SortOrder::DateAsc => rows.sort_by(|a, b| {
                a.date.cmp(&b.date).then_with(|| a.transaction_id.cmp(&b.transaction_id))
            }),
            SortOrder::DateDesc => rows.sort_by(|a, b| {
                b.date.cmp(&a.date).then_with(|| b.transaction_id.cmp(&a.transaction_id))
            }),
        }

        let mut result = aggregate(&rows);
        if let Some(limit) = filters.limit {
            rows.truncate(limit as usize);
        }
        result.transactions = rows;

        Ok(QueryResponse::Matches { result })
    }
}

/// Aggregates over every matched row, before any row limit.
fn aggregate(rows: &[TransactionRecord]) -> QueryResult {
    let total_debit: f64 = rows
        .iter()
        .filter(|r| r.direction == Direction::Debit)
        .map(|r| r.amount)
        .sum();
    let total_credit: f64 = rows
        .iter()
        .filter(|r| r.direction == Direction::Credit)
        .map(|r| r.amount)
        .sum();

    let amounts = rows.iter().map(|r| r.amount.abs());
    let max = amounts.clone().fold(None, |acc: Option<f64>, a| Some(acc.map_or(a, |m| m.max(a))));
    let min = amounts.clone().fold(None, |acc: Option<f64>, a| Some(acc.map_or(a, |m| m.min(a))));
    let avg = if rows.is_empty() {
        None
    } else {
        Some(round_cents(amounts.sum::<f64>() / rows.len() as f64))
    };

    QueryResult {
        transactions: Vec::new(),
        total_count: rows.len(),
        total_debit_amount: round_cents(total_debit),
        total_credit_amount: round_cents(total_credit),
        net_amount: round_cents(total_credit - total_debit),
        avg_amount: avg,
        max_amount: max.map(round_cents),
        min_amount: min.map(round_cents),
    }
}

/// Store backed by a remote transactions service.
#[derive(Clone)]
pub struct HttpTransactionStore {
    client: Client,
    base_url: String,
}

impl HttpTransactionStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl TransactionStore for HttpTransactionStore {
    async fn query(&self, filters: &TransactionFilters) -> Result<QueryResponse> {
        validate_filters(filters)?;

        let url = format!("{}/api/v1/transactions/query", self.base_url);
        let response = self
            .client
            .post(url)
            .json(filters)
            .send()
            .await
            .map_err(|e| {
                error!("Transaction service request failed: {}", e);
                if e.is_timeout() {
                    AgentError::Timeout("transaction service request".to_string())
                } else {
                    AgentError::ToolInvocationFailure {
                        tool: "query_transactions".to_string(),
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::InvalidToolInput(format!(
                "transaction service rejected filters ({}): {}",
                status, body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ToolInvocationFailure {
                tool: "query_transactions".to_string(),
                detail: format!("transaction service returned {}: {}", status, body),
            });
        }

        let result: QueryResult = response.json().await.map_err(|e| AgentError::ToolInvocationFailure {
            tool: "query_transactions".to_string(),
            detail: format!("invalid response body: {}", e),
        })?;

        if result.total_count == 0 {
            Ok(QueryResponse::NoMatches)
        } else {
            Ok(QueryResponse::Matches { result })
        }
    }
}
