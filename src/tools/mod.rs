//! Tool trait and registry
//!
//! Tools are deterministic, side-effect-free operations. The executor only
//! reaches data through them.

pub mod store;

pub use store::{HttpTransactionStore, InMemoryTransactionStore, TransactionStore};

use crate::error::AgentError;
use crate::models::{ToolInput, ToolOutput, TransactionFilters};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

pub const QUERY_TRANSACTIONS: &str = "query_transactions";

/// Trait for a single tool (deterministic execution)
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(AgentError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ))
    }
}

/// Filtered transaction lookup with aggregates.
pub struct QueryTransactionsTool {
    store: Arc<dyn TransactionStore>,
}

impl QueryTransactionsTool {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for QueryTransactionsTool {
    fn name(&self) -> &'static str {
        QUERY_TRANSACTIONS
    }

    fn description(&self) -> &'static str {
        "Query a customer's transactions by date range, category, account, amount and direction"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;

        let filters: TransactionFilters = serde_json::from_value(input.parameters.clone())
            .map_err(|e| AgentError::InvalidToolInput(format!("bad transaction filters: {}", e)))?;

        let response = self.store.query(&filters).await?;

        Ok(ToolOutput {
            success: true,
            data: serde_json::to_value(&response)?,
            error: None,
        })
    }
}

/// Registry with the transaction query tool over `store`.
pub fn create_registry(store: Arc<dyn TransactionStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(QueryTransactionsTool::new(store)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryResponse;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        create_registry(Arc::new(InMemoryTransactionStore::demo().unwrap()))
    }

    #[test]
    fn test_registry_lists_query_tool() {
        let registry = registry();
        assert_eq!(registry.list(), vec![QUERY_TRANSACTIONS]);
        assert!(registry.get("web_search").is_none());
    }

    #[tokio::test]
    async fn test_query_tool_returns_structured_response() {
        let tool = registry().get(QUERY_TRANSACTIONS).unwrap();
        let input = ToolInput {
            tool_name: QUERY_TRANSACTIONS.to_string(),
            parameters: json!({
                "customer_id": "CUST_001",
                "start_date": "2025-11-01",
                "end_date": "2025-11-30",
                "category_ids": ["CG800"],
                "direction": "debit"
            }),
        };

        let output = tool.execute(&input).await.unwrap();
        assert!(output.success);
        let response: QueryResponse = serde_json::from_value(output.data).unwrap();
        match response {
            QueryResponse::Matches { result } => assert_eq!(result.total_debit_amount, 389.40),
            QueryResponse::NoMatches => panic!("expected matches"),
        }
    }

    #[tokio::test]
    async fn test_non_object_parameters_rejected() {
        let tool = registry().get(QUERY_TRANSACTIONS).unwrap();
        let input = ToolInput {
            tool_name: QUERY_TRANSACTIONS.to_string(),
            parameters: json!(["CUST_001"]),
        };
        tokio_test::assert_err!(tool.execute(&input).await);
    }
}
