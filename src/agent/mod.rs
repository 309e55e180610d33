//! Turn orchestrator
//!
//! QUERY → ROUTE → (EXECUTE) → ASSEMBLE
//!
//! Owns the session store and the audit log. Each turn holds its session's
//! lock from routing to assembly, so turns of one session never overlap.

use crate::assembler::OutputAssembler;
use crate::audit::{replay_record, seal, AuditLog};
use crate::category::{CategoryKnowledgeBase, CategoryResolver, SemanticIndex, VectorIndex};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::execution::Executor;
use crate::llm::{GeminiClient, LanguageModel};
use crate::models::{AuditRecord, Classification, Query, SlotName, StageLatency};
use crate::router::QueryRouter;
use crate::state::{InMemorySessionStore, SessionStore};
use crate::tools::{create_registry, HttpTransactionStore, InMemoryTransactionStore, TransactionStore};
use crate::verification::create_default_grounding_verifier;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// What one turn hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub turn_index: u32,
    pub classification: Classification,
    pub customer_message: String,
    pub missing_slots: Vec<SlotName>,
    #[serde(default)]
    pub clarification_limit_reached: bool,
    pub audit_record: Option<AuditRecord>,
}

/// Transaction insights agent
pub struct InsightsAgent {
    router: QueryRouter,
    executor: Executor,
    sessions: Arc<dyn SessionStore>,
    audit_log: Arc<AuditLog>,
}

impl InsightsAgent {
    pub fn new(
        router: QueryRouter,
        executor: Executor,
        sessions: Arc<dyn SessionStore>,
        audit_log: Arc<AuditLog>,
    ) -> Self {
        Self {
            router,
            executor,
            sessions,
            audit_log,
        }
    }

    /// Run one customer turn. Without a session id a fresh session is
    /// started; its id is returned for follow-ups.
    pub async fn handle_turn(
        &self,
        session_id: Option<&str>,
        customer_id: &str,
        text: &str,
    ) -> Result<TurnResponse> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidQuery("query text is empty".to_string()));
        }
        if customer_id.trim().is_empty() {
            return Err(AgentError::InvalidQuery("customer_id is required".to_string()));
        }

        let session_id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let started = Instant::now();
        let mut state = self.sessions.acquire(&session_id, customer_id).await?;
        let turn_index = state.turn_count + 1;

        info!(
            session_id = %session_id,
            customer_id = customer_id,
            turn = turn_index,
            "Turn started"
        );

        let query = Query::new(session_id.as_str(), customer_id, turn_index, text);
        let routing_started = Instant::now();
        let output = self.router.route(&mut state, query).await?;
        let routing_ms = routing_started.elapsed().as_millis() as u64;

        let response = if output.is_clear() {
            let mut executed = self.executor.execute(&output).await?;
            if let Some(record) = executed.audit_record.as_mut() {
                record.preferences_used = state.provenance(&output.resolved);
                record.latency = StageLatency {
                    routing_ms,
                    execution_ms: record.execution_time_ms,
                    total_ms: started.elapsed().as_millis() as u64,
                };
                seal(record);
            }
            let answered = OutputAssembler::answer(executed)?;
            if let Some(record) = &answered.audit_record {
                self.audit_log.record(record.clone()).await?;
            }
            answered
        } else {
            OutputAssembler::clarification(&output)?
        };

        // state stays locked until the turn is fully assembled
        drop(state);

        debug!(
            session_id = %session_id,
            turn = turn_index,
            classification = %output.classification,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn completed"
        );

        Ok(TurnResponse {
            session_id,
            turn_index,
            classification: output.classification,
            customer_message: response.customer_message,
            missing_slots: output.missing_slots.iter().copied().collect(),
            clarification_limit_reached: output.clarification_limit_reached,
            audit_record: response.audit_record,
        })
    }

    /// Forget a session's accumulated state.
    pub async fn abandon_session(&self, session_id: &str) -> Result<bool> {
        self.sessions.abandon(session_id).await
    }

    /// Integrity-checked audit record by id.
    pub async fn audit_record(&self, audit_id: Uuid) -> Result<Option<AuditRecord>> {
        replay_record(&self.audit_log, audit_id).await
    }

    pub async fn session_audit(&self, session_id: &str) -> Result<Vec<AuditRecord>> {
        self.audit_log.list_for_session(session_id).await
    }

    pub async fn evict_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.sessions.evict_expired(now).await
    }
}

/// Wire an agent from already-built parts.
pub fn build_agent(
    config: &AgentConfig,
    kb: &CategoryKnowledgeBase,
    index: Arc<dyn SemanticIndex>,
    store: Arc<dyn TransactionStore>,
    model: Option<Arc<dyn LanguageModel>>,
) -> InsightsAgent {
    let resolver = CategoryResolver::new(index, config.category.clone(), config.tool_timeout);
    let router = QueryRouter::new(config, resolver, model.clone());
    let executor = Executor::new(
        config,
        create_registry(store),
        create_default_grounding_verifier(kb),
        model,
    );

    InsightsAgent::new(
        router,
        executor,
        Arc::new(InMemorySessionStore::new(config.session_idle_ttl)),
        Arc::new(AuditLog::new()),
    )
}

/// Agent backed by the configured knowledge base, transaction source and
/// model. Without a Gemini key every message comes from templates.
pub fn create_agent(config: &AgentConfig) -> Result<InsightsAgent> {
    let kb = match &config.category_kb_path {
        Some(path) => CategoryKnowledgeBase::load(path)?,
        None => CategoryKnowledgeBase::builtin()?,
    };
    let index: Arc<dyn SemanticIndex> = Arc::new(VectorIndex::build(&kb));

    let store: Arc<dyn TransactionStore> = match (&config.transactions_api_base_url, &config.transactions_path) {
        (Some(url), _) => Arc::new(HttpTransactionStore::new(url, config.tool_timeout)?),
        (None, Some(path)) => Arc::new(InMemoryTransactionStore::load(path)?),
        (None, None) => Arc::new(InMemoryTransactionStore::demo()?),
    };

    let model: Option<Arc<dyn LanguageModel>> = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiClient::new(key.as_str())?)),
        None => None,
    };

    info!(
        categories = kb.len(),
        model = model.as_ref().map(|m| m.name()).unwrap_or("templates"),
        reference_date = %config.reference_date,
        "Agent initialized"
    );

    Ok(build_agent(config, &kb, index, store, model))
}
