//! Runtime configuration
//!
//! Loaded from the environment (after `dotenv`) by the binaries; tests build
//! it directly from `AgentConfig::default()`.

use crate::error::AgentError;
use crate::Result;
use chrono::{NaiveDate, Utc};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// How relative periods such as "last month" are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodPolicy {
    /// Previous complete calendar period.
    #[default]
    Calendar,
    /// Window ending on the reference date.
    Rolling,
}

impl FromStr for PeriodPolicy {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calendar" => Ok(PeriodPolicy::Calendar),
            "rolling" => Ok(PeriodPolicy::Rolling),
            other => Err(AgentError::Config(format!(
                "PERIOD_POLICY must be 'calendar' or 'rolling', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryThresholds {
    pub top_k: usize,
    /// Matches below this score are never offered.
    pub similarity_floor: f32,
    /// Top score needed to resolve without asking.
    pub acceptance_threshold: f32,
    /// Required gap between the first and second candidate.
    pub min_margin: f32,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_floor: 0.35,
            acceptance_threshold: 0.80,
            min_margin: 0.08,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub reference_date: NaiveDate,
    pub period_policy: PeriodPolicy,
    pub category: CategoryThresholds,
    pub max_clarification_turns: u32,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub tool_retries: u32,
    pub max_model_attempts: u32,
    pub session_idle_ttl: Duration,
    pub gemini_api_key: Option<String>,
    pub transactions_path: Option<PathBuf>,
    pub transactions_api_base_url: Option<String>,
    pub category_kb_path: Option<PathBuf>,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            reference_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap_or_default(),
            period_policy: PeriodPolicy::Calendar,
            category: CategoryThresholds::default(),
            max_clarification_turns: 3,
            model_timeout: Duration::from_millis(15_000),
            tool_timeout: Duration::from_millis(5_000),
            tool_retries: 1,
            max_model_attempts: 2,
            session_idle_ttl: Duration::from_secs(30 * 60),
            gemini_api_key: None,
            transactions_path: None,
            transactions_api_base_url: None,
            category_kb_path: None,
            port: 8000,
        }
    }
}

impl AgentConfig {
    /// Read configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let reference_date = match non_empty("REFERENCE_DATE") {
            Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
                AgentError::Config(format!("REFERENCE_DATE '{}' is not YYYY-MM-DD: {}", raw, e))
            })?,
            None => {
                let today = Utc::now().date_naive();
                warn!(reference_date = %today, "REFERENCE_DATE not set, using current UTC date");
                today
            }
        };

        let period_policy = match non_empty("PERIOD_POLICY") {
            Some(raw) => raw.parse()?,
            None => defaults.period_policy,
        };

        let category = CategoryThresholds {
            top_k: parse_or("CATEGORY_TOP_K", defaults.category.top_k)?,
            similarity_floor: parse_or("CATEGORY_SIMILARITY_FLOOR", defaults.category.similarity_floor)?,
            acceptance_threshold: parse_or(
                "CATEGORY_ACCEPTANCE_THRESHOLD",
                defaults.category.acceptance_threshold,
            )?,
            min_margin: parse_or("CATEGORY_MIN_MARGIN", defaults.category.min_margin)?,
        };

        let config = Self {
            reference_date,
            period_policy,
            category,
            max_clarification_turns: parse_or("MAX_CLARIFICATION_TURNS", defaults.max_clarification_turns)?,
            model_timeout: Duration::from_millis(parse_or(
                "MODEL_TIMEOUT_MS",
                defaults.model_timeout.as_millis() as u64,
            )?),
            tool_timeout: Duration::from_millis(parse_or(
                "TOOL_TIMEOUT_MS",
                defaults.tool_timeout.as_millis() as u64,
            )?),
            tool_retries: parse_or("TOOL_RETRIES", defaults.tool_retries)?,
            max_model_attempts: parse_or("MAX_MODEL_ATTEMPTS", defaults.max_model_attempts)?,
            session_idle_ttl: Duration::from_secs(parse_or(
                "SESSION_IDLE_TTL_SECS",
                defaults.session_idle_ttl.as_secs(),
            )?),
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            transactions_path: non_empty("TRANSACTIONS_PATH").map(PathBuf::from),
            transactions_api_base_url: non_empty("TRANSACTIONS_API_BASE_URL"),
            category_kb_path: non_empty("CATEGORY_KB_PATH").map(PathBuf::from),
            port: parse_or("PORT", defaults.port)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.category;
        if c.top_k == 0 {
            return Err(AgentError::Config("CATEGORY_TOP_K must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&c.similarity_floor) || !(0.0..=1.0).contains(&c.acceptance_threshold) {
            return Err(AgentError::Config(
                "category thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if c.similarity_floor > c.acceptance_threshold {
            return Err(AgentError::Config(
                "CATEGORY_SIMILARITY_FLOOR cannot exceed CATEGORY_ACCEPTANCE_THRESHOLD".to_string(),
            ));
        }
        if self.max_clarification_turns == 0 {
            return Err(AgentError::Config(
                "MAX_CLARIFICATION_TURNS must be at least 1".to_string(),
            ));
        }
        if self.max_model_attempts == 0 {
            return Err(AgentError::Config("MAX_MODEL_ATTEMPTS must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| AgentError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.category.top_k, 3);
        assert_eq!(config.period_policy, PeriodPolicy::Calendar);
    }

    #[test]
    fn test_period_policy_parse() {
        assert_eq!("Rolling".parse::<PeriodPolicy>().unwrap(), PeriodPolicy::Rolling);
        assert!("fiscal".parse::<PeriodPolicy>().is_err());
    }

    #[test]
    fn test_floor_above_acceptance_rejected() {
        let mut config = AgentConfig::default();
        config.category.similarity_floor = 0.9;
        assert!(matches!(config.validate(), Err(AgentError::Config(_))));
    }
}
