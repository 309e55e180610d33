//! Tool invocation planning
//!
//! Parameters are copied from the router output and nowhere else. The
//! traceability guard re-checks that before anything runs.

use crate::error::AgentError;
use crate::models::{
    CategoryRef, ComparisonTarget, DirectionFilter, Measure, RouterOutput, SortOrder, TimeRange,
    ToolInvocation, TransactionFilters, UseCase,
};
use crate::tools::QUERY_TRANSACTIONS;
use crate::Result;

pub const PRIMARY: &str = "primary";
pub const COMPARISON: &str = "comparison";

/// Whether the answer lists rows rather than aggregating them.
pub fn is_listing(output: &RouterOutput) -> bool {
    !output.intent.comparison
        && matches!(
            output.intent.primary,
            UseCase::Temporal | UseCase::CategoryBased | UseCase::DirectRetrieval
        )
}

fn direction(output: &RouterOutput) -> Option<DirectionFilter> {
    match output.intent.measure {
        Measure::Income => Some(DirectionFilter::Credit),
        Measure::Count => None,
        Measure::Spending if is_listing(output) => None,
        Measure::Spending | Measure::Average => Some(DirectionFilter::Debit),
    }
}

fn filters(output: &RouterOutput, range: Option<TimeRange>, categories: &[CategoryRef]) -> TransactionFilters {
    let listing = is_listing(output);
    let mut filters = TransactionFilters::for_customer(output.query.customer_id.clone());
    filters.start_date = range.map(|r| r.start);
    filters.end_date = range.map(|r| r.end);
    filters.category_ids = categories.iter().map(|c| c.id.clone()).collect();
    filters.account_scope = output.resolved.account_scope;
    filters.min_amount = output.resolved.amount_threshold;
    filters.direction = direction(output);
    filters.sort = listing.then_some(SortOrder::DateDesc);
    filters.limit = if listing { output.intent.limit } else { None };
    filters
}

/// One invocation for the question, plus one for the comparison side.
pub fn plan_invocations(output: &RouterOutput) -> Vec<ToolInvocation> {
    let resolved = &output.resolved;
    let primary_range = resolved.time_range.as_ref().map(|t| t.range);

    let mut invocations = vec![ToolInvocation {
        order: 1,
        tool_name: QUERY_TRANSACTIONS.to_string(),
        purpose: PRIMARY.to_string(),
        parameters: filters(output, primary_range, &resolved.category_ids),
    }];

    if output.intent.comparison {
        let parameters = match &resolved.comparison_target {
            Some(ComparisonTarget::Period { period }) => {
                Some(filters(output, Some(period.range), &resolved.category_ids))
            }
            Some(ComparisonTarget::Categories { categories }) => {
                Some(filters(output, primary_range, categories))
            }
            None => None,
        };
        if let Some(parameters) = parameters {
            invocations.push(ToolInvocation {
                order: 2,
                tool_name: QUERY_TRANSACTIONS.to_string(),
                purpose: COMPARISON.to_string(),
                parameters,
            });
        }
    }

    invocations
}

/// Reject any invocation parameter that does not trace back to the router
/// output.
pub fn check_traceability(output: &RouterOutput, invocations: &[ToolInvocation]) -> Result<()> {
    let resolved = &output.resolved;

    let mut allowed_ranges: Vec<TimeRange> = resolved.time_range.iter().map(|t| t.range).collect();
    let mut allowed_categories: Vec<&str> =
        resolved.category_ids.iter().map(|c| c.id.as_str()).collect();
    match &resolved.comparison_target {
        Some(ComparisonTarget::Period { period }) => allowed_ranges.push(period.range),
        Some(ComparisonTarget::Categories { categories }) => {
            allowed_categories.extend(categories.iter().map(|c| c.id.as_str()))
        }
        None => {}
    }

    let violation = |detail: String| Err(AgentError::GroundingViolation(detail));

    for invocation in invocations {
        let p = &invocation.parameters;

        if p.customer_id != output.query.customer_id {
            return violation(format!("invocation {} targets another customer", invocation.order));
        }

        match (p.start_date, p.end_date) {
            (Some(start), Some(end)) => {
                if !allowed_ranges.iter().any(|r| r.start == start && r.end == end) {
                    return violation(format!(
                        "invocation {} uses unresolved period {} to {}",
                        invocation.order, start, end
                    ));
                }
            }
            (None, None) if resolved.time_range.is_none() => {}
            _ => {
                return violation(format!(
                    "invocation {} has a partial or dropped period",
                    invocation.order
                ))
            }
        }

        if let Some(id) = p
            .category_ids
            .iter()
            .find(|id| !allowed_categories.contains(&id.as_str()))
        {
            return violation(format!(
                "invocation {} uses unresolved category {}",
                invocation.order, id
            ));
        }

        if p.account_scope.is_some() && p.account_scope != resolved.account_scope {
            return violation(format!("invocation {} uses an unresolved account", invocation.order));
        }
        if p.min_amount.is_some() && p.min_amount != resolved.amount_threshold {
            return violation(format!("invocation {} uses an unresolved amount", invocation.order));
        }
        if p.max_amount.is_some() {
            return violation(format!("invocation {} sets a maximum amount", invocation.order));
        }
        if p.limit.is_some() && p.limit != output.intent.limit {
            return violation(format!("invocation {} uses an unrequested limit", invocation.order));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Query, QueryIntent, ResolvedSlots, ResolvedTimeRange};
    use crate::test_support::{category, day};

    fn month(m: u32) -> ResolvedTimeRange {
        let end = if m == 11 { day(2025, 11, 30) } else { day(2025, 10, 31) };
        ResolvedTimeRange {
            range: TimeRange::new(day(2025, m, 1), end).unwrap(),
            phrase: "month".to_string(),
            interpretation: "calendar month".to_string(),
        }
    }

    fn groceries_comparison() -> RouterOutput {
        let resolved = ResolvedSlots {
            time_range: Some(month(11)),
            category_ids: vec![category("CG10000")],
            comparison_target: Some(ComparisonTarget::Period { period: month(10) }),
            ..ResolvedSlots::default()
        };
        let intent = QueryIntent {
            primary: UseCase::Aggregation,
            measure: Measure::Spending,
            comparison: true,
            limit: None,
        };
        RouterOutput::clear(
            Query::new("s1", "CUST_001", 1, "groceries nov vs oct"),
            vec![UseCase::Aggregation],
            intent,
            resolved,
            "resolved",
        )
    }

    #[test]
    fn test_comparison_plans_two_invocations() {
        let output = groceries_comparison();
        let plan = plan_invocations(&output);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].purpose, PRIMARY);
        assert_eq!(plan[1].parameters.start_date, Some(day(2025, 10, 1)));
        assert_eq!(plan[1].parameters.category_ids, vec!["CG10000".to_string()]);
        assert_eq!(plan[0].parameters.direction, Some(DirectionFilter::Debit));
        assert!(check_traceability(&output, &plan).is_ok());
    }

    #[test]
    fn test_traceability_rejects_invented_parameters() {
        let output = groceries_comparison();

        let mut plan = plan_invocations(&output);
        plan[0].parameters.category_ids.push("CG500".to_string());
        assert!(matches!(
            check_traceability(&output, &plan),
            Err(AgentError::GroundingViolation(_))
        ));

        let mut plan = plan_invocations(&output);
        plan[1].parameters.start_date = Some(day(2025, 9, 1));
        assert!(check_traceability(&output, &plan).is_err());

        let mut plan = plan_invocations(&output);
        plan[0].parameters.min_amount = Some(50.0);
        assert!(check_traceability(&output, &plan).is_err());
    }

    #[test]
    fn test_listing_sorts_newest_first() {
        let mut output = groceries_comparison();
        output.intent = QueryIntent {
            primary: UseCase::DirectRetrieval,
            measure: Measure::Spending,
            comparison: false,
            limit: Some(1),
        };
        output.resolved.time_range = None;
        output.resolved.comparison_target = None;

        let plan = plan_invocations(&output);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].parameters.sort, Some(SortOrder::DateDesc));
        assert_eq!(plan[0].parameters.limit, Some(1));
        assert_eq!(plan[0].parameters.direction, None);
        assert!(check_traceability(&output, &plan).is_ok());
    }
}
