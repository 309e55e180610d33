//! Derived arithmetic
//!
//! Each figure a message may quote is recorded with its formula and inputs,
//! so a reviewer can recompute it from the audit record alone.

use crate::models::{round_cents, Calculation, CalculationInput, Measure, QueryResult};

fn input(label: impl Into<String>, value: f64) -> CalculationInput {
    CalculationInput {
        label: label.into(),
        value,
    }
}

/// The measured figure of one side of the answer. `None` means the tool
/// returned no rows, which counts as zero.
pub fn measure_total(name: &str, measure: Measure, result: Option<&QueryResult>) -> Calculation {
    let rows = result.map(|r| r.transactions.as_slice()).unwrap_or_default();
    let row_inputs: Vec<CalculationInput> = rows
        .iter()
        .map(|row| input(row.transaction_id.clone(), row.amount))
        .collect();
    let note = result.is_none().then(|| "no matching transactions".to_string());

    let (formula, inputs, value) = match measure {
        Measure::Spending => (
            "sum(amount) of debit transactions",
            row_inputs,
            Some(result.map(|r| r.total_debit_amount).unwrap_or(0.0)),
        ),
        Measure::Income => (
            "sum(amount) of credit transactions",
            row_inputs,
            Some(result.map(|r| r.total_credit_amount).unwrap_or(0.0)),
        ),
        Measure::Count => (
            "count(transactions)",
            Vec::new(),
            Some(result.map(|r| r.total_count as f64).unwrap_or(0.0)),
        ),
        Measure::Average => (
            "sum(amount) / count(transactions)",
            row_inputs,
            match result {
                Some(r) => r.avg_amount,
                None => Some(0.0),
            },
        ),
    };

    Calculation {
        name: name.to_string(),
        formula: formula.to_string(),
        inputs,
        result: value,
        note,
    }
}

pub fn difference(primary: f64, comparison: f64) -> Calculation {
    Calculation {
        name: "difference".to_string(),
        formula: "primary_total - comparison_total".to_string(),
        inputs: vec![input("primary_total", primary), input("comparison_total", comparison)],
        result: Some(round_cents(primary - comparison)),
        note: None,
    }
}

/// Percentage change relative to the comparison side. Undefined when the
/// comparison total is zero.
pub fn percent_change(primary: f64, comparison: f64) -> Calculation {
    let (result, note) = if comparison == 0.0 {
        (None, Some("comparison total is zero".to_string()))
    } else {
        (Some(round_cents((primary - comparison) / comparison * 100.0)), None)
    };

    Calculation {
        name: "percent_change".to_string(),
        formula: "(primary_total - comparison_total) / comparison_total * 100".to_string(),
        inputs: vec![input("primary_total", primary), input("comparison_total", comparison)],
        result,
        note,
    }
}
