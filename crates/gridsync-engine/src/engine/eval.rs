//! Formula evaluation.
//!
//! Turns a raw cell input into a display value plus the cells it reads.
//! Evaluation is pure: the store is only read, never written.

use regex::Regex;
use std::sync::OnceLock;

use super::cell::ERROR_SENTINEL;
use super::deps::{expand_range, extract_dependencies, parse_range};
use super::expr::evaluate_arithmetic;
use super::format::{format_number, parse_number};
use super::{CellId, CellStore};

/// The result of evaluating one raw input.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub display_value: String,
    pub dependencies: Vec<CellId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Average,
    Count,
}

fn aggregate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(SUM|AVERAGE|COUNT)\(([A-Z]+[0-9]+:[A-Z]+[0-9]+)\)$")
            .expect("aggregate regex must compile")
    })
}

/// Evaluate a raw input against a store snapshot.
pub fn evaluate(raw_input: &str, store: &CellStore) -> Evaluation {
    let Some(body) = raw_input.strip_prefix('=') else {
        return Evaluation {
            display_value: raw_input.to_string(),
            dependencies: Vec::new(),
        };
    };

    if let Some(evaluation) = evaluate_aggregate(body, store) {
        return evaluation;
    }

    let dependencies = extract_dependencies(body);
    let display_value = match evaluate_arithmetic(body, |id| numeric_value(store, id)) {
        Ok(n) if n.is_finite() => format_number(n),
        _ => ERROR_SENTINEL.to_string(),
    };
    Evaluation {
        display_value,
        dependencies,
    }
}

/// Evaluate a standalone formula (with or without the leading `=`) against an empty store.
pub fn evaluate_expression(text: &str) -> String {
    let store = CellStore::new();
    let trimmed = text.trim();
    let raw = if trimmed.starts_with('=') {
        trimmed.to_string()
    } else {
        format!("={}", trimmed)
    };
    evaluate(&raw, &store).display_value
}

/// Match `SUM(range)`, `AVERAGE(range)` or `COUNT(range)`, case-insensitively.
/// Malformed or oversized ranges are not a match.
fn evaluate_aggregate(body: &str, store: &CellStore) -> Option<Evaluation> {
    let upper = body.to_uppercase();
    let caps = aggregate_re().captures(&upper)?;
    let aggregate = match &caps[1] {
        "SUM" => Aggregate::Sum,
        "AVERAGE" => Aggregate::Average,
        _ => Aggregate::Count,
    };
    let (start, end) = parse_range(&caps[2])?;
    let cells = expand_range(start, end)?;

    let result = match aggregate {
        Aggregate::Sum => cells.iter().filter_map(|id| numeric_display(store, *id)).sum(),
        Aggregate::Average => {
            let values: Vec<f64> = cells
                .iter()
                .filter_map(|id| numeric_display(store, *id))
                .collect();
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
        Aggregate::Count => cells
            .iter()
            .filter(|id| !store.display_value(**id).is_empty())
            .count() as f64,
    };

    let display_value = if result.is_finite() {
        format_number(result)
    } else {
        ERROR_SENTINEL.to_string()
    };
    Some(Evaluation {
        display_value,
        dependencies: cells,
    })
}

fn numeric_display(store: &CellStore, id: CellId) -> Option<f64> {
    parse_number(&store.display_value(id))
}

/// Missing and non-numeric cells read as 0 in arithmetic.
fn numeric_value(store: &CellStore, id: CellId) -> f64 {
    numeric_display(store, id).unwrap_or(0.0)
}
