//! Read loosely shaped `individual_results` entries.
//!
//! Evaluators have used several layouts for per-criterion scores over time.
//! These helpers fold them into one [`CriterionScoreView`] list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{EvaluationResult, EvaluationResultSummary};

/// One criterion row ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScoreView {
    pub name: String,
    pub description: Option<String>,
    pub weight: Option<f64>,
    pub score: Option<f64>,
    pub reasoning: Option<String>,
}

/// Array fields tried in priority order.
const ARRAY_SOURCES: [&str; 3] = ["criteria_evaluations", "criteria", "criteria_results"];
const DERIVED_PREFIX: &str = "criteria_";

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
        .and_then(as_number)
}

/// `key_name` is the suffix of a derived `criteria_*` key. It ranks below an
/// explicit `criterion_name`/`criteria_name` and above `criteria_id`/`name`.
fn view(idx: usize, obj: &Map<String, Value>, key_name: Option<&str>) -> CriterionScoreView {
    let name = first_str(obj, &["criterion_name", "criteria_name"])
        .or_else(|| key_name.filter(|k| !k.is_empty()).map(str::to_string))
        .or_else(|| first_str(obj, &["criteria_id", "name"]))
        .unwrap_or_else(|| format!("#{}", idx + 1));
    CriterionScoreView {
        name,
        description: first_str(obj, &["criterion_description", "description"]),
        weight: first_number(obj, &["weight"]),
        score: first_number(obj, &["score", "overall_score"]),
        reasoning: first_str(obj, &["reasoning", "explanation", "explanation_text"]),
    }
}

/// Criterion rows of one individual result.
///
/// Sources in priority order: `criteria_evaluations`, `criteria`,
/// `criteria_results`, then every object-valued `criteria_*` key in the
/// order it appears in the document.
pub fn criteria_breakdown(individual: &Value) -> Vec<CriterionScoreView> {
    let Some(obj) = individual.as_object() else {
        return Vec::new();
    };

    for key in ARRAY_SOURCES {
        if let Some(items) = obj.get(key).and_then(Value::as_array) {
            if !items.is_empty() {
                return items
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, item)| item.as_object().map(|o| view(idx, o, None)))
                    .collect();
            }
        }
    }

    obj.iter()
        .filter_map(|(key, value)| {
            let suffix = key.strip_prefix(DERIVED_PREFIX)?;
            value.as_object().map(|o| (suffix, o))
        })
        .enumerate()
        .map(|(idx, (suffix, o))| view(idx, o, Some(suffix)))
        .collect()
}

/// The `individual_results` entry whose `candidate_id` matches.
pub fn find_individual_result<'a>(result: &'a EvaluationResult, candidate_id: &str) -> Option<&'a Value> {
    result
        .individual_results
        .iter()
        .find(|r| r.get("candidate_id").and_then(Value::as_str) == Some(candidate_id))
}

/// Criterion rows for one candidate of an evaluation, empty when the
/// evaluation holds nothing structured for it.
pub fn candidate_breakdown(result: &EvaluationResult, candidate_id: &str) -> Vec<CriterionScoreView> {
    find_individual_result(result, candidate_id)
        .map(criteria_breakdown)
        .unwrap_or_default()
}

/// Most recent summary by `created_at`. The first one wins a tie.
pub fn select_latest(summaries: &[EvaluationResultSummary]) -> Option<&EvaluationResultSummary> {
    summaries.iter().reduce(|best, s| if s.created_at > best.created_at { s } else { best })
}
