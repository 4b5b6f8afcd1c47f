//! Input validation shared by the server and by client-side drafts.
//!
//! Server-side checks return [`Error::Validation`] with a stable code.
//! Draft checks collect every problem as a [`FieldError`] so a form can show
//! them all at once.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::WeightPolicy;
use crate::error::{Error, Result, ValidationCode};
use crate::models::RubricCriterionEntry;

/// Tolerance for the sum-to-one rule.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
/// Upper bound on a decision kit description.
pub const KIT_DESCRIPTION_MAX: usize = 1000;

static RUBRIC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 _-]+$").expect("static regex"));
static CANDIDATE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 _.-]+$").expect("static regex"));

/// Key used for case-insensitive uniqueness.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn check_name(name: &str, min: usize, max: usize, pattern: &Regex) -> Result<()> {
    let len = name.chars().count();
    if len < min || len > max {
        return Err(Error::validation(
            ValidationCode::InvalidName,
            format!("name length {}-{} required", min, max),
        ));
    }
    if !pattern.is_match(name) {
        return Err(Error::validation(
            ValidationCode::InvalidName,
            "invalid characters in name",
        ));
    }
    Ok(())
}

pub fn validate_rubric_name(name: &str) -> Result<()> {
    check_name(name, 3, 60, &RUBRIC_NAME_RE)
}

/// Decision kits share the rubric naming rules.
pub fn validate_kit_name(name: &str) -> Result<()> {
    check_name(name, 3, 60, &RUBRIC_NAME_RE)
}

pub fn validate_kit_description(description: Option<&str>) -> Result<()> {
    match description {
        Some(d) if d.chars().count() > KIT_DESCRIPTION_MAX => Err(Error::validation(
            ValidationCode::InvalidField,
            format!("description max length {}", KIT_DESCRIPTION_MAX),
        )),
        _ => Ok(()),
    }
}

pub fn validate_candidate_name(name: &str) -> Result<()> {
    check_name(name, 2, 80, &CANDIDATE_NAME_RE)
}

/// Check one weight against the policy.
pub fn validate_weight(policy: &WeightPolicy, weight: f64) -> Result<()> {
    if !weight.is_finite() {
        return Err(Error::validation(
            ValidationCode::InvalidWeight,
            "weight must be a finite number",
        ));
    }
    if weight > policy.max_rubric_weight {
        return Err(Error::validation(
            ValidationCode::WeightTooLarge,
            format!("weight must not exceed {}", policy.max_rubric_weight),
        ));
    }
    if weight == 0.0 && !policy.allow_zero_weight {
        return Err(Error::validation(
            ValidationCode::InvalidWeight,
            "zero weight is not allowed",
        ));
    }
    if weight == 0.0 {
        return Ok(());
    }
    let in_range = weight >= policy.rubric_weight_min && weight <= policy.rubric_weight_max;
    if weight < 0.0 || !in_range || !policy.is_step_aligned(weight) {
        return Err(Error::validation(
            ValidationCode::InvalidWeight,
            format!(
                "weight must be between {} and {} in {} increments",
                policy.rubric_weight_min, policy.rubric_weight_max, policy.rubric_weight_step
            ),
        ));
    }
    Ok(())
}

/// Per-entry weight checks followed by the duplicate-id check.
pub fn validate_entry_weights(policy: &WeightPolicy, entries: &[RubricCriterionEntry]) -> Result<()> {
    for entry in entries {
        validate_weight(policy, entry.weight)?;
    }
    validate_unique_ids(entries.iter().map(|e| e.criteria_id.as_str()))
}

pub fn validate_unique_ids<'a, I>(ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(Error::validation(
                ValidationCode::DuplicateCriteria,
                format!("duplicate criteria id '{}'", id),
            ));
        }
    }
    Ok(())
}

/// Non-empty rubrics must carry weights that add up to 1.
pub fn validate_weight_sum(entries: &[RubricCriterionEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let total: f64 = entries.iter().map(|e| e.weight).sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::validation(
            ValidationCode::InvalidWeightSum,
            format!("Weights must sum to 1. Current total: {:.2}", total),
        ));
    }
    Ok(())
}

/// Weight to store for a submitted entry.
///
/// An explicit weight wins. Otherwise the weight already stored for the same
/// criterion is kept, and a brand new criterion gets the policy default.
pub fn resolve_weight(
    policy: &WeightPolicy,
    submitted: Option<f64>,
    criteria_id: &str,
    existing: &[RubricCriterionEntry],
) -> f64 {
    submitted
        .or_else(|| {
            existing
                .iter()
                .find(|e| e.criteria_id == criteria_id)
                .map(|e| e.weight)
        })
        .unwrap_or(policy.default_rubric_weight)
}

// ---------------------------------------------------------------------------
// Form drafts
// ---------------------------------------------------------------------------

/// A single problem with a draft, keyed by the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One row of a rubric form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftCriterion {
    pub criteria_id: Option<String>,
    pub name: String,
    pub weight: Option<f64>,
}

/// Rubric form state prior to submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricDraft {
    pub name: String,
    pub description: String,
    pub criteria: Vec<DraftCriterion>,
}

impl RubricDraft {
    /// Every reason the draft cannot be submitted yet. Empty means valid.
    pub fn validate(&self, policy: &WeightPolicy) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required."));
        } else if let Err(e) = validate_rubric_name(self.name.trim()) {
            errors.push(FieldError::new("name", message_of(&e)));
        }
        if self.description.trim().is_empty() {
            errors.push(FieldError::new("description", "Description is required."));
        }
        if self.criteria.is_empty() {
            errors.push(FieldError::new("criteria", "Please add at least one criterion."));
            return errors;
        }

        let weights: Vec<f64> = self.criteria.iter().filter_map(|c| c.weight).collect();
        if weights.len() != self.criteria.len() {
            errors.push(FieldError::new("criteria", "Please enter a weight for each criterion."));
            return errors;
        }

        for (idx, weight) in weights.iter().enumerate() {
            if let Err(e) = validate_weight(policy, *weight) {
                errors.push(FieldError::new(format!("criteria[{}].weight", idx), message_of(&e)));
            }
        }

        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            errors.push(FieldError::new(
                "criteria",
                format!("Weights must sum to 1. Current total: {:.2}", total),
            ));
        }
        errors
    }

    /// Rows as API input. Blank ids become inline-creation requests.
    pub fn to_inputs(&self) -> Vec<crate::models::RubricCriterionInput> {
        self.criteria
            .iter()
            .map(|c| crate::models::RubricCriterionInput {
                criteria_id: c.criteria_id.clone().filter(|id| !id.trim().is_empty()),
                weight: c.weight,
                name: Some(c.name.clone()),
                ..Default::default()
            })
            .collect()
    }
}

/// Decision kit form state prior to submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionKitDraft {
    pub name: String,
    pub description: String,
    pub rubric_id: String,
}

impl DecisionKitDraft {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let name = self.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        } else if let Err(e) = validate_kit_name(name) {
            errors.push(FieldError::new("name", message_of(&e)));
        }
        if let Err(e) = validate_kit_description(Some(&self.description)) {
            errors.push(FieldError::new("description", message_of(&e)));
        }
        if self.rubric_id.trim().is_empty() {
            errors.push(FieldError::new("rubricId", "Please select a rubric."));
        }
        errors
    }
}

fn message_of(err: &Error) -> String {
    match err {
        Error::Validation { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(result: Result<()>) -> ValidationCode {
        match result {
            Err(Error::Validation { code, .. }) => code,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    fn entries(weights: &[f64]) -> Vec<RubricCriterionEntry> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| RubricCriterionEntry::new(format!("c{}", i), *w))
            .collect()
    }

    #[test]
    fn test_names() {
        assert!(validate_rubric_name("Web Quality-Rubric_2").is_ok());
        assert_eq!(code_of(validate_rubric_name("ab")), ValidationCode::InvalidName);
        assert_eq!(code_of(validate_rubric_name("bad/name")), ValidationCode::InvalidName);
        assert_eq!(code_of(validate_rubric_name(&"x".repeat(61))), ValidationCode::InvalidName);

        assert!(validate_candidate_name("J. Doe-2").is_ok());
        assert!(validate_candidate_name("Al").is_ok());
        assert_eq!(code_of(validate_candidate_name("A")), ValidationCode::InvalidName);
        assert_eq!(code_of(validate_candidate_name("Zoë")), ValidationCode::InvalidName);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Vendor Review "), "vendor review");
    }

    #[test]
    fn test_weight_bounds_and_step() {
        let policy = WeightPolicy::default();
        assert!(validate_weight(&policy, 0.05).is_ok());
        assert!(validate_weight(&policy, 1.0).is_ok());
        assert!(validate_weight(&policy, 0.35).is_ok());
        assert_eq!(code_of(validate_weight(&policy, 0.04)), ValidationCode::InvalidWeight);
        assert_eq!(code_of(validate_weight(&policy, 1.05)), ValidationCode::InvalidWeight);
        assert_eq!(code_of(validate_weight(&policy, 0.12)), ValidationCode::InvalidWeight);
        assert_eq!(code_of(validate_weight(&policy, 0.0)), ValidationCode::InvalidWeight);
        assert_eq!(code_of(validate_weight(&policy, -0.5)), ValidationCode::InvalidWeight);
        assert_eq!(
            code_of(validate_weight(&policy, 1_000_001.0)),
            ValidationCode::WeightTooLarge
        );
    }

    #[test]
    fn test_zero_weight_when_allowed() {
        let policy = WeightPolicy {
            allow_zero_weight: true,
            ..WeightPolicy::default()
        };
        assert!(validate_weight(&policy, 0.0).is_ok());
    }

    #[test]
    fn test_duplicates_and_sum() {
        let policy = WeightPolicy::default();
        let mut dup = entries(&[0.5, 0.5]);
        dup[1].criteria_id = dup[0].criteria_id.clone();
        assert_eq!(
            code_of(validate_entry_weights(&policy, &dup)),
            ValidationCode::DuplicateCriteria
        );

        assert!(validate_weight_sum(&entries(&[0.4, 0.6])).is_ok());
        assert!(validate_weight_sum(&entries(&[0.1, 0.2, 0.7])).is_ok());
        assert!(validate_weight_sum(&[]).is_ok());
        assert_eq!(
            code_of(validate_weight_sum(&entries(&[0.4, 0.5]))),
            ValidationCode::InvalidWeightSum
        );
    }

    #[test]
    fn test_resolve_weight_prefers_submitted_then_existing() {
        let policy = WeightPolicy::default();
        let existing = vec![RubricCriterionEntry::new("keep", 0.35)];
        assert_eq!(resolve_weight(&policy, Some(0.5), "keep", &existing), 0.5);
        assert_eq!(resolve_weight(&policy, None, "keep", &existing), 0.35);
        assert_eq!(resolve_weight(&policy, None, "new", &existing), 1.0);
    }

    #[test]
    fn test_rubric_draft_reports_all_problems() {
        let policy = WeightPolicy::default();
        let empty = RubricDraft::default();
        let fields: Vec<_> = empty.validate(&policy).into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "description", "criteria"]);

        let missing_weight = RubricDraft {
            name: "Quality".into(),
            description: "d".into(),
            criteria: vec![
                DraftCriterion { name: "A".into(), weight: Some(0.5), ..Default::default() },
                DraftCriterion { name: "B".into(), weight: None, ..Default::default() },
            ],
        };
        let errors = missing_weight.validate(&policy);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Please enter a weight for each criterion.");

        let bad_sum = RubricDraft {
            criteria: vec![
                DraftCriterion { name: "A".into(), weight: Some(0.4), ..Default::default() },
                DraftCriterion { name: "B".into(), weight: Some(0.5), ..Default::default() },
            ],
            ..missing_weight.clone()
        };
        let errors = bad_sum.validate(&policy);
        assert_eq!(errors[0].message, "Weights must sum to 1. Current total: 0.90");
    }

    #[test]
    fn test_rubric_draft_valid_and_inputs() {
        let draft = RubricDraft {
            name: "Quality".into(),
            description: "d".into(),
            criteria: vec![
                DraftCriterion { criteria_id: Some("c1".into()), name: "A".into(), weight: Some(0.45) },
                DraftCriterion { criteria_id: Some(" ".into()), name: "B".into(), weight: Some(0.55) },
            ],
        };
        assert!(draft.validate(&WeightPolicy::default()).is_empty());
        let inputs = draft.to_inputs();
        assert_eq!(inputs[0].criteria_id.as_deref(), Some("c1"));
        assert!(inputs[1].criteria_id.is_none());
        assert_eq!(inputs[1].name.as_deref(), Some("B"));
    }

    #[test]
    fn test_kit_draft() {
        let draft = DecisionKitDraft {
            name: " ".into(),
            description: "x".repeat(KIT_DESCRIPTION_MAX + 1),
            rubric_id: String::new(),
        };
        let fields: Vec<_> = draft.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "description", "rubricId"]);

        let ok = DecisionKitDraft {
            name: "Q3 Vendors".into(),
            description: String::new(),
            rubric_id: "r1".into(),
        };
        assert!(ok.validate().is_empty());
    }
}
