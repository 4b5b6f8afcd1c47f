//! Rubrics: named, weighted sets of criteria.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version stamped on every newly created rubric.
pub const INITIAL_RUBRIC_VERSION: &str = "1.0.0";

/// A criterion as stored on a rubric, enriched on read with the criterion's
/// own text when it is still present in the criteria table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricCriterionEntry {
    #[serde(alias = "criteria_id")]
    pub criteria_id: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl RubricCriterionEntry {
    pub fn new(criteria_id: impl Into<String>, weight: f64) -> Self {
        Self {
            criteria_id: criteria_id.into(),
            weight,
            name: None,
            description: None,
            definition: None,
        }
    }
}

/// A criterion reference as submitted by a client.
///
/// `criteria_id` may be omitted when `name` is given; the store then creates
/// the criterion inline. An omitted `weight` is defaulted on create and kept
/// from the stored entry on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricCriterionInput {
    #[serde(default, alias = "criteria_id", skip_serializing_if = "Option::is_none")]
    pub criteria_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl RubricCriterionInput {
    pub fn existing(criteria_id: impl Into<String>, weight: Option<f64>) -> Self {
        Self {
            criteria_id: Some(criteria_id.into()),
            weight,
            ..Default::default()
        }
    }
}

/// Rubric as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub criteria: Vec<RubricCriterionEntry>,
    pub version: String,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rubric {
    /// Sum of all criterion weights.
    pub fn total_weight(&self) -> f64 {
        self.criteria.iter().map(|c| c.weight).sum()
    }
}

/// Payload for `POST /rubrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCreate {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub criteria: Vec<RubricCriterionInput>,
}

/// Payload for `PUT /rubrics/:id`. The name is fixed after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<RubricCriterionInput>>,
}
