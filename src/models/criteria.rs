//! Reusable scoring dimensions.

use serde::{Deserialize, Serialize};

/// A single evaluation dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub id: String,
    pub name: String,
    pub description: String,
    pub definition: String,
}

/// Payload for `POST /criteria`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaCreate {
    pub name: String,
    pub description: String,
    pub definition: String,
}

/// Payload for `PUT /criteria/:id`. Only the present fields change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriteriaUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl CriteriaUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.definition.is_none()
    }
}
