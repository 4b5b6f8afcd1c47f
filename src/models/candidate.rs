//! Candidates and their uploaded materials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub name_normalized: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for `POST /candidates`. A candidate is always created inside a
/// decision kit and appended to the end of its list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateCreate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub decision_kit_id: String,
}

/// Payload for `PUT /candidates/:id`.
///
/// `decision_kit_id` narrows the name-uniqueness check to one kit; it never
/// moves the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateUpdate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_kit_id: Option<String>,
}

/// Metadata for an uploaded file. The bytes live in the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMaterial {
    pub id: String,
    pub candidate_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub blob_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMaterialList {
    pub items: Vec<CandidateMaterial>,
    pub total: usize,
}

impl From<Vec<CandidateMaterial>> for CandidateMaterialList {
    fn from(items: Vec<CandidateMaterial>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}
