//! Decision kits: one evaluation workflow over a set of candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a decision kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKitStatus {
    /// Candidates and rubric may still change.
    Open,
    /// An evaluation has been recorded; the kit is locked.
    Evaluated,
}

impl DecisionKitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Evaluated => "EVALUATED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OPEN" => Some(Self::Open),
            "EVALUATED" => Some(Self::Evaluated),
            _ => None,
        }
    }
}

/// A candidate's slot within a kit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionKitCandidateRef {
    pub id: String,
    pub candidate_id: String,
    pub candidate_name: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionKit {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub rubric_id: String,
    pub rubric_version: String,
    pub rubric_published: bool,
    pub status: DecisionKitStatus,
    #[serde(default)]
    pub evaluation_id: Option<String>,
    #[serde(default)]
    pub candidates: Vec<DecisionKitCandidateRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DecisionKit {
    pub fn is_open(&self) -> bool {
        self.status == DecisionKitStatus::Open
    }

    /// Candidate ids in kit order.
    pub fn candidate_ids(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.candidate_id.clone()).collect()
    }
}

/// Payload for `POST /decision-kits`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionKitCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rubric_id: String,
    #[serde(default)]
    pub candidate_ids: Vec<String>,
}

/// Payload for `PUT /decision-kits/:id/candidates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionKitUpdateCandidates {
    pub candidate_ids: Vec<String>,
}

/// Payload for `PUT /decision-kits/:id/rubric`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRubric {
    pub rubric_id: String,
}
