//! SQLite persistence for criteria, rubrics, decision kits, candidates,
//! materials and evaluation results.
//!
//! A single [`Connection`] sits behind a mutex. Every method is blocking;
//! async callers go through `tokio::task::spawn_blocking`.

mod candidates;
mod criteria;
mod decision_kits;
mod evaluations;
mod materials;
mod rubrics;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::Connection;
use serde::de::DeserializeOwned;

use crate::blob::BlobStore;
use crate::config::{default_mime_prefixes, WeightPolicy, DEFAULT_MAX_MATERIAL_BYTES};
use crate::error::{Error, Result};

pub use evaluations::{DEFAULT_LIST_LIMIT, MAX_OVERALL_SCORE, MIN_OVERALL_SCORE};
pub use materials::NewMaterial;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS criteria (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    definition TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rubrics (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    name_normalized TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    criteria_json TEXT NOT NULL,
    version TEXT NOT NULL,
    published INTEGER NOT NULL DEFAULT 0,
    published_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decision_kits (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    name_normalized TEXT NOT NULL UNIQUE,
    description TEXT,
    rubric_id TEXT NOT NULL REFERENCES rubrics(id),
    rubric_version TEXT NOT NULL,
    rubric_published INTEGER NOT NULL,
    status TEXT NOT NULL,
    evaluation_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS candidates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    name_normalized TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decision_kit_candidates (
    id TEXT PRIMARY KEY,
    decision_kit_id TEXT NOT NULL REFERENCES decision_kits(id) ON DELETE CASCADE,
    candidate_id TEXT NOT NULL REFERENCES candidates(id) ON DELETE CASCADE,
    candidate_name TEXT NOT NULL,
    position INTEGER NOT NULL,
    UNIQUE (decision_kit_id, candidate_id)
);

CREATE INDEX IF NOT EXISTS idx_dkc_kit ON decision_kit_candidates(decision_kit_id, position);
CREATE INDEX IF NOT EXISTS idx_dkc_candidate ON decision_kit_candidates(candidate_id);

CREATE TABLE IF NOT EXISTS candidate_materials (
    id TEXT PRIMARY KEY,
    candidate_id TEXT NOT NULL REFERENCES candidates(id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    blob_path TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_materials_candidate ON candidate_materials(candidate_id);

CREATE TABLE IF NOT EXISTS evaluation_results (
    id TEXT PRIMARY KEY,
    rubric_id TEXT NOT NULL,
    overall_score REAL NOT NULL,
    rubric_name TEXT NOT NULL,
    total_candidates INTEGER NOT NULL,
    is_batch INTEGER NOT NULL,
    individual_results TEXT NOT NULL,
    comparison_summary TEXT,
    evaluation_metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_evaluations_rubric ON evaluation_results(rubric_id);

CREATE TABLE IF NOT EXISTS evaluation_candidates (
    id TEXT PRIMARY KEY,
    evaluation_id TEXT NOT NULL REFERENCES evaluation_results(id) ON DELETE CASCADE,
    candidate_id TEXT NOT NULL REFERENCES candidates(id) ON DELETE CASCADE,
    candidate_score REAL NOT NULL,
    rank INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_eval_candidates_candidate ON evaluation_candidates(candidate_id);
";

/// Persistent state of the service.
pub struct Store {
    conn: Mutex<Connection>,
    policy: WeightPolicy,
    max_material_bytes: usize,
    allowed_mime_prefixes: Vec<String>,
    blobs: Arc<dyn BlobStore>,
}

impl Store {
    /// Open (or create) the database at `path`. `:memory:` is accepted.
    pub fn open(path: &str, policy: WeightPolicy, blobs: Arc<dyn BlobStore>) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(crate::blob::BlobError::from)?;
                }
            }
            Connection::open(path)?
        };
        Self::from_connection(conn, policy, blobs)
    }

    /// Fresh in-memory database with the default weight policy.
    pub fn in_memory(blobs: Arc<dyn BlobStore>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, WeightPolicy::default(), blobs)
    }

    fn from_connection(
        conn: Connection,
        policy: WeightPolicy,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("database schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
            max_material_bytes: DEFAULT_MAX_MATERIAL_BYTES,
            allowed_mime_prefixes: default_mime_prefixes(),
            blobs,
        })
    }

    pub fn with_max_material_bytes(mut self, max: usize) -> Self {
        self.max_material_bytes = max;
        self
    }

    /// Content-type prefixes accepted for uploads. An empty list accepts
    /// every type.
    pub fn with_allowed_mime_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.allowed_mime_prefixes = prefixes;
        self
    }

    pub fn with_policy(mut self, policy: WeightPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &WeightPolicy {
        &self.policy
    }

    pub fn max_material_bytes(&self) -> usize {
        self.max_material_bytes
    }

    pub fn allowed_mime_prefixes(&self) -> &[String] {
        &self.allowed_mime_prefixes
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

/// Run `f` against the store on the blocking thread pool.
pub async fn blocking<T, F>(store: &Arc<Store>, f: F) -> Result<T>
where
    F: FnOnce(&Store) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {}", e)))?
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
