//! Runtime settings loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `PORT`: HTTP port (default: 8000)
//! - `DATABASE_PATH`: SQLite file, or `:memory:` (default: `decision_kit.db`)
//! - `MATERIALS_DIR`: root directory for uploaded candidate materials
//! - `MAX_MATERIAL_BYTES`: upload size cap (default: 10 MiB)
//! - `ALLOWED_MIME_PREFIXES`: comma-separated content-type prefixes accepted
//!   for uploads (default: PDF, DOCX, plain text)
//! - `ALLOW_ZERO_WEIGHT`: permit a criterion weight of 0 (default: false)
//! - `DEFAULT_RUBRIC_WEIGHT`: weight applied when omitted (default: 1.0)
//! - `MAX_RUBRIC_WEIGHT`: absolute sanity cap for a weight (default: 1e6)
//! - `RUBRIC_WEIGHT_MIN` / `RUBRIC_WEIGHT_MAX` / `RUBRIC_WEIGHT_STEP`:
//!   per-criterion bounds and step (defaults: 0.05 / 1.0 / 0.05)

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default port the API listens on.
pub const DEFAULT_PORT: u16 = 8000;
/// Default upload cap for a single material.
pub const DEFAULT_MAX_MATERIAL_BYTES: usize = 10 * 1024 * 1024;
/// Content-type prefixes accepted for uploaded materials.
pub const DEFAULT_ALLOWED_MIME_PREFIXES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];
/// Fallback API base for clients.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

const STEP_TOLERANCE: f64 = 1e-9;

/// Configuration errors raised while loading [`Settings`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Parse { name: &'static str, value: String },

    #[error("RUBRIC_WEIGHT_STEP must be > 0")]
    NonPositiveStep,

    #[error("RUBRIC_WEIGHT_MAX must be greater than RUBRIC_WEIGHT_MIN")]
    InvertedBounds,

    #[error("RUBRIC_WEIGHT_MIN must be > 0 unless ALLOW_ZERO_WEIGHT is true")]
    ZeroMinimum,

    #[error("DEFAULT_RUBRIC_WEIGHT must be between {min} and {max}")]
    DefaultOutOfRange { min: f64, max: f64 },

    #[error("DEFAULT_RUBRIC_WEIGHT must align to RUBRIC_WEIGHT_STEP={step}")]
    DefaultOffStep { step: f64 },
}

/// Per-criterion weight rules. Also served as-is on `GET /settings` so
/// clients can validate with the same bounds as the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightPolicy {
    pub rubric_weight_min: f64,
    pub rubric_weight_max: f64,
    pub rubric_weight_step: f64,
    pub default_rubric_weight: f64,
    pub allow_zero_weight: bool,
    pub max_rubric_weight: f64,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            rubric_weight_min: 0.05,
            rubric_weight_max: 1.0,
            rubric_weight_step: 0.05,
            default_rubric_weight: 1.0,
            allow_zero_weight: false,
            max_rubric_weight: 1_000_000.0,
        }
    }
}

impl WeightPolicy {
    /// Check the policy for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rubric_weight_step <= 0.0 {
            return Err(ConfigError::NonPositiveStep);
        }
        if self.rubric_weight_max <= self.rubric_weight_min {
            return Err(ConfigError::InvertedBounds);
        }
        if !self.allow_zero_weight && self.rubric_weight_min <= 0.0 {
            return Err(ConfigError::ZeroMinimum);
        }
        if self.default_rubric_weight < self.rubric_weight_min
            || self.default_rubric_weight > self.rubric_weight_max
        {
            return Err(ConfigError::DefaultOutOfRange {
                min: self.rubric_weight_min,
                max: self.rubric_weight_max,
            });
        }
        if !self.is_step_aligned(self.default_rubric_weight) {
            return Err(ConfigError::DefaultOffStep {
                step: self.rubric_weight_step,
            });
        }
        Ok(())
    }

    /// Whether `weight` is a whole multiple of the step (float tolerant).
    pub fn is_step_aligned(&self, weight: f64) -> bool {
        let n = (weight / self.rubric_weight_step).round();
        (weight - n * self.rubric_weight_step).abs() <= STEP_TOLERANCE
    }
}

/// Public subset of [`WeightPolicy`] served on `GET /settings`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightSettings {
    pub rubric_weight_min: f64,
    pub rubric_weight_max: f64,
    pub rubric_weight_step: f64,
    pub default_rubric_weight: f64,
    pub allow_zero_weight: bool,
}

impl From<WeightPolicy> for WeightSettings {
    fn from(policy: WeightPolicy) -> Self {
        Self {
            rubric_weight_min: policy.rubric_weight_min,
            rubric_weight_max: policy.rubric_weight_max,
            rubric_weight_step: policy.rubric_weight_step,
            default_rubric_weight: policy.default_rubric_weight,
            allow_zero_weight: policy.allow_zero_weight,
        }
    }
}

impl WeightSettings {
    /// Rebuild a full policy on the client side. The sanity cap is not
    /// published, so the default cap is assumed.
    pub fn to_policy(self) -> WeightPolicy {
        WeightPolicy {
            rubric_weight_min: self.rubric_weight_min,
            rubric_weight_max: self.rubric_weight_max,
            rubric_weight_step: self.rubric_weight_step,
            default_rubric_weight: self.default_rubric_weight,
            allow_zero_weight: self.allow_zero_weight,
            ..WeightPolicy::default()
        }
    }
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_path: String,
    pub materials_dir: PathBuf,
    pub max_material_bytes: usize,
    pub allowed_mime_prefixes: Vec<String>,
    pub weights: WeightPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: "decision_kit.db".to_string(),
            materials_dir: PathBuf::from("materials"),
            max_material_bytes: DEFAULT_MAX_MATERIAL_BYTES,
            allowed_mime_prefixes: default_mime_prefixes(),
            weights: WeightPolicy::default(),
        }
    }
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup. Missing keys fall back to the
    /// defaults; present but unparseable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let weight_defaults = WeightPolicy::default();

        let weights = WeightPolicy {
            rubric_weight_min: parse_or(&lookup, "RUBRIC_WEIGHT_MIN", weight_defaults.rubric_weight_min)?,
            rubric_weight_max: parse_or(&lookup, "RUBRIC_WEIGHT_MAX", weight_defaults.rubric_weight_max)?,
            rubric_weight_step: parse_or(&lookup, "RUBRIC_WEIGHT_STEP", weight_defaults.rubric_weight_step)?,
            default_rubric_weight: parse_or(
                &lookup,
                "DEFAULT_RUBRIC_WEIGHT",
                weight_defaults.default_rubric_weight,
            )?,
            allow_zero_weight: parse_bool_or(&lookup, "ALLOW_ZERO_WEIGHT", weight_defaults.allow_zero_weight)?,
            max_rubric_weight: parse_or(&lookup, "MAX_RUBRIC_WEIGHT", weight_defaults.max_rubric_weight)?,
        };
        weights.validate()?;

        Ok(Self {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            materials_dir: lookup("MATERIALS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.materials_dir),
            max_material_bytes: parse_or(&lookup, "MAX_MATERIAL_BYTES", defaults.max_material_bytes)?,
            allowed_mime_prefixes: lookup("ALLOWED_MIME_PREFIXES")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.allowed_mime_prefixes),
            weights,
        })
    }
}

pub fn default_mime_prefixes() -> Vec<String> {
    DEFAULT_ALLOWED_MIME_PREFIXES.iter().map(|p| p.to_string()).collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Parse {
            name,
            value: raw,
        }),
    }
}

fn parse_bool_or<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Parse { name, value: raw }),
        },
    }
}

/// Resolve the API base URL a client should talk to.
///
/// Priority: `DECISION_API_URL`, then `CRITERIA_API_URL`, then
/// [`DEFAULT_API_BASE`].
pub fn resolve_api_base() -> String {
    resolve_api_base_with(|key| std::env::var(key).ok())
}

pub fn resolve_api_base_with<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("DECISION_API_URL")
        .filter(|v| !v.trim().is_empty())
        .or_else(|| lookup("CRITERIA_API_URL").filter(|v| !v.trim().is_empty()))
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.max_material_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.weights, WeightPolicy::default());
        assert_eq!(settings.allowed_mime_prefixes.len(), 3);
        assert_eq!(settings.allowed_mime_prefixes[0], "application/pdf");
    }

    #[test]
    fn test_mime_prefixes_are_split_and_trimmed() {
        let settings = Settings::from_lookup(lookup_from(&[(
            "ALLOWED_MIME_PREFIXES",
            " image/ , text/plain,,",
        )]))
        .unwrap();
        assert_eq!(settings.allowed_mime_prefixes, vec!["image/", "text/plain"]);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("PORT", "9001"),
            ("DATABASE_PATH", ":memory:"),
            ("RUBRIC_WEIGHT_STEP", "0.1"),
            ("DEFAULT_RUBRIC_WEIGHT", "0.5"),
            ("ALLOW_ZERO_WEIGHT", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 9001);
        assert_eq!(settings.database_path, ":memory:");
        assert!(settings.weights.allow_zero_weight);
        assert!((settings.weights.rubric_weight_step - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = Settings::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Parse {
                name: "PORT",
                value: "eighty".to_string()
            }
        );
    }

    #[test]
    fn test_policy_rejects_bad_bounds() {
        let err = Settings::from_lookup(lookup_from(&[("RUBRIC_WEIGHT_STEP", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveStep);

        let err = Settings::from_lookup(lookup_from(&[
            ("RUBRIC_WEIGHT_MIN", "0.5"),
            ("RUBRIC_WEIGHT_MAX", "0.5"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::InvertedBounds);

        let err = Settings::from_lookup(lookup_from(&[("RUBRIC_WEIGHT_MIN", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroMinimum);
    }

    #[test]
    fn test_policy_rejects_bad_default() {
        let err =
            Settings::from_lookup(lookup_from(&[("DEFAULT_RUBRIC_WEIGHT", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultOutOfRange { .. }));

        let err =
            Settings::from_lookup(lookup_from(&[("DEFAULT_RUBRIC_WEIGHT", "0.33")])).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultOffStep { .. }));
    }

    #[test]
    fn test_step_alignment_is_float_tolerant() {
        let policy = WeightPolicy::default();
        assert!(policy.is_step_aligned(0.35));
        assert!(policy.is_step_aligned(0.7000000000000001));
        assert!(!policy.is_step_aligned(0.12));
    }

    #[test]
    fn test_resolve_api_base_priority() {
        assert_eq!(resolve_api_base_with(lookup_from(&[])), DEFAULT_API_BASE);
        assert_eq!(
            resolve_api_base_with(lookup_from(&[("CRITERIA_API_URL", "http://criteria:8000/")])),
            "http://criteria:8000"
        );
        assert_eq!(
            resolve_api_base_with(lookup_from(&[
                ("CRITERIA_API_URL", "http://criteria:8000"),
                ("DECISION_API_URL", "http://decisions:9000"),
            ])),
            "http://decisions:9000"
        );
    }

    #[test]
    fn test_weight_policy_wire_shape() {
        let json = serde_json::to_value(WeightPolicy::default()).unwrap();
        assert_eq!(json["rubricWeightMin"], 0.05);
        assert_eq!(json["rubricWeightStep"], 0.05);
        assert_eq!(json["allowZeroWeight"], false);
    }
}
