//! # decision-kit
//!
//! Decision kits group candidates under a rubric of weighted criteria and
//! record how each candidate scored.
//!
//! The crate has two halves that share [`models`] and [`validation`]:
//!
//! - the service: [`store`] (SQLite), [`blob`] (uploaded materials),
//!   [`evaluation`] (scoring and batch comparison) and [`server`] (axum);
//! - the client: [`client`], a typed reqwest wrapper with entity caches and
//!   local list helpers.

pub mod blob;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod server;
pub mod store;
pub mod validation;

pub use client::{AgentClient, ApiClient, ClientError};
pub use config::{Settings, WeightPolicy, WeightSettings};
pub use error::{Error, Result};
pub use evaluation::{EvaluationService, Evaluator, RankingStrategy, StubEvaluator};
pub use store::Store;

/// Crate version, reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
