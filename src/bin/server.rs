//! decision-kit HTTP server binary.
//!
//! # Environment Variables
//!
//! - `PORT`: HTTP port (default: 8000)
//! - `DATABASE_PATH`: SQLite file, `:memory:` allowed (default: `decision_kit.db`)
//! - `MATERIALS_DIR`: root directory for uploaded files (default: `materials`)
//! - `MAX_MATERIAL_BYTES`, `ALLOWED_MIME_PREFIXES`, `RUBRIC_WEIGHT_*`, `DEFAULT_RUBRIC_WEIGHT`,
//!   `ALLOW_ZERO_WEIGHT`, `MAX_RUBRIC_WEIGHT`: see `decision_kit::config`
//! - `RUST_LOG`: tracing filter (default: `info,decision_kit=debug`)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use decision_kit::blob::LocalBlobStore;
use decision_kit::server::{app_router, AppState};
use decision_kit::{Settings, Store, StubEvaluator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,decision_kit=debug".into()),
        )
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let blobs = Arc::new(LocalBlobStore::new(settings.materials_dir.clone()));
    let store = Store::open(&settings.database_path, settings.weights, blobs)
        .with_context(|| format!("failed to open database at {}", settings.database_path))?
        .with_max_material_bytes(settings.max_material_bytes)
        .with_allowed_mime_prefixes(settings.allowed_mime_prefixes.clone());
    let state = AppState::new(Arc::new(store), Arc::new(StubEvaluator));
    let app = app_router(state);

    let bind_addr = format!("0.0.0.0:{}", settings.port);
    tracing::info!(
        addr = %bind_addr,
        database = %settings.database_path,
        materials = %settings.materials_dir.display(),
        "decision-kit server starting"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    tracing::info!("decision-kit server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
