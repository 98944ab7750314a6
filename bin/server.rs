// Eligibility Sync - Web Server
// Import trigger endpoint plus read-only record queries

use anyhow::{Context, Result};
use std::sync::Arc;

use eligibility_sync::auth::JwtVerifier;
use eligibility_sync::config::{init_tracing, ImportConfig};
use eligibility_sync::report::{ErrorReporter, TracingErrorTracker};
use eligibility_sync::server::{router, AppState};
use eligibility_sync::{ImportService, LocalObjectStore, RecordTypeRegistry, SqliteConnector};

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = ImportConfig::from_env()?;
    init_tracing(config.log_json);
    let (secret, allowed_email) = config.server_credentials()?;

    let connector = SqliteConnector::file(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?
        .with_actor("trigger_import");
    tracing::info!(database = ?config.database_path, "database opened");

    let import = ImportService::new(
        Arc::new(RecordTypeRegistry::builtin().context("Failed to build record types")?),
        Arc::new(connector),
        Arc::new(LocalObjectStore::new(&config.bucket_root)),
        Arc::new(JwtVerifier::new(secret, allowed_email)),
        Arc::new(TracingErrorTracker),
    )
    .with_options(config.sync_options())
    .with_reporter(ErrorReporter::new(config.report_examples));

    let app = router(AppState { import });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "server listening");

    axum::serve(listener, app).await.context("Server stopped")?;
    Ok(())
}
