//! Proof Service
//!
//! REST API for generating and verifying not-equal proofs

use anyhow::{Context, Result};
use starter_proof_service::{build_workflow, create_router, AppState, Config};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "starter_proof_service=debug,starter_workflow=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting Proof Service");
    info!("Chain mode: {:?}", config.chain_mode);
    info!("Busy policy: {:?}", config.busy_policy);

    let workflow = Arc::new(build_workflow(&config).await?);

    // A failed start is reported through the state endpoint; the reset
    // endpoint retries it
    if let Err(e) = workflow.initialize().await {
        warn!("Proving session failed to start: {}", e);
    }

    let app = create_router(AppState {
        workflow: workflow.clone(),
    });

    // Bind and serve
    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Proof Service running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    workflow.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
