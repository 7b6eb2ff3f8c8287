//! Proof Service
//!
//! Serves the not-equal proof workflow over HTTP: a UI stores its input,
//! requests proofs and polls the workflow state.

pub mod config;
pub mod handlers;
pub mod models;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use starter_backend::{
    ArkBackend, ArkBackendFactory, DevSrsProvider, FileSrsProvider, SrsProvider,
};
use starter_workflow::{
    CircuitArtifact, EthCallVerifier, LocalVerifierContract, ProofWorkflow, VerifierContract,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::{ChainMode, Config};
pub use handlers::AppState;
pub use models::{InputRequest, InputResponse, ProveRequest, ProveResponse};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/state", get(handlers::state_handler))
        .route("/api/input", post(handlers::input_handler))
        .route("/api/prove", post(handlers::prove_handler))
        .route("/api/session/reset", post(handlers::reset_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Assemble the workflow described by `config`. The session is not started.
pub async fn build_workflow(config: &Config) -> Result<ProofWorkflow> {
    let artifact = match &config.circuit_path {
        Some(path) => {
            info!("Loading circuit artifact from {}", path.display());
            CircuitArtifact::from_file(path)
                .await
                .context("Failed to read circuit artifact")?
        }
        None => CircuitArtifact::bundled().context("Bundled circuit is invalid")?,
    };

    let srs: Arc<dyn SrsProvider> = match &config.srs_path {
        Some(path) => Arc::new(FileSrsProvider::new(path.clone())),
        None => {
            warn!(
                "Using a development reference string (seed {}); not for production",
                config.srs_seed
            );
            Arc::new(DevSrsProvider::new(config.srs_seed))
        }
    };

    let chain: Arc<dyn VerifierContract> = match config.chain_mode {
        ChainMode::Local => {
            info!("Deploying in-process verifier");
            let circuit = Arc::new(artifact.load().context("Failed to decode circuit")?);
            let backend =
                ArkBackend::new(config.backend_threads).context("Failed to start backend")?;
            let contract = LocalVerifierContract::deploy(Box::new(backend), circuit, srs.as_ref())
                .await
                .context("Failed to deploy local verifier")?;
            Arc::new(contract)
        }
        ChainMode::Rpc => {
            let address = config
                .verifier_address
                .as_deref()
                .context("VERIFIER_ADDRESS is required when CHAIN_MODE=rpc")?;
            info!("Verifier contract {} via {}", address, config.chain_rpc_url);
            Arc::new(
                EthCallVerifier::new(config.chain_rpc_url.clone(), address)
                    .context("Invalid verifier address")?,
            )
        }
    };

    Ok(ProofWorkflow::new(
        artifact,
        Arc::new(ArkBackendFactory::new(config.backend_threads)),
        srs,
        chain,
        config.busy_policy,
    ))
}
