//! API handlers for the proof service

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use starter_common::ErrorKind;
use starter_workflow::{ProofWorkflow, WorkflowError, WorkflowSnapshot};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{InputRequest, InputResponse, ProveRequest, ProveResponse};

/// Shared application state
pub struct AppState {
    pub workflow: Arc<ProofWorkflow>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "kind": self.kind,
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = match &err {
            WorkflowError::SessionBusy => StatusCode::CONFLICT,
            WorkflowError::SessionUnavailable | WorkflowError::SessionDestroyed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            WorkflowError::Init(_) | WorkflowError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "starter-proof-service"
    }))
}

/// Current workflow snapshot
pub async fn state_handler(State(state): State<Arc<AppState>>) -> Json<WorkflowSnapshot> {
    Json(state.workflow.snapshot())
}

/// Store new input text
pub async fn input_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InputRequest>,
) -> Json<InputResponse> {
    let input = state.workflow.handle_input(&payload.value);
    Json(InputResponse {
        valid: !input.is_empty(),
        input,
    })
}

/// Run a proof attempt on the current (or supplied) input
pub async fn prove_handler(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<ProveRequest>>,
) -> Result<Json<ProveResponse>, ApiError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    if let Some(value) = &request.value {
        state.workflow.handle_input(value);
    }

    info!("Proof requested for input {}", state.workflow.input());
    let outcome = state.workflow.calculate_proof().await.map_err(|e| {
        warn!("Proof request refused: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(ProveResponse::new(outcome, state.workflow.snapshot())))
}

/// Replace the proving session
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WorkflowSnapshot>, ApiError> {
    info!("Resetting proving session");
    state.workflow.reset_session().await?;
    Ok(Json(state.workflow.snapshot()))
}
