//! Data models for the proof service

use serde::{Deserialize, Serialize};
use starter_common::Input;
use starter_workflow::{AttemptOutcome, FailureReport, WorkflowSnapshot};

/// Raw text of the input field
#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct InputResponse {
    /// Parsed input, empty when the text was malformed
    pub input: Input,
    pub valid: bool,
}

/// Request to run a proof attempt
#[derive(Debug, Default, Deserialize)]
pub struct ProveRequest {
    /// Input text to store first; the current input is used when absent
    #[serde(default)]
    pub value: Option<String>,
}

/// Result of a proof attempt
#[derive(Debug, Serialize)]
pub struct ProveResponse {
    /// Whether the proof was verified on-chain
    pub success: bool,

    /// `verified`, `failed`, `superseded` or `invalid_input`
    pub outcome: &'static str,

    /// Verified proof (hex-encoded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,

    /// Workflow state after the attempt
    pub state: WorkflowSnapshot,
}

impl ProveResponse {
    pub fn new(outcome: AttemptOutcome, state: WorkflowSnapshot) -> Self {
        let (success, label, proof, error) = match outcome {
            AttemptOutcome::Verified(proof) => (true, "verified", Some(proof.to_hex()), None),
            AttemptOutcome::Failed(report) => (false, "failed", None, Some(report)),
            AttemptOutcome::Superseded => (false, "superseded", None, None),
            AttemptOutcome::InvalidInput => (false, "invalid_input", None, None),
        };
        Self {
            success,
            outcome: label,
            proof,
            error,
            state,
        }
    }
}
