//! Observable workflow state and events.

use serde::{Deserialize, Serialize};
use starter_backend::CircuitSizes;
use starter_common::{ErrorKind, Input};
use std::fmt;

/// Why an attempt or initialization failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Initializing,
    AwaitingInput,
    ProvingInFlight,
    LocalVerifying,
    LocalVerified,
    ChainVerifying,
    Verified,
    Failed(FailureReport),
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Verified | WorkflowState::Failed(_))
    }
}

/// Everything a presentation layer needs to render the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub input: Input,
    /// Session initialization or proof generation in progress
    pub pending: bool,
    /// Chain verification in progress
    pub chain_pending: bool,
    pub local_verification: Option<bool>,
    /// Final on-chain verdict of the latest attempt
    pub verification: Option<bool>,
    /// Hex encoding of the latest proof
    pub proof: Option<String>,
    pub generation: u64,
    pub session_live: bool,
}

impl Default for WorkflowSnapshot {
    fn default() -> Self {
        Self {
            state: WorkflowState::Idle,
            input: Input::empty(),
            pending: false,
            chain_pending: false,
            local_verification: None,
            verification: None,
            proof: None,
            generation: 0,
            session_live: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    SessionInitialized {
        sizes: CircuitSizes,
        subgroup_size: u32,
    },
    ProofGenerationStarted {
        generation: u64,
        input: Input,
    },
    ProofGenerationFailed {
        generation: u64,
        report: FailureReport,
    },
    ProofGenerated {
        generation: u64,
        proof: String,
    },
    LocalVerificationResult {
        generation: u64,
        verified: bool,
        error: Option<FailureReport>,
    },
    ChainVerificationResult {
        generation: u64,
        verified: bool,
        error: Option<FailureReport>,
    },
    SessionDestroyed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(WorkflowState::AwaitingInput).unwrap();
        assert_eq!(json, serde_json::json!({"state": "awaiting_input"}));

        let failed = WorkflowState::Failed(FailureReport::new(
            ErrorKind::OnChainRejection,
            "on-chain rejection",
        ));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"]["kind"], "on_chain_rejection");
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_event_tagging() {
        let event = WorkflowEvent::ProofGenerationStarted {
            generation: 3,
            input: Input::from([3, 4]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "proof_generation_started");
        assert_eq!(json["input"], serde_json::json!([3, 4]));
    }
}
