//! Proof workflow for the bundled `x != y` circuit.
//!
//! The pieces, leaves first:
//!
//! - [`circuit`] decodes the compressed circuit artifact
//! - [`witness`] turns user inputs into a solved, compressed witness
//! - [`session`] drives a [`starter_backend::ProvingBackend`] through setup,
//!   proving, verification and teardown
//! - [`chain`] submits proofs to a verifier contract
//! - [`orchestrator`] sequences all of the above and publishes state

pub mod chain;
pub mod circuit;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod witness;

pub use chain::{
    ChainError, ChainVerifierBridge, EthCallVerifier, LocalVerifierContract, VerifierContract,
};
pub use circuit::{CircuitArtifact, CircuitError, LoadedCircuit};
pub use error::WorkflowError;
pub use events::{FailureReport, WorkflowEvent, WorkflowSnapshot, WorkflowState};
pub use orchestrator::{AttemptOutcome, BusyPolicy, ProofWorkflow};
pub use session::{InitStep, ProvingSession, SessionError};
pub use witness::{Witness, WitnessBuilder, WitnessError};
