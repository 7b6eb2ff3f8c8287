//! The proving backend boundary.
//!
//! A backend is a stateful engine driven through a fixed handshake:
//! size the circuit, set up the allocator and reference string, create a
//! composer, then prove and verify with it. Calls are blocking and must be
//! made from a worker thread when used inside async code.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::program::ProgramError;

/// Sizes reported for a circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSizes {
    /// Gates as written in the program
    pub exact: u32,
    /// Size of the evaluation domain the prover needs
    pub total: u32,
    /// `total` rounded up to a power of two
    pub subgroup: u32,
}

/// Opaque reference to a composer created by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComposerHandle(u32);

impl ComposerHandle {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComposerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composer#{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Malformed program: {0}")]
    MalformedProgram(#[from] ProgramError),

    #[error("Invalid witness: {0}")]
    InvalidWitness(String),

    #[error("Constraints not satisfied: {0}")]
    UnsatisfiedConstraints(String),

    #[error("Slab allocator not initialized")]
    AllocatorNotInitialized,

    #[error("Invalid allocator size: {0}")]
    InvalidSize(u32),

    #[error("Reference string not initialized")]
    SrsNotInitialized,

    #[error("Reference string has {available} points, {required} required")]
    InsufficientSrs { required: u32, available: u32 },

    #[error("Malformed reference string: {0}")]
    MalformedSrs(String),

    #[error("Unknown composer: {0}")]
    UnknownComposer(ComposerHandle),

    #[error("Circuit needs {required} gates, composer holds {capacity}")]
    CircuitTooLarge { required: u32, capacity: u32 },

    #[error("Verification key not initialized for {0}")]
    MissingVerificationKey(ComposerHandle),

    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    #[error("Recursive proofs are not supported")]
    RecursionUnsupported,

    #[error("Constraint synthesis failed: {0}")]
    Synthesis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Backend destroyed")]
    Destroyed,
}

/// A stateful proving engine.
///
/// All calls after [`ProvingBackend::destroy`] fail with [`BackendError::Destroyed`].
pub trait ProvingBackend: Send {
    /// Report `[exact, total, subgroup]` sizes for a bytecode
    fn circuit_sizes(&mut self, bytecode: &[u8]) -> Result<CircuitSizes, BackendError>;

    fn init_slab_allocator(&mut self, subgroup_size: u32) -> Result<(), BackendError>;

    /// Install `num_points` uncompressed G1 points and the G2 point
    fn init_srs(
        &mut self,
        g1_data: &[u8],
        num_points: u32,
        g2_data: &[u8],
    ) -> Result<(), BackendError>;

    fn new_composer(&mut self, size_hint: u32) -> Result<ComposerHandle, BackendError>;

    /// Prove `bytecode` against a serialized (uncompressed) witness map
    fn create_proof(
        &mut self,
        composer: ComposerHandle,
        bytecode: &[u8],
        witness: &[u8],
        is_recursive: bool,
    ) -> Result<Vec<u8>, BackendError>;

    /// Derive the proving and verification keys for `bytecode`
    fn init_proving_key(
        &mut self,
        composer: ComposerHandle,
        bytecode: &[u8],
    ) -> Result<(), BackendError>;

    fn verify_proof(
        &mut self,
        composer: ComposerHandle,
        proof: &[u8],
        is_recursive: bool,
    ) -> Result<bool, BackendError>;

    /// Release every resource held by the backend
    fn destroy(&mut self) -> Result<(), BackendError>;
}

/// Creates fresh backend instances, one per session
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn ProvingBackend>, BackendError>;
}
