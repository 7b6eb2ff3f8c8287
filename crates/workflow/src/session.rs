//! Proving sessions.
//!
//! A session binds one backend to one circuit: it sizes the circuit, loads a
//! reference string of matching size and creates a composer, then serves any
//! number of prove/verify cycles until it is destroyed.

use starter_backend::{
    BackendError, CircuitSizes, ComposerHandle, ProvingBackend, SrsProvider, WitnessCodecError,
};
use starter_common::{ErrorKind, Proof};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::circuit::LoadedCircuit;
use crate::witness::Witness;

/// Initialization steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    CircuitSizes,
    FetchSrs,
    SlabAllocator,
    InitSrs,
    NewComposer,
    ProvingKey,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStep::CircuitSizes => "circuit sizing",
            InitStep::FetchSrs => "reference string fetch",
            InitStep::SlabAllocator => "slab allocator",
            InitStep::InitSrs => "reference string setup",
            InitStep::NewComposer => "composer creation",
            InitStep::ProvingKey => "proving key",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Backend initialization failed during {step}: {message}")]
    BackendInit { step: InitStep, message: String },

    #[error("Witness could not be decompressed: {0}")]
    Witness(#[from] WitnessCodecError),

    #[error("Proof generation failed: {0}")]
    Proving(BackendError),

    #[error("Local verification failed: {0}")]
    Verification(BackendError),

    #[error("No proof has been generated in this session")]
    NoProofGenerated,

    #[error("Session destroyed")]
    Destroyed,

    #[error("Backend teardown failed: {0}")]
    Teardown(BackendError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::BackendInit { .. } => ErrorKind::BackendInitError,
            SessionError::Witness(_) | SessionError::Proving(_) => ErrorKind::ProvingError,
            SessionError::Verification(_) | SessionError::NoProofGenerated => {
                ErrorKind::LocalVerificationError
            }
            SessionError::Destroyed => ErrorKind::SessionDestroyed,
            SessionError::Teardown(_) => ErrorKind::Internal,
        }
    }
}

/// A backend that has completed the sizing handshake for one circuit
pub(crate) struct Handshake {
    pub backend: Box<dyn ProvingBackend>,
    pub composer: ComposerHandle,
    pub sizes: CircuitSizes,
    pub subgroup_size: u32,
}

/// Size the circuit, load a matching reference string and create a composer.
///
/// Backend calls run on blocking workers. On failure the backend is destroyed
/// before the error is returned.
pub(crate) async fn handshake(
    backend: Box<dyn ProvingBackend>,
    circuit: &Arc<LoadedCircuit>,
    srs: &dyn SrsProvider,
) -> Result<Handshake, SessionError> {
    let sized = circuit.clone();
    let (backend, sizes) = init_step(backend, InitStep::CircuitSizes, move |b| {
        b.circuit_sizes(sized.bytecode())
    })
    .await?;

    let mut backend = backend;
    let subgroup_size = match sizes.total.checked_next_power_of_two() {
        Some(size) => size,
        None => {
            release(backend.as_mut());
            return Err(SessionError::BackendInit {
                step: InitStep::CircuitSizes,
                message: format!("circuit size {} has no power-of-two domain", sizes.total),
            });
        }
    };
    debug!(
        "Circuit sizes: exact={} total={} subgroup={}",
        sizes.exact, sizes.total, subgroup_size
    );

    let num_points = subgroup_size + 1;
    let crs = match srs.fetch(num_points).await {
        Ok(crs) => crs,
        Err(e) => {
            release(backend.as_mut());
            return Err(SessionError::BackendInit {
                step: InitStep::FetchSrs,
                message: e.to_string(),
            });
        }
    };
    let (g1_data, g2_data) = match (crs.g1_data(), crs.g2_data()) {
        (Ok(g1), Ok(g2)) => (g1, g2),
        (Err(e), _) | (_, Err(e)) => {
            release(backend.as_mut());
            return Err(SessionError::BackendInit {
                step: InitStep::FetchSrs,
                message: e.to_string(),
            });
        }
    };
    let fetched = crs.num_points();

    let (backend, ()) = init_step(backend, InitStep::SlabAllocator, move |b| {
        b.init_slab_allocator(subgroup_size)
    })
    .await?;
    let (backend, ()) = init_step(backend, InitStep::InitSrs, move |b| {
        b.init_srs(&g1_data, fetched, &g2_data)
    })
    .await?;
    let (backend, composer) = init_step(backend, InitStep::NewComposer, move |b| {
        b.new_composer(subgroup_size)
    })
    .await?;

    Ok(Handshake {
        backend,
        composer,
        sizes,
        subgroup_size,
    })
}

/// Run one backend call on a blocking worker and hand the backend back
pub(crate) async fn init_step<T, F>(
    backend: Box<dyn ProvingBackend>,
    step: InitStep,
    call: F,
) -> Result<(Box<dyn ProvingBackend>, T), SessionError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn ProvingBackend) -> Result<T, BackendError> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let mut backend = backend;
        let result = call(backend.as_mut());
        (backend, result)
    })
    .await;

    match joined {
        Ok((backend, Ok(value))) => Ok((backend, value)),
        Ok((mut backend, Err(e))) => {
            release(backend.as_mut());
            Err(SessionError::BackendInit {
                step,
                message: e.to_string(),
            })
        }
        Err(e) => Err(SessionError::BackendInit {
            step,
            message: format!("worker failed: {}", e),
        }),
    }
}

fn release(backend: &mut dyn ProvingBackend) {
    if let Err(e) = backend.destroy() {
        warn!("Failed to release backend after init failure: {}", e);
    }
}

pub struct ProvingSession {
    backend: Box<dyn ProvingBackend>,
    composer: ComposerHandle,
    circuit: Arc<LoadedCircuit>,
    sizes: CircuitSizes,
    subgroup_size: u32,
    proof_generated: bool,
    destroyed: bool,
}

impl ProvingSession {
    /// Bind `backend` to `circuit`.
    ///
    /// Runs sizing, reference string fetch, allocator setup, reference string
    /// setup and composer creation, in that order.
    pub async fn init(
        backend: Box<dyn ProvingBackend>,
        circuit: Arc<LoadedCircuit>,
        srs: &dyn SrsProvider,
    ) -> Result<Self, SessionError> {
        let Handshake {
            backend,
            composer,
            sizes,
            subgroup_size,
        } = handshake(backend, &circuit, srs).await?;

        info!(
            "Proving session ready: subgroup size {}, {}",
            subgroup_size, composer
        );
        Ok(Self {
            backend,
            composer,
            circuit,
            sizes,
            subgroup_size,
            proof_generated: false,
            destroyed: false,
        })
    }

    pub fn sizes(&self) -> CircuitSizes {
        self.sizes
    }

    pub fn subgroup_size(&self) -> u32 {
        self.subgroup_size
    }

    pub fn circuit(&self) -> &Arc<LoadedCircuit> {
        &self.circuit
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.destroyed {
            Err(SessionError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Prove the circuit for a compressed witness. Blocking.
    pub fn generate_proof(&mut self, witness: &Witness) -> Result<Proof, SessionError> {
        self.ensure_live()?;
        let raw = witness.decompress()?;
        let bytes = self
            .backend
            .create_proof(self.composer, self.circuit.bytecode(), &raw, false)
            .map_err(SessionError::Proving)?;
        self.proof_generated = true;
        Ok(Proof::new(bytes))
    }

    /// Check a proof against this session's verification key. Blocking.
    pub fn verify_proof(&mut self, proof: &Proof) -> Result<bool, SessionError> {
        self.ensure_live()?;
        if !self.proof_generated {
            return Err(SessionError::NoProofGenerated);
        }
        self.backend
            .init_proving_key(self.composer, self.circuit.bytecode())
            .map_err(SessionError::Verification)?;
        self.backend
            .verify_proof(self.composer, proof.as_bytes(), false)
            .map_err(SessionError::Verification)
    }

    /// Release the backend. Every later call fails with [`SessionError::Destroyed`].
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.destroyed = true;
        self.backend.destroy().map_err(SessionError::Teardown)?;
        debug!("Proving session destroyed");
        Ok(())
    }
}

impl Drop for ProvingSession {
    fn drop(&mut self) {
        if !self.destroyed {
            warn!("Proving session dropped without destroy, releasing backend");
            self.destroyed = true;
            if let Err(e) = self.backend.destroy() {
                warn!("Failed to release backend: {}", e);
            }
        }
    }
}

impl fmt::Debug for ProvingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvingSession")
            .field("composer", &self.composer)
            .field("sizes", &self.sizes)
            .field("subgroup_size", &self.subgroup_size)
            .field("proof_generated", &self.proof_generated)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
