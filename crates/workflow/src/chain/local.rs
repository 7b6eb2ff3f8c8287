//! In-process stand-in for a deployed verifier contract.

use async_trait::async_trait;
use starter_backend::{ComposerHandle, ProvingBackend, SrsProvider};
use starter_common::PUBLIC_INPUTS_LEN;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{ChainError, VerifierContract};
use crate::circuit::LoadedCircuit;
use crate::session::{handshake, init_step, InitStep, SessionError};

struct Deployment {
    backend: Box<dyn ProvingBackend>,
    composer: ComposerHandle,
}

impl Drop for Deployment {
    fn drop(&mut self) {
        if let Err(e) = self.backend.destroy() {
            warn!("Failed to release local verifier backend: {}", e);
        }
    }
}

/// Verifies with its own backend bound to the same circuit and reference
/// string as the prover, so it holds the same verification key.
#[derive(Clone)]
pub struct LocalVerifierContract {
    deployment: Arc<Mutex<Deployment>>,
}

impl LocalVerifierContract {
    pub async fn deploy(
        backend: Box<dyn ProvingBackend>,
        circuit: Arc<LoadedCircuit>,
        srs: &dyn SrsProvider,
    ) -> Result<Self, SessionError> {
        let ready = handshake(backend, &circuit, srs).await?;
        let composer = ready.composer;
        let keyed = circuit.clone();
        let (backend, ()) = init_step(ready.backend, InitStep::ProvingKey, move |b| {
            b.init_proving_key(composer, keyed.bytecode())
        })
        .await?;

        info!("Local verifier deployed for a circuit of size {}", ready.sizes.total);
        Ok(Self {
            deployment: Arc::new(Mutex::new(Deployment { backend, composer })),
        })
    }
}

#[async_trait]
impl VerifierContract for LocalVerifierContract {
    async fn verify(
        &self,
        proof_body: &[u8],
        public_inputs: &[[u8; PUBLIC_INPUTS_LEN]],
    ) -> Result<bool, ChainError> {
        let mut proof = Vec::with_capacity(public_inputs.len() * PUBLIC_INPUTS_LEN + proof_body.len());
        for input in public_inputs {
            proof.extend_from_slice(input);
        }
        proof.extend_from_slice(proof_body);

        let deployment = self.deployment.clone();
        tokio::task::spawn_blocking(move || {
            let mut deployment = deployment.blocking_lock();
            let composer = deployment.composer;
            deployment.backend.verify_proof(composer, &proof, false)
        })
        .await
        .map_err(|e| ChainError::Local(e.to_string()))?
        .map_err(|e| ChainError::Local(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainVerifierBridge;
    use crate::circuit::CircuitArtifact;
    use crate::session::ProvingSession;
    use crate::witness::WitnessBuilder;
    use starter_backend::{ArkBackend, DevSrsProvider};
    use starter_common::{Input, Proof};

    #[tokio::test]
    async fn test_local_contract_matches_prover() {
        let circuit = Arc::new(CircuitArtifact::bundled().unwrap().load().unwrap());
        let srs = DevSrsProvider::new(11);

        let mut session =
            ProvingSession::init(Box::new(ArkBackend::new(2).unwrap()), circuit.clone(), &srs)
                .await
                .unwrap();
        let witness = WitnessBuilder::new()
            .build(&circuit, &Input::from([3, 4]))
            .unwrap();
        let proof = session.generate_proof(&witness).unwrap();
        session.destroy().unwrap();

        let contract =
            LocalVerifierContract::deploy(Box::new(ArkBackend::new(1).unwrap()), circuit, &srs)
                .await
                .unwrap();
        let bridge = ChainVerifierBridge::new(Arc::new(contract));
        assert!(bridge.submit(&proof).await.unwrap());

        let mut forged = proof.into_bytes();
        forged[31] ^= 1;
        assert!(!bridge.submit(&Proof::new(forged)).await.unwrap());
    }
}
