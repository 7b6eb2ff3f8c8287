//! On-chain verification.
//!
//! The verifier contract exposes `verify(bytes proof, bytes32[] publicInputs)`
//! as a view function. The bridge splits a proof into those two arguments and
//! reports the contract's verdict; a failed call is an error, never `false`.

mod local;
mod rpc;

pub use local::LocalVerifierContract;
pub use rpc::{decode_bool, encode_verify_call, EthCallVerifier};

use async_trait::async_trait;
use starter_common::{ErrorKind, Proof, PUBLIC_INPUTS_LEN};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Proof of {len} bytes has no body after its public inputs")]
    ProofTooShort { len: usize },

    #[error("Invalid contract address: {0}")]
    InvalidAddress(String),

    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Verifier call reverted: {0}")]
    Reverted(String),

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("Local verifier failed: {0}")]
    Local(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ChainVerificationError
    }
}

/// A deployed verifier for the workflow's circuit
#[async_trait]
pub trait VerifierContract: Send + Sync {
    async fn verify(
        &self,
        proof_body: &[u8],
        public_inputs: &[[u8; PUBLIC_INPUTS_LEN]],
    ) -> Result<bool, ChainError>;
}

#[derive(Clone)]
pub struct ChainVerifierBridge {
    contract: Arc<dyn VerifierContract>,
}

impl ChainVerifierBridge {
    pub fn new(contract: Arc<dyn VerifierContract>) -> Self {
        Self { contract }
    }

    /// Submit `proof[32..]` with `[proof[0..32]]` as the public inputs
    pub async fn submit(&self, proof: &Proof) -> Result<bool, ChainError> {
        let (public_inputs, body) = proof
            .split()
            .map_err(|_| ChainError::ProofTooShort { len: proof.len() })?;

        info!("Submitting {}-byte proof body for on-chain verification", body.len());
        let verified = self.contract.verify(body, &[*public_inputs]).await?;
        if verified {
            info!("Proof verified on-chain");
        } else {
            warn!("Proof failed on-chain verification");
        }
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingContract {
        calls: Mutex<Vec<(Vec<u8>, Vec<[u8; 32]>)>>,
    }

    #[async_trait]
    impl VerifierContract for RecordingContract {
        async fn verify(
            &self,
            proof_body: &[u8],
            public_inputs: &[[u8; 32]],
        ) -> Result<bool, ChainError> {
            self.calls
                .lock()
                .await
                .push((proof_body.to_vec(), public_inputs.to_vec()));
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_submit_splits_proof() {
        let contract = Arc::new(RecordingContract::default());
        let bridge = ChainVerifierBridge::new(contract.clone());

        let mut bytes = vec![7u8; 32];
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(bridge.submit(&Proof::new(bytes)).await.unwrap());

        let calls = contract.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![1, 2, 3]);
        assert_eq!(calls[0].1, vec![[7u8; 32]]);
    }

    #[tokio::test]
    async fn test_short_proof_never_reaches_contract() {
        let contract = Arc::new(RecordingContract::default());
        let bridge = ChainVerifierBridge::new(contract.clone());

        let err = bridge.submit(&Proof::new(vec![0u8; 32])).await.unwrap_err();
        assert!(matches!(err, ChainError::ProofTooShort { len: 32 }));
        assert_eq!(err.kind(), ErrorKind::ChainVerificationError);
        assert!(contract.calls.lock().await.is_empty());
    }
}
