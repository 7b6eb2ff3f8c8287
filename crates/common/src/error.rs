use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Proof too short: {len} bytes, need more than {min}")]
    ProofTooShort { len: usize, min: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable classification of every failure the workflow can report.
///
/// Attempt-level failures carry one of these next to a human-readable message
/// so a UI can decide between "fix your input", "retry later" and "this is a bug".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Circuit artifact could not be decoded, decompressed or parsed
    MalformedCircuit,
    /// A step of backend/session initialization failed
    BackendInitError,
    /// An input value is not representable as a field element
    WitnessEncodingError,
    /// The circuit asked for an external oracle, which this workflow never serves
    UnexpectedOracleCall,
    /// The backend refused to create a proof (constraints unsatisfied, bad witness)
    ProvingError,
    /// Local verification could not run
    LocalVerificationError,
    /// Local verification ran and returned false
    LocalRejection,
    /// The verifier contract call failed (transport, RPC or decoding)
    ChainVerificationError,
    /// The verifier contract returned false
    OnChainRejection,
    /// Another attempt holds the proving session
    SessionBusy,
    /// The proving session was destroyed and must be reset
    SessionDestroyed,
    /// No proving session has been initialized
    SessionUnavailable,
    /// Worker failure or other defect
    Internal,
}

impl ErrorKind {
    /// Whether retrying the same request can succeed without changing the input
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ChainVerificationError | ErrorKind::SessionBusy
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedCircuit => "malformed_circuit",
            ErrorKind::BackendInitError => "backend_init_error",
            ErrorKind::WitnessEncodingError => "witness_encoding_error",
            ErrorKind::UnexpectedOracleCall => "unexpected_oracle_call",
            ErrorKind::ProvingError => "proving_error",
            ErrorKind::LocalVerificationError => "local_verification_error",
            ErrorKind::LocalRejection => "local_rejection",
            ErrorKind::ChainVerificationError => "chain_verification_error",
            ErrorKind::OnChainRejection => "on_chain_rejection",
            ErrorKind::SessionBusy => "session_busy",
            ErrorKind::SessionDestroyed => "session_destroyed",
            ErrorKind::SessionUnavailable => "session_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnexpectedOracleCall).unwrap();
        assert_eq!(json, "\"unexpected_oracle_call\"");
        assert_eq!(ErrorKind::OnChainRejection.to_string(), "on_chain_rejection");
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(ErrorKind::ChainVerificationError.is_retriable());
        assert!(!ErrorKind::OnChainRejection.is_retriable());
        assert!(!ErrorKind::ProvingError.is_retriable());
    }
}
