//! Circuit artifacts and their decoding.
//!
//! An artifact is a JSON document whose `bytecode` field holds
//! `base64(gzip(program))`. Other fields written by the circuit compiler are
//! ignored.

use base64::{engine::general_purpose, Engine as _};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use starter_backend::{Program, ProgramError};
use starter_common::ErrorKind;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const BUNDLED_ARTIFACT: &str = include_str!("../../../circuits/not_equal.json");

#[derive(Error, Debug)]
pub enum CircuitError {
    #[error("Failed to read circuit artifact {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Circuit artifact is not valid JSON: {0}")]
    Artifact(#[from] serde_json::Error),

    #[error("Circuit bytecode is empty")]
    EmptyBytecode,

    #[error("Circuit bytecode is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Circuit bytecode does not decompress: {0}")]
    Decompress(std::io::Error),

    #[error("Circuit bytecode could not be compressed: {0}")]
    Compress(std::io::Error),

    #[error("Circuit bytecode is not a valid program: {0}")]
    Program(#[from] ProgramError),
}

impl CircuitError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedCircuit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitArtifact {
    #[serde(default)]
    pub name: String,
    pub bytecode: String,
}

impl CircuitArtifact {
    /// The `x != y` circuit shipped with the crate
    pub fn bundled() -> Result<Self, CircuitError> {
        Self::from_json(BUNDLED_ARTIFACT)
    }

    pub fn from_json(text: &str) -> Result<Self, CircuitError> {
        Ok(serde_json::from_str(text)?)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CircuitError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CircuitError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&text)
    }

    /// Package a program the way the circuit compiler does
    pub fn encode(name: impl Into<String>, program: &Program) -> Result<Self, CircuitError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&program.to_bytes()?)
            .map_err(CircuitError::Compress)?;
        let compressed = encoder.finish().map_err(CircuitError::Compress)?;
        Ok(Self {
            name: name.into(),
            bytecode: general_purpose::STANDARD.encode(compressed),
        })
    }

    pub fn load(&self) -> Result<LoadedCircuit, CircuitError> {
        load(&self.bytecode)
    }
}

/// A decoded circuit, immutable for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCircuit {
    compressed: Vec<u8>,
    bytecode: Vec<u8>,
    program: Program,
}

impl LoadedCircuit {
    /// The gzip stream as stored in the artifact
    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    /// Canonical bytecode handed to the proving backend
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// Decode `base64(gzip(program))` into a validated circuit
pub fn load(blob: &str) -> Result<LoadedCircuit, CircuitError> {
    let blob = blob.trim();
    if blob.is_empty() {
        return Err(CircuitError::EmptyBytecode);
    }
    let compressed = general_purpose::STANDARD.decode(blob)?;

    let mut bytecode = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut bytecode)
        .map_err(CircuitError::Decompress)?;
    if bytecode.is_empty() {
        return Err(CircuitError::EmptyBytecode);
    }

    let program = Program::from_bytes(&bytecode)?;
    debug!(
        "Loaded circuit: {} compressed bytes, {} bytes of bytecode, {} opcodes",
        compressed.len(),
        bytecode.len(),
        program.opcodes.len()
    );
    Ok(LoadedCircuit {
        compressed,
        bytecode,
        program,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use starter_backend::Opcode;

    #[test]
    fn test_bundled_circuit_decodes() {
        let artifact = CircuitArtifact::bundled().unwrap();
        assert_eq!(artifact.name, "not_equal");

        let circuit = artifact.load().unwrap();
        let program = circuit.program();
        assert_eq!(program.current_witness_index, 4);
        assert_eq!(program.private_parameters, vec![1]);
        assert_eq!(program.public_parameters, vec![2]);
        assert_eq!(program.assert_zero_count(), 2);
        assert!(matches!(program.opcodes[1], Opcode::Invert { input: 3, output: 4 }));
        assert_eq!(Program::from_bytes(circuit.bytecode()).unwrap(), *program);
    }

    #[test]
    fn test_encode_then_load() {
        let program = CircuitArtifact::bundled().unwrap().load().unwrap().program().clone();
        let artifact = CircuitArtifact::encode("copy", &program).unwrap();
        assert_eq!(artifact.load().unwrap().program(), &program);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let bundled = CircuitArtifact::bundled().unwrap();
        let json = serde_json::json!({
            "bytecode": bundled.bytecode,
            "abi": {"parameters": []},
            "noir_version": "0.9.0"
        });
        let artifact = CircuitArtifact::from_json(&json.to_string()).unwrap();
        assert!(artifact.name.is_empty());
        assert!(artifact.load().is_ok());
    }

    #[test]
    fn test_malformed_blobs() {
        assert!(matches!(load(""), Err(CircuitError::EmptyBytecode)));
        assert!(matches!(load("not base64!"), Err(CircuitError::Base64(_))));

        let not_gzip = general_purpose::STANDARD.encode(b"plain bytes");
        assert!(matches!(load(&not_gzip), Err(CircuitError::Decompress(_))));

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"opcodes\": 7}").unwrap();
        let not_program = general_purpose::STANDARD.encode(encoder.finish().unwrap());
        let err = load(&not_program).unwrap_err();
        assert!(matches!(err, CircuitError::Program(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedCircuit);
    }

    #[test]
    fn test_missing_bytecode_field() {
        assert!(matches!(
            CircuitArtifact::from_json(r#"{"name": "x"}"#),
            Err(CircuitError::Artifact(_))
        ));
    }
}
