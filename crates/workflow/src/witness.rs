//! Witness construction from user inputs.

use num_bigint::Sign;
use starter_backend::{
    compress_witness, decompress_witness, execute, ExecutionError, FieldElement, Program,
    WitnessCodecError, WitnessIndex, WitnessMap,
};
use starter_common::{ErrorKind, FieldBytes, Input};
use thiserror::Error;
use tracing::{debug, error};

use crate::circuit::LoadedCircuit;

#[derive(Error, Debug)]
pub enum WitnessError {
    #[error("Expected {expected} inputs, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("Input for witness {index} cannot be encoded: {reason}")]
    Encoding { index: WitnessIndex, reason: String },

    #[error("Circuit requested oracle '{name}', which is not supported")]
    UnexpectedOracleCall { name: String },

    #[error("Witness execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Witness compression failed: {0}")]
    Codec(#[from] WitnessCodecError),
}

impl WitnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WitnessError::UnexpectedOracleCall { .. }
            | WitnessError::Execution(ExecutionError::UnexpectedOracleCall { .. }) => {
                ErrorKind::UnexpectedOracleCall
            }
            WitnessError::Codec(_) => ErrorKind::Internal,
            _ => ErrorKind::WitnessEncodingError,
        }
    }
}

/// A solved witness, compressed for transport to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    compressed: Vec<u8>,
}

impl Witness {
    /// The serialized witness map the backend consumes
    pub fn decompress(&self) -> Result<Vec<u8>, WitnessCodecError> {
        decompress_witness(&self.compressed)
    }
}

/// Names of the external oracles this builder can answer
const SUPPORTED_ORACLES: &[&str] = &[];

#[derive(Debug, Clone, Default)]
pub struct WitnessBuilder;

impl WitnessBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Refuse programs that would call out to an oracle we cannot serve
    pub fn check_capabilities(&self, program: &Program) -> Result<(), WitnessError> {
        match program
            .oracle_requests()
            .find(|name| !SUPPORTED_ORACLES.contains(name))
        {
            Some(name) => {
                error!("Circuit requests unsupported oracle '{}'", name);
                Err(WitnessError::UnexpectedOracleCall {
                    name: name.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    /// Encode input `i` as the big-endian field element at witness `i + 1`
    pub fn initial_witness(
        &self,
        program: &Program,
        input: &Input,
    ) -> Result<WitnessMap, WitnessError> {
        let expected = program.parameters().len();
        if input.len() != expected {
            return Err(WitnessError::Arity {
                expected,
                actual: input.len(),
            });
        }

        let mut map = WitnessMap::new();
        for (i, value) in input.values().iter().enumerate() {
            let index = i as WitnessIndex + 1;
            let encoding = |reason: &str| WitnessError::Encoding {
                index,
                reason: reason.to_string(),
            };

            let (sign, magnitude) = value.to_bytes_be();
            if sign == Sign::Minus {
                return Err(encoding("negative values are not field elements"));
            }
            let bytes = FieldBytes::from_be_slice(&magnitude)
                .ok_or_else(|| encoding("value is wider than 32 bytes"))?;
            if FieldElement::from_be_bytes(&bytes).is_none() {
                return Err(encoding("value is not below the field modulus"));
            }
            map.insert(index, bytes);
        }
        Ok(map)
    }

    /// Solve and compress the full witness for `input`
    pub fn build(&self, circuit: &LoadedCircuit, input: &Input) -> Result<Witness, WitnessError> {
        let program = circuit.program();
        self.check_capabilities(program)?;
        let initial = self.initial_witness(program, input)?;
        let solved = execute(program, &initial)?;
        let compressed = compress_witness(&solved)?;
        debug!(
            "Built witness of {} values ({} compressed bytes)",
            solved.len(),
            compressed.len()
        );
        Ok(Witness { compressed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitArtifact;
    use num_bigint::BigInt;
    use starter_backend::{decode_witness_map, Opcode};

    fn circuit() -> LoadedCircuit {
        CircuitArtifact::bundled().unwrap().load().unwrap()
    }

    #[test]
    fn test_index_convention() {
        let builder = WitnessBuilder::new();
        let map = builder
            .initial_witness(circuit().program(), &Input::from([3, 4]))
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], FieldBytes::from_u64(3));
        assert_eq!(map[&2], FieldBytes::from_u64(4));
        assert!(!map.contains_key(&0));
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = WitnessBuilder::new();
        let circuit = circuit();
        let a = builder.build(&circuit, &Input::from([3, 4])).unwrap();
        let b = builder.build(&circuit, &Input::from([3, 4])).unwrap();
        assert_eq!(a, b);

        let solved = decode_witness_map(&a.decompress().unwrap()).unwrap();
        assert_eq!(solved.len(), 4);
        assert_eq!(solved[&1], FieldBytes::from_u64(3));
    }

    #[test]
    fn test_equal_inputs_still_build() {
        let witness = WitnessBuilder::new().build(&circuit(), &Input::from([3, 3]));
        assert!(witness.is_ok());
    }

    #[test]
    fn test_negative_value_rejected() {
        let err = WitnessBuilder::new()
            .initial_witness(circuit().program(), &Input::from([-1, 4]))
            .unwrap_err();
        assert!(matches!(err, WitnessError::Encoding { index: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::WitnessEncodingError);
    }

    #[test]
    fn test_oversized_values_rejected() {
        let builder = WitnessBuilder::new();
        let program = circuit().program().clone();

        let wide = Input::new(vec![BigInt::from(1) << 256, BigInt::from(2)]).unwrap();
        assert!(matches!(
            builder.initial_witness(&program, &wide),
            Err(WitnessError::Encoding { index: 1, .. })
        ));

        let modulus = BigInt::from(FieldElement::modulus());
        let at_modulus = Input::new(vec![BigInt::from(1), modulus]).unwrap();
        assert!(matches!(
            builder.initial_witness(&program, &at_modulus),
            Err(WitnessError::Encoding { index: 2, .. })
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = WitnessBuilder::new()
            .build(&circuit(), &Input::empty())
            .unwrap_err();
        assert!(matches!(
            err,
            WitnessError::Arity {
                expected: 2,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_oracle_request_refused_before_execution() {
        let mut program = circuit().program().clone();
        program.opcodes.push(Opcode::OracleCall {
            name: "get_secret".to_string(),
            inputs: vec![1],
            outputs: vec![],
        });
        let artifact = CircuitArtifact::encode("oracle", &program).unwrap();

        let err = WitnessBuilder::new()
            .build(&artifact.load().unwrap(), &Input::from([3, 4]))
            .unwrap_err();
        assert!(
            matches!(err, WitnessError::UnexpectedOracleCall { ref name } if name == "get_secret")
        );
        assert_eq!(err.kind(), ErrorKind::UnexpectedOracleCall);
    }
}
