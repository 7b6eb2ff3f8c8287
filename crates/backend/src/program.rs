//! Circuit program format.
//!
//! A program is a flat list of opcodes over numbered witnesses. Witness 0 is
//! reserved for the constant one; parameters start at index 1 in input order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::field::FieldElement;

pub type WitnessIndex = u32;

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("Program JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Witness index {index} out of range 1..={max}")]
    InvalidWitnessIndex { index: WitnessIndex, max: WitnessIndex },

    #[error("Witness {0} declared as parameter twice")]
    DuplicateParameter(WitnessIndex),
}

/// `Σ q·w_a·w_b + Σ c·w + q_c`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Expression {
    #[serde(default)]
    pub mul_terms: Vec<(FieldElement, WitnessIndex, WitnessIndex)>,
    #[serde(default)]
    pub linear_combinations: Vec<(FieldElement, WitnessIndex)>,
    #[serde(default)]
    pub q_c: FieldElement,
}

impl Expression {
    pub fn witnesses(&self) -> impl Iterator<Item = WitnessIndex> + '_ {
        self.mul_terms
            .iter()
            .flat_map(|(_, a, b)| [*a, *b])
            .chain(self.linear_combinations.iter().map(|(_, w)| *w))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Opcode {
    /// The expression must evaluate to zero
    AssertZero(Expression),
    /// Hint: `output = input⁻¹`, or zero when `input` is zero
    Invert {
        input: WitnessIndex,
        output: WitnessIndex,
    },
    /// Request for a value computed outside the circuit
    OracleCall {
        name: String,
        #[serde(default)]
        inputs: Vec<WitnessIndex>,
        #[serde(default)]
        outputs: Vec<WitnessIndex>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Highest witness index used by the program
    pub current_witness_index: WitnessIndex,
    #[serde(default)]
    pub private_parameters: Vec<WitnessIndex>,
    #[serde(default)]
    pub public_parameters: Vec<WitnessIndex>,
    pub opcodes: Vec<Opcode>,
}

impl Program {
    /// Parse and validate the canonical (uncompressed) bytecode
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProgramError> {
        let program: Program = serde_json::from_slice(bytes)?;
        program.validate()?;
        Ok(program)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProgramError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        let max = self.current_witness_index;
        let check = |index: WitnessIndex| {
            if index == 0 || index > max {
                Err(ProgramError::InvalidWitnessIndex { index, max })
            } else {
                Ok(())
            }
        };

        let mut seen = BTreeSet::new();
        for &index in self.private_parameters.iter().chain(&self.public_parameters) {
            check(index)?;
            if !seen.insert(index) {
                return Err(ProgramError::DuplicateParameter(index));
            }
        }

        for opcode in &self.opcodes {
            match opcode {
                Opcode::AssertZero(expr) => expr.witnesses().try_for_each(check)?,
                Opcode::Invert { input, output } => {
                    check(*input)?;
                    check(*output)?;
                }
                Opcode::OracleCall {
                    inputs, outputs, ..
                } => inputs.iter().chain(outputs).try_for_each(|w| check(*w))?,
            }
        }
        Ok(())
    }

    /// All parameter witnesses in ascending index order
    pub fn parameters(&self) -> BTreeSet<WitnessIndex> {
        self.private_parameters
            .iter()
            .chain(&self.public_parameters)
            .copied()
            .collect()
    }

    pub fn num_public_inputs(&self) -> usize {
        self.public_parameters.len()
    }

    /// Number of arithmetic gates as written, before any lowering
    pub fn assert_zero_count(&self) -> usize {
        self.opcodes
            .iter()
            .filter(|op| matches!(op, Opcode::AssertZero(_)))
            .count()
    }

    /// Names of every external oracle the program would ask for
    pub fn oracle_requests(&self) -> impl Iterator<Item = &str> + '_ {
        self.opcodes.iter().filter_map(|op| match op {
            Opcode::OracleCall { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::not_equal_program;

    #[test]
    fn test_parse_text_program() {
        let json = r#"{
            "current_witness_index": 4,
            "private_parameters": [1],
            "public_parameters": [2],
            "opcodes": [
                {"kind": "assert_zero", "linear_combinations": [["1", 1], ["-1", 2], ["-1", 3]]},
                {"kind": "invert", "input": 3, "output": 4},
                {"kind": "assert_zero", "mul_terms": [["1", 3, 4]], "q_c": "-1"}
            ]
        }"#;
        let program = Program::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(program, not_equal_program());
        assert_eq!(program.assert_zero_count(), 2);
        assert_eq!(program.num_public_inputs(), 1);
        assert_eq!(program.parameters().into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(program.oracle_requests().count(), 0);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let program = not_equal_program();
        let bytes = program.to_bytes().unwrap();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn test_witness_zero_rejected() {
        let mut program = not_equal_program();
        program.opcodes.push(Opcode::Invert {
            input: 0,
            output: 4,
        });
        assert!(matches!(
            program.validate(),
            Err(ProgramError::InvalidWitnessIndex { index: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut program = not_equal_program();
        program.public_parameters.push(1);
        assert!(matches!(
            program.validate(),
            Err(ProgramError::DuplicateParameter(1))
        ));
    }

    #[test]
    fn test_oracle_requests_listed() {
        let mut program = not_equal_program();
        program.opcodes.insert(
            0,
            Opcode::OracleCall {
                name: "get_price".to_string(),
                inputs: vec![1],
                outputs: vec![3],
            },
        );
        assert_eq!(program.oracle_requests().collect::<Vec<_>>(), vec!["get_price"]);
    }
}
