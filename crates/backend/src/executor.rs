//! Witness solving.
//!
//! Walks the opcodes in order and fills every derived witness from the
//! parameters. Assertions whose witnesses are all known are left for the
//! proving backend to judge; the solver only derives values.

use ark_bn254::Fr;
use ark_ff::Zero;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::field::FieldElement;
use crate::program::{Expression, Opcode, Program, WitnessIndex};
use crate::witness::WitnessMap;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Unexpected oracle call '{name}' at opcode {opcode}")]
    UnexpectedOracleCall { opcode: usize, name: String },

    #[error("Missing value for parameter witness {0}")]
    MissingInput(WitnessIndex),

    #[error("Initial witness {0} is not a circuit parameter")]
    UnexpectedInput(WitnessIndex),

    #[error("Initial witness {0} is not a canonical field element")]
    NonCanonicalInput(WitnessIndex),

    #[error("Opcode {opcode} cannot be solved: {reason}")]
    Unsolvable { opcode: usize, reason: String },

    #[error("Witness {0} was never assigned")]
    UnassignedWitness(WitnessIndex),
}

/// Solve all witnesses of `program` starting from the parameter values in `initial`.
pub fn execute(program: &Program, initial: &WitnessMap) -> Result<WitnessMap, ExecutionError> {
    let parameters = program.parameters();
    let mut values: BTreeMap<WitnessIndex, Fr> = BTreeMap::new();

    for (&index, bytes) in initial {
        if !parameters.contains(&index) {
            return Err(ExecutionError::UnexpectedInput(index));
        }
        let value =
            FieldElement::from_be_bytes(bytes).ok_or(ExecutionError::NonCanonicalInput(index))?;
        values.insert(index, value.0);
    }
    if let Some(&missing) = parameters.iter().find(|w| !values.contains_key(w)) {
        return Err(ExecutionError::MissingInput(missing));
    }

    for (position, opcode) in program.opcodes.iter().enumerate() {
        match opcode {
            Opcode::AssertZero(expr) => solve_assert_zero(position, expr, &mut values)?,
            Opcode::Invert { input, output } => {
                let value = values.get(input).copied().ok_or_else(|| ExecutionError::Unsolvable {
                    opcode: position,
                    reason: format!("inverse of unassigned witness {}", input),
                })?;
                values
                    .entry(*output)
                    .or_insert_with(|| FieldElement(value).inverse_or_zero().0);
            }
            Opcode::OracleCall { name, .. } => {
                return Err(ExecutionError::UnexpectedOracleCall {
                    opcode: position,
                    name: name.clone(),
                })
            }
        }
    }

    let mut solved = WitnessMap::new();
    for index in 1..=program.current_witness_index {
        let value = values
            .get(&index)
            .ok_or(ExecutionError::UnassignedWitness(index))?;
        solved.insert(index, FieldElement(*value).to_be_bytes());
    }
    debug!("Solved {} witnesses", solved.len());
    Ok(solved)
}

/// Solve for the single unknown of an assertion, if there is one.
///
/// Product terms with one known factor count as linear in the other.
fn solve_assert_zero(
    position: usize,
    expr: &Expression,
    values: &mut BTreeMap<WitnessIndex, Fr>,
) -> Result<(), ExecutionError> {
    let unsolvable = |reason: String| ExecutionError::Unsolvable {
        opcode: position,
        reason,
    };

    let mut unknown: Option<WitnessIndex> = None;
    let mut note_unknown = |w: WitnessIndex| -> Result<(), ExecutionError> {
        match unknown {
            Some(existing) if existing != w => Err(unsolvable(format!(
                "more than one unknown ({} and {})",
                existing, w
            ))),
            _ => {
                unknown = Some(w);
                Ok(())
            }
        }
    };

    let mut constant = expr.q_c.0;
    let mut coefficient = Fr::zero();

    for (q, a, b) in &expr.mul_terms {
        match (values.get(a), values.get(b)) {
            (Some(va), Some(vb)) => constant += q.0 * va * vb,
            (Some(known), None) => {
                note_unknown(*b)?;
                coefficient += q.0 * known;
            }
            (None, Some(known)) => {
                note_unknown(*a)?;
                coefficient += q.0 * known;
            }
            (None, None) => {
                return Err(unsolvable(format!(
                    "product of unassigned witnesses {} and {}",
                    a, b
                )))
            }
        }
    }
    for (c, w) in &expr.linear_combinations {
        match values.get(w) {
            Some(v) => constant += c.0 * v,
            None => {
                note_unknown(*w)?;
                coefficient += c.0;
            }
        }
    }

    let Some(target) = unknown else {
        return Ok(());
    };
    if coefficient.is_zero() {
        return Err(unsolvable(format!("witness {} has zero coefficient", target)));
    }
    let inverse = FieldElement(coefficient).inverse_or_zero().0;
    values.insert(target, -constant * inverse);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{not_equal_program, witness_for};
    use starter_common::FieldBytes;

    #[test]
    fn test_solves_not_equal_circuit() {
        let program = not_equal_program();
        let solved = execute(&program, &witness_for(3, 4)).unwrap();

        assert_eq!(solved.len(), 4);
        let diff = FieldElement::from_be_bytes(&solved[&3]).unwrap();
        assert_eq!(diff.0, Fr::from(3u64) - Fr::from(4u64));
        let inv = FieldElement::from_be_bytes(&solved[&4]).unwrap();
        assert_eq!(diff.0 * inv.0, Fr::from(1u64));
    }

    #[test]
    fn test_equal_inputs_still_solve() {
        // The solver derives values only; the failing assertion is the backend's call.
        let solved = execute(&not_equal_program(), &witness_for(3, 3)).unwrap();
        assert_eq!(solved[&3], FieldBytes::default());
        assert_eq!(solved[&4], FieldBytes::default());
    }

    #[test]
    fn test_missing_parameter() {
        let mut initial = witness_for(3, 4);
        initial.remove(&2);
        assert!(matches!(
            execute(&not_equal_program(), &initial),
            Err(ExecutionError::MissingInput(2))
        ));
    }

    #[test]
    fn test_non_parameter_input_rejected() {
        let mut initial = witness_for(3, 4);
        initial.insert(3, FieldBytes::from_u64(1));
        assert!(matches!(
            execute(&not_equal_program(), &initial),
            Err(ExecutionError::UnexpectedInput(3))
        ));
    }

    #[test]
    fn test_oracle_call_aborts() {
        let mut program = not_equal_program();
        program.opcodes.insert(
            0,
            Opcode::OracleCall {
                name: "random".to_string(),
                inputs: vec![],
                outputs: vec![3],
            },
        );
        match execute(&program, &witness_for(3, 4)) {
            Err(ExecutionError::UnexpectedOracleCall { opcode, name }) => {
                assert_eq!(opcode, 0);
                assert_eq!(name, "random");
            }
            other => panic!("expected oracle error, got {:?}", other),
        }
    }

    #[test]
    fn test_product_with_known_factor_is_linear() {
        // 2·w1·w3 - w2 = 0 with w1 = 3, w2 = 12  =>  w3 = 2
        let program = Program {
            current_witness_index: 3,
            private_parameters: vec![1],
            public_parameters: vec![2],
            opcodes: vec![Opcode::AssertZero(Expression {
                mul_terms: vec![(FieldElement::from(2), 1, 3)],
                linear_combinations: vec![(FieldElement(-Fr::from(1u64)), 2)],
                q_c: FieldElement::zero(),
            })],
        };
        let solved = execute(&program, &witness_for(3, 12)).unwrap();
        assert_eq!(solved[&3], FieldBytes::from_u64(2));
    }

    #[test]
    fn test_two_unknowns_unsolvable() {
        let program = Program {
            current_witness_index: 4,
            private_parameters: vec![1],
            public_parameters: vec![2],
            opcodes: vec![Opcode::AssertZero(Expression {
                mul_terms: vec![],
                linear_combinations: vec![(FieldElement::one(), 3), (FieldElement::one(), 4)],
                q_c: FieldElement::zero(),
            })],
        };
        assert!(matches!(
            execute(&program, &witness_for(1, 2)),
            Err(ExecutionError::Unsolvable { opcode: 0, .. })
        ));
    }
}
