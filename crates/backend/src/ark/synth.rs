//! Lowering of programs to rank-1 constraints.

use ark_bn254::Fr;
use ark_ff::Zero;
use ark_relations::r1cs::{
    ConstraintSynthesizer, ConstraintSystemRef, LinearCombination, SynthesisError, Variable,
};
use std::collections::BTreeMap;

use crate::program::{Expression, Opcode, Program, WitnessIndex};

pub type Assignment = BTreeMap<WitnessIndex, Fr>;

/// A program viewed as an R1CS instance.
///
/// Public parameters become instance variables in declaration order; every
/// other witness is a private variable. Without an assignment the circuit
/// only describes its shape, which is all key generation needs.
pub struct AcirCircuit<'a> {
    program: &'a Program,
    values: Option<&'a Assignment>,
}

impl<'a> AcirCircuit<'a> {
    pub fn shape(program: &'a Program) -> Self {
        Self {
            program,
            values: None,
        }
    }

    pub fn with_values(program: &'a Program, values: &'a Assignment) -> Self {
        Self {
            program,
            values: Some(values),
        }
    }

    fn value(&self, index: WitnessIndex) -> Result<Fr, SynthesisError> {
        self.values
            .and_then(|values| values.get(&index).copied())
            .ok_or(SynthesisError::AssignmentMissing)
    }

    fn enforce_assert_zero(
        &self,
        cs: &ConstraintSystemRef<Fr>,
        expr: &Expression,
        variables: &BTreeMap<WitnessIndex, Variable>,
    ) -> Result<(), SynthesisError> {
        let var = |index: &WitnessIndex| {
            variables
                .get(index)
                .copied()
                .ok_or(SynthesisError::AssignmentMissing)
        };

        let mut linear = LinearCombination::<Fr>::zero();
        let mut negated = LinearCombination::<Fr>::zero();
        for (c, w) in &expr.linear_combinations {
            linear = linear + (c.0, var(w)?);
            negated = negated + (-c.0, var(w)?);
        }
        if !expr.q_c.is_zero() {
            linear = linear + (expr.q_c.0, Variable::One);
            negated = negated + (-expr.q_c.0, Variable::One);
        }

        match expr.mul_terms.as_slice() {
            [] => cs.enforce_constraint(
                linear,
                LinearCombination::from(Variable::One),
                LinearCombination::zero(),
            ),
            // q·a·b = -(linear part)
            [(q, a, b)] => cs.enforce_constraint(
                LinearCombination::zero() + (q.0, var(a)?),
                LinearCombination::from(var(b)?),
                negated,
            ),
            terms => {
                for (q, a, b) in terms {
                    let product =
                        cs.new_witness_variable(|| Ok(self.value(*a)? * self.value(*b)?))?;
                    cs.enforce_constraint(
                        LinearCombination::from(var(a)?),
                        LinearCombination::from(var(b)?),
                        LinearCombination::from(product),
                    )?;
                    linear = linear + (q.0, product);
                }
                cs.enforce_constraint(
                    linear,
                    LinearCombination::from(Variable::One),
                    LinearCombination::zero(),
                )
            }
        }
    }
}

impl ConstraintSynthesizer<Fr> for AcirCircuit<'_> {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let mut variables = BTreeMap::new();
        for &index in &self.program.public_parameters {
            let variable = cs.new_input_variable(|| self.value(index))?;
            variables.insert(index, variable);
        }
        for index in 1..=self.program.current_witness_index {
            if variables.contains_key(&index) {
                continue;
            }
            let variable = cs.new_witness_variable(|| self.value(index))?;
            variables.insert(index, variable);
        }

        for opcode in &self.program.opcodes {
            if let Opcode::AssertZero(expr) = opcode {
                self.enforce_assert_zero(&cs, expr, &variables)?;
            }
        }
        Ok(())
    }
}

/// Evaluate an assertion under a full assignment
pub fn evaluate(expr: &Expression, values: &Assignment) -> Option<Fr> {
    let mut sum = expr.q_c.0;
    for (q, a, b) in &expr.mul_terms {
        sum += q.0 * values.get(a)? * values.get(b)?;
    }
    for (c, w) in &expr.linear_combinations {
        sum += c.0 * values.get(w)?;
    }
    Some(sum)
}

/// Position of the first assertion that does not hold, if any
pub fn first_unsatisfied(program: &Program, values: &Assignment) -> Option<usize> {
    program
        .opcodes
        .iter()
        .enumerate()
        .find_map(|(position, opcode)| match opcode {
            Opcode::AssertZero(expr) => match evaluate(expr, values) {
                Some(sum) if sum.is_zero() => None,
                _ => Some(position),
            },
            _ => None,
        })
}

/// Values of the public parameters in declaration order
pub fn public_values(program: &Program, values: &Assignment) -> Option<Vec<Fr>> {
    program
        .public_parameters
        .iter()
        .map(|index| values.get(index).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldElement;
    use ark_ff::One;
    use crate::testing::not_equal_program;
    use ark_relations::r1cs::{ConstraintSystem, SynthesisMode};

    fn assignment(x: u64, y: u64) -> Assignment {
        let diff = Fr::from(x) - Fr::from(y);
        let mut values = Assignment::new();
        values.insert(1, Fr::from(x));
        values.insert(2, Fr::from(y));
        values.insert(3, diff);
        values.insert(4, FieldElement(diff).inverse_or_zero().0);
        values
    }

    #[test]
    fn test_shape_counts() {
        let program = not_equal_program();
        let cs = ConstraintSystem::<Fr>::new_ref();
        cs.set_mode(SynthesisMode::Setup);
        AcirCircuit::shape(&program)
            .generate_constraints(cs.clone())
            .unwrap();

        assert_eq!(cs.num_constraints(), 2);
        // constant one plus the public parameter
        assert_eq!(cs.num_instance_variables(), 2);
        assert_eq!(cs.num_witness_variables(), 3);
    }

    #[test]
    fn test_distinct_inputs_satisfy() {
        let program = not_equal_program();
        let values = assignment(3, 4);
        let cs = ConstraintSystem::<Fr>::new_ref();
        AcirCircuit::with_values(&program, &values)
            .generate_constraints(cs.clone())
            .unwrap();
        assert!(cs.is_satisfied().unwrap());
        assert_eq!(first_unsatisfied(&program, &values), None);
        assert_eq!(public_values(&program, &values), Some(vec![Fr::from(4u64)]));
    }

    #[test]
    fn test_equal_inputs_fail_last_assertion() {
        let program = not_equal_program();
        let values = assignment(3, 3);
        let cs = ConstraintSystem::<Fr>::new_ref();
        AcirCircuit::with_values(&program, &values)
            .generate_constraints(cs.clone())
            .unwrap();
        assert!(!cs.is_satisfied().unwrap());
        assert_eq!(first_unsatisfied(&program, &values), Some(2));
    }

    #[test]
    fn test_multiple_products_use_auxiliary_variables() {
        // w1·w1 + w2·w2 - w3 = 0
        let program = Program {
            current_witness_index: 3,
            private_parameters: vec![1, 2],
            public_parameters: vec![3],
            opcodes: vec![Opcode::AssertZero(Expression {
                mul_terms: vec![(FieldElement::one(), 1, 1), (FieldElement::one(), 2, 2)],
                linear_combinations: vec![(FieldElement(-Fr::one()), 3)],
                q_c: FieldElement::zero(),
            })],
        };
        let mut values = Assignment::new();
        values.insert(1, Fr::from(3u64));
        values.insert(2, Fr::from(4u64));
        values.insert(3, Fr::from(25u64));

        let cs = ConstraintSystem::<Fr>::new_ref();
        AcirCircuit::with_values(&program, &values)
            .generate_constraints(cs.clone())
            .unwrap();
        assert_eq!(cs.num_constraints(), 3);
        assert!(cs.is_satisfied().unwrap());
    }
}
