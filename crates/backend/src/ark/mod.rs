//! Groth16 over BN254, built on arkworks.
//!
//! Keys are derived deterministically from the installed reference string, so
//! two backends given the same circuit and reference string agree on the
//! verification key. That derivation is a development stand-in for a real
//! trusted setup: anyone holding the reference string can forge proofs.

mod synth;

pub use synth::{evaluate, first_unsatisfied, public_values, AcirCircuit, Assignment};

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, SynthesisMode};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use ark_std::rand::{rngs::StdRng, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use starter_common::{FieldBytes, FIELD_BYTES};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::api::{BackendError, BackendFactory, CircuitSizes, ComposerHandle, ProvingBackend};
use crate::field::FieldElement;
use crate::program::Program;
use crate::srs::Crs;
use crate::witness::decode_witness_map;

/// Reference strings need the generator plus at least one power of tau
const MIN_SRS_POINTS: u32 = 2;

struct CircuitKeys {
    program: Program,
    proving_key: ProvingKey<Bn254>,
    verifying_key: PreparedVerifyingKey<Bn254>,
}

struct Composer {
    capacity: u32,
    keys: Option<CircuitKeys>,
}

pub struct ArkBackend {
    pool: ThreadPool,
    slab: Option<u32>,
    crs: Option<Crs>,
    composers: HashMap<ComposerHandle, Composer>,
    next_handle: u32,
    destroyed: bool,
}

impl ArkBackend {
    pub fn new(threads: usize) -> Result<Self, BackendError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ark-prover-{}", i))
            .build()
            .map_err(|e| BackendError::ThreadPool(e.to_string()))?;
        debug!("Created proving backend with {} threads", threads);

        Ok(Self {
            pool,
            slab: None,
            crs: None,
            composers: HashMap::new(),
            next_handle: 0,
            destroyed: false,
        })
    }

    fn ensure_live(&self) -> Result<(), BackendError> {
        if self.destroyed {
            Err(BackendError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Run key generation for `program` and store the keys on `composer`
    fn refresh_keys(
        &mut self,
        composer: ComposerHandle,
        program: Program,
    ) -> Result<(), BackendError> {
        let crs = self.crs.as_ref().ok_or(BackendError::SrsNotInitialized)?;
        let entry = self
            .composers
            .get_mut(&composer)
            .ok_or(BackendError::UnknownComposer(composer))?;

        let sizes = measure(&program)?;
        if sizes.subgroup > entry.capacity {
            return Err(BackendError::CircuitTooLarge {
                required: sizes.subgroup,
                capacity: entry.capacity,
            });
        }

        let mut rng = StdRng::from_seed(key_seed(crs)?);
        let (proving_key, verifying_key) = self
            .pool
            .install(|| {
                Groth16::<Bn254>::circuit_specific_setup(AcirCircuit::shape(&program), &mut rng)
            })
            .map_err(|e| BackendError::Synthesis(e.to_string()))?;
        let verifying_key = Groth16::<Bn254>::process_vk(&verifying_key)
            .map_err(|e| BackendError::Synthesis(e.to_string()))?;

        debug!("Derived circuit keys for {}", composer);
        entry.keys = Some(CircuitKeys {
            program,
            proving_key,
            verifying_key,
        });
        Ok(())
    }
}

impl ProvingBackend for ArkBackend {
    fn circuit_sizes(&mut self, bytecode: &[u8]) -> Result<CircuitSizes, BackendError> {
        self.ensure_live()?;
        let program = Program::from_bytes(bytecode)?;
        measure(&program)
    }

    fn init_slab_allocator(&mut self, subgroup_size: u32) -> Result<(), BackendError> {
        self.ensure_live()?;
        if subgroup_size == 0 {
            return Err(BackendError::InvalidSize(subgroup_size));
        }
        self.slab = Some(subgroup_size);
        Ok(())
    }

    fn init_srs(
        &mut self,
        g1_data: &[u8],
        num_points: u32,
        g2_data: &[u8],
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        if self.slab.is_none() {
            return Err(BackendError::AllocatorNotInitialized);
        }
        if num_points < MIN_SRS_POINTS {
            return Err(BackendError::InsufficientSrs {
                required: MIN_SRS_POINTS,
                available: num_points,
            });
        }
        let crs = Crs::from_parts(g1_data, num_points, g2_data)
            .map_err(|e| BackendError::MalformedSrs(e.to_string()))?;
        debug!("Installed reference string with {} points", num_points);
        self.crs = Some(crs);
        Ok(())
    }

    fn new_composer(&mut self, size_hint: u32) -> Result<ComposerHandle, BackendError> {
        self.ensure_live()?;
        let crs = self.crs.as_ref().ok_or(BackendError::SrsNotInitialized)?;
        let capacity = crs.num_points() - 1;
        if size_hint > capacity {
            return Err(BackendError::CircuitTooLarge {
                required: size_hint,
                capacity,
            });
        }

        let handle = ComposerHandle::new(self.next_handle);
        self.next_handle += 1;
        self.composers.insert(
            handle,
            Composer {
                capacity,
                keys: None,
            },
        );
        Ok(handle)
    }

    fn create_proof(
        &mut self,
        composer: ComposerHandle,
        bytecode: &[u8],
        witness: &[u8],
        is_recursive: bool,
    ) -> Result<Vec<u8>, BackendError> {
        self.ensure_live()?;
        if is_recursive {
            return Err(BackendError::RecursionUnsupported);
        }
        if !self.composers.contains_key(&composer) {
            return Err(BackendError::UnknownComposer(composer));
        }

        let program = Program::from_bytes(bytecode)?;
        let values = assignment(&program, witness)?;
        if let Some(position) = first_unsatisfied(&program, &values) {
            warn!("Assertion at opcode {} does not hold", position);
            return Err(BackendError::UnsatisfiedConstraints(format!(
                "assertion at opcode {} evaluates to a nonzero value",
                position
            )));
        }
        let cs = ConstraintSystem::<Fr>::new_ref();
        AcirCircuit::with_values(&program, &values)
            .generate_constraints(cs.clone())
            .map_err(|e| BackendError::Synthesis(e.to_string()))?;
        if !cs
            .is_satisfied()
            .map_err(|e| BackendError::Synthesis(e.to_string()))?
        {
            return Err(BackendError::UnsatisfiedConstraints(
                "lowered constraint system is not satisfied".to_string(),
            ));
        }

        let stale = self
            .composers
            .get(&composer)
            .and_then(|c| c.keys.as_ref())
            .map_or(true, |keys| keys.program != program);
        if stale {
            self.refresh_keys(composer, program.clone())?;
        }
        let keys = self
            .composers
            .get(&composer)
            .and_then(|c| c.keys.as_ref())
            .ok_or(BackendError::MissingVerificationKey(composer))?;

        let proof = self
            .pool
            .install(|| {
                Groth16::<Bn254>::prove(
                    &keys.proving_key,
                    AcirCircuit::with_values(&program, &values),
                    &mut StdRng::from_entropy(),
                )
            })
            .map_err(|e| BackendError::Synthesis(e.to_string()))?;

        let inputs = public_values(&program, &values)
            .ok_or_else(|| BackendError::InvalidWitness("public input unassigned".to_string()))?;
        let mut bytes = Vec::with_capacity(inputs.len() * FIELD_BYTES + 128);
        for input in inputs {
            bytes.extend_from_slice(FieldElement(input).to_be_bytes().as_bytes());
        }
        proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        info!("Created proof of {} bytes with {}", bytes.len(), composer);
        Ok(bytes)
    }

    fn init_proving_key(
        &mut self,
        composer: ComposerHandle,
        bytecode: &[u8],
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        let program = Program::from_bytes(bytecode)?;
        self.refresh_keys(composer, program)
    }

    fn verify_proof(
        &mut self,
        composer: ComposerHandle,
        proof: &[u8],
        is_recursive: bool,
    ) -> Result<bool, BackendError> {
        self.ensure_live()?;
        if is_recursive {
            return Err(BackendError::RecursionUnsupported);
        }
        let keys = self
            .composers
            .get(&composer)
            .ok_or(BackendError::UnknownComposer(composer))?
            .keys
            .as_ref()
            .ok_or(BackendError::MissingVerificationKey(composer))?;

        let split = keys.program.num_public_inputs() * FIELD_BYTES;
        if proof.len() < split {
            debug!("Proof of {} bytes is shorter than its public inputs", proof.len());
            return Ok(false);
        }
        let (head, mut body) = proof.split_at(split);

        let mut inputs = Vec::with_capacity(keys.program.num_public_inputs());
        for chunk in head.chunks_exact(FIELD_BYTES) {
            let decoded =
                FieldBytes::from_be_slice(chunk).and_then(|b| FieldElement::from_be_bytes(&b));
            match decoded {
                Some(value) => inputs.push(value.0),
                None => {
                    debug!("Public input is not a canonical field element");
                    return Ok(false);
                }
            }
        }
        let parsed = match Proof::<Bn254>::deserialize_compressed(&mut body) {
            Ok(parsed) if body.is_empty() => parsed,
            _ => {
                debug!("Proof body does not decode");
                return Ok(false);
            }
        };

        Groth16::<Bn254>::verify_with_processed_vk(&keys.verifying_key, &inputs, &parsed)
            .map_err(|e| BackendError::Synthesis(e.to_string()))
    }

    fn destroy(&mut self) -> Result<(), BackendError> {
        self.ensure_live()?;
        self.composers.clear();
        self.crs = None;
        self.slab = None;
        self.destroyed = true;
        debug!("Proving backend destroyed");
        Ok(())
    }
}

/// Builds [`ArkBackend`]s sharing a thread count
#[derive(Debug, Clone)]
pub struct ArkBackendFactory {
    threads: usize,
}

impl ArkBackendFactory {
    pub fn new(threads: usize) -> Self {
        Self { threads }
    }
}

impl BackendFactory for ArkBackendFactory {
    fn create(&self) -> Result<Box<dyn ProvingBackend>, BackendError> {
        Ok(Box::new(ArkBackend::new(self.threads)?))
    }
}

/// Lower the program in setup mode and read off the domain size
fn measure(program: &Program) -> Result<CircuitSizes, BackendError> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_mode(SynthesisMode::Setup);
    AcirCircuit::shape(program)
        .generate_constraints(cs.clone())
        .map_err(|e| BackendError::Synthesis(e.to_string()))?;

    let total = (cs.num_constraints() + cs.num_instance_variables()) as u32;
    Ok(CircuitSizes {
        exact: program.assert_zero_count() as u32,
        total,
        subgroup: total.next_power_of_two(),
    })
}

/// Decode a serialized witness map into an assignment covering every witness
fn assignment(program: &Program, witness: &[u8]) -> Result<Assignment, BackendError> {
    let map =
        decode_witness_map(witness).map_err(|e| BackendError::InvalidWitness(e.to_string()))?;
    let mut values = Assignment::new();
    for (index, bytes) in map {
        let value = FieldElement::from_be_bytes(&bytes).ok_or_else(|| {
            BackendError::InvalidWitness(format!("witness {} is not a field element", index))
        })?;
        values.insert(index, value.0);
    }
    if let Some(missing) = (1..=program.current_witness_index).find(|i| !values.contains_key(i)) {
        return Err(BackendError::InvalidWitness(format!(
            "witness {} is missing",
            missing
        )));
    }
    Ok(values)
}

/// XOR-fold the compressed reference string into an RNG seed
fn key_seed(crs: &Crs) -> Result<[u8; 32], BackendError> {
    let bytes = crs
        .to_bytes()
        .map_err(|e| BackendError::MalformedSrs(e.to_string()))?;
    let mut seed = [0u8; 32];
    for (i, byte) in bytes.iter().enumerate() {
        seed[i % seed.len()] ^= byte;
    }
    Ok(seed)
}
