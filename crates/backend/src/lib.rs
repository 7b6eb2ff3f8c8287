pub mod api;
pub mod ark;
pub mod executor;
pub mod field;
pub mod program;
pub mod srs;
pub mod witness;

pub use api::{BackendError, BackendFactory, CircuitSizes, ComposerHandle, ProvingBackend};
pub use ark::{ArkBackend, ArkBackendFactory};
pub use executor::{execute, ExecutionError};
pub use field::FieldElement;
pub use program::{Expression, Opcode, Program, ProgramError, WitnessIndex};
pub use srs::{Crs, DevSrsProvider, FileSrsProvider, SrsError, SrsProvider};
pub use witness::{
    compress_witness, decode_witness_map, decompress_witness, encode_witness_map,
    WitnessCodecError, WitnessMap,
};
