pub mod error;
pub mod field;
pub mod inputs;
pub mod proof;

pub use error::{Error, ErrorKind, Result};
pub use field::{FieldBytes, FIELD_BYTES};
pub use inputs::{Input, INPUT_SIZE};
pub use proof::{Proof, PUBLIC_INPUTS_LEN};
