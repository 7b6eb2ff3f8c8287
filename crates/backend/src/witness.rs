//! Witness transport codec: `gzip(bincode(WitnessMap))`.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use starter_common::FieldBytes;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;

use crate::program::WitnessIndex;

/// Witness index to big-endian field element, ordered by index
pub type WitnessMap = BTreeMap<WitnessIndex, FieldBytes>;

#[derive(Error, Debug)]
pub enum WitnessCodecError {
    #[error("Serialization error: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),

    #[error("Deserialization error: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),

    #[error("Compression error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn encode_witness_map(map: &WitnessMap) -> Result<Vec<u8>, WitnessCodecError> {
    Ok(bincode::serde::encode_to_vec(
        map,
        bincode::config::standard(),
    )?)
}

pub fn decode_witness_map(bytes: &[u8]) -> Result<WitnessMap, WitnessCodecError> {
    let (map, _): (WitnessMap, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(map)
}

/// Serialize and gzip a solved witness.
///
/// The gzip header carries no timestamp, so equal maps compress to equal bytes.
pub fn compress_witness(map: &WitnessMap) -> Result<Vec<u8>, WitnessCodecError> {
    let raw = encode_witness_map(map)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Undo the gzip layer, yielding the serialized map the backend consumes
pub fn decompress_witness(compressed: &[u8]) -> Result<Vec<u8>, WitnessCodecError> {
    let mut decoder = GzDecoder::new(compressed);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    Ok(raw)
}
