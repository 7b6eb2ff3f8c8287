use serde::{Deserialize, Serialize};
use std::fmt;

/// Size in bytes of one encoded field element
pub const FIELD_BYTES: usize = 32;

/// A field element in its 32-byte big-endian transport form.
///
/// Witness values and public inputs travel in this shape. Range checks against
/// the backend modulus happen where the value is interpreted, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FieldBytes(pub [u8; FIELD_BYTES]);

impl FieldBytes {
    pub fn new(bytes: [u8; FIELD_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FIELD_BYTES] {
        &self.0
    }

    /// Left-pad a big-endian byte string to 32 bytes, `None` if it is longer
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > FIELD_BYTES {
            return None;
        }
        let mut arr = [0u8; FIELD_BYTES];
        arr[FIELD_BYTES - bytes.len()..].copy_from_slice(bytes);
        Some(Self(arr))
    }

    pub fn from_u64(value: u64) -> Self {
        let mut arr = [0u8; FIELD_BYTES];
        arr[FIELD_BYTES - 8..].copy_from_slice(&value.to_be_bytes());
        Self(arr)
    }

    /// `0x`-prefixed, zero-padded hex, the same shape `hexZeroPad(.., 32)` produces
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for FieldBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_is_zero_padded() {
        let value = FieldBytes::from_u64(0xdead_beef);
        assert_eq!(value.to_hex(), format!("0x{}deadbeef", "0".repeat(56)));
        assert_eq!(value.to_string(), value.to_hex());
    }

    #[test]
    fn test_left_padding() {
        let value = FieldBytes::from_be_slice(&[0x05]).unwrap();
        assert_eq!(&value.0[..31], &[0u8; 31]);
        assert_eq!(value.0[31], 0x05);
        assert_eq!(value, FieldBytes::from_u64(5));
    }

    #[test]
    fn test_oversized_slice_rejected() {
        assert!(FieldBytes::from_be_slice(&[1u8; 33]).is_none());
    }
}
