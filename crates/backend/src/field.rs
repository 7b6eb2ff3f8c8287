//! BN254 scalar field elements and their text / byte encodings.

use ark_bn254::Fr;
use ark_ff::{BigInteger, Field, PrimeField, Zero};
use ark_serialize::CanonicalDeserialize;
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use starter_common::{FieldBytes, FIELD_BYTES};
use std::fmt;

/// A scalar of the BN254 curve, the native field of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldElement(pub Fr);

impl FieldElement {
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    pub fn one() -> Self {
        Self(Fr::from(1u64))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplicative inverse, with zero mapping to zero
    pub fn inverse_or_zero(&self) -> Self {
        Self(self.0.inverse().unwrap_or_else(Fr::zero))
    }

    /// The field modulus as an unsigned integer
    pub fn modulus() -> BigUint {
        Fr::MODULUS.into()
    }

    /// Interpret 32 big-endian bytes, `None` unless the value is below the modulus
    pub fn from_be_bytes(bytes: &FieldBytes) -> Option<Self> {
        let mut le = bytes.0;
        le.reverse();
        Fr::deserialize_uncompressed(&le[..]).ok().map(Self)
    }

    pub fn to_be_bytes(&self) -> FieldBytes {
        let bytes = self.0.into_bigint().to_bytes_be();
        let mut arr = [0u8; FIELD_BYTES];
        arr[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
        FieldBytes(arr)
    }

    /// Parse `0x`-prefixed hex or decimal text with an optional leading `-`.
    ///
    /// Values at or above the modulus are refused rather than reduced.
    pub fn parse(text: &str) -> Option<Self> {
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let magnitude = match body.strip_prefix("0x") {
            Some(hex_digits) => BigUint::parse_bytes(hex_digits.as_bytes(), 16)?,
            None if !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()) => {
                BigUint::parse_bytes(body.as_bytes(), 10)?
            }
            None => return None,
        };
        if magnitude >= Self::modulus() {
            return None;
        }
        let value = Fr::from(magnitude);
        Some(Self(if negative { -value } else { value }))
    }

    pub fn to_hex(&self) -> String {
        self.to_be_bytes().to_hex()
    }
}

impl From<Fr> for FieldElement {
    fn from(value: Fr) -> Self {
        Self(value)
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid field element: {}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_and_hex() {
        assert_eq!(FieldElement::parse("5"), Some(FieldElement::from(5)));
        assert_eq!(FieldElement::parse("0x0a"), Some(FieldElement::from(10)));
        assert_eq!(
            FieldElement::parse("-1").map(|v| v.0 + Fr::from(1u64)),
            Some(Fr::zero())
        );
        assert!(FieldElement::parse("").is_none());
        assert!(FieldElement::parse("1.5").is_none());
        assert!(FieldElement::parse("-").is_none());
    }

    #[test]
    fn test_modulus_rejected() {
        let modulus = FieldElement::modulus().to_str_radix(10);
        assert!(FieldElement::parse(&modulus).is_none());

        let mut bytes = [0u8; FIELD_BYTES];
        let encoded = FieldElement::modulus().to_bytes_be();
        bytes[FIELD_BYTES - encoded.len()..].copy_from_slice(&encoded);
        assert!(FieldElement::from_be_bytes(&FieldBytes(bytes)).is_none());
    }

    #[test]
    fn test_be_bytes_roundtrip() {
        let value = FieldElement::from(0x0102_0304);
        let bytes = value.to_be_bytes();
        assert_eq!(bytes, FieldBytes::from_u64(0x0102_0304));
        assert_eq!(FieldElement::from_be_bytes(&bytes), Some(value));
    }

    #[test]
    fn test_inverse_of_zero_is_zero() {
        assert!(FieldElement::zero().inverse_or_zero().is_zero());
        let three = FieldElement::from(3);
        assert_eq!(three.inverse_or_zero().0 * three.0, Fr::from(1u64));
    }
}
