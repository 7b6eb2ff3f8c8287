use serde::{Deserialize, Serialize};

use crate::field::FIELD_BYTES;

/// Length of the public-inputs prefix of every proof
pub const PUBLIC_INPUTS_LEN: usize = FIELD_BYTES;

/// A proof as produced by the proving backend.
///
/// Layout: the first [`PUBLIC_INPUTS_LEN`] bytes are the public inputs, the
/// remainder is the backend-defined proof body. Any external verifier must use
/// exactly this split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    inner: Vec<u8>,
}

impl Proof {
    pub fn new(inner: Vec<u8>) -> Self {
        Self { inner }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Split into `(public_inputs, proof_body)`.
    ///
    /// Fails unless the proof is strictly longer than the public-inputs
    /// prefix; an empty body can never verify.
    pub fn split(&self) -> crate::Result<(&[u8; PUBLIC_INPUTS_LEN], &[u8])> {
        if self.inner.len() <= PUBLIC_INPUTS_LEN {
            return Err(crate::Error::ProofTooShort {
                len: self.inner.len(),
                min: PUBLIC_INPUTS_LEN,
            });
        }
        let (head, body) = self.inner.split_at(PUBLIC_INPUTS_LEN);
        let public_inputs = <&[u8; PUBLIC_INPUTS_LEN]>::try_from(head).map_err(|_| {
            crate::Error::ProofTooShort {
                len: self.inner.len(),
                min: PUBLIC_INPUTS_LEN,
            }
        })?;
        Ok((public_inputs, body))
    }

    pub fn public_inputs(&self) -> crate::Result<&[u8; PUBLIC_INPUTS_LEN]> {
        self.split().map(|(public_inputs, _)| public_inputs)
    }

    pub fn body(&self) -> crate::Result<&[u8]> {
        self.split().map(|(_, body)| body)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.inner))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner
    }
}

impl From<Vec<u8>> for Proof {
    fn from(inner: Vec<u8>) -> Self {
        Self::new(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_layout() {
        for len in [33usize, 64, 160, 1024] {
            let bytes: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let proof = Proof::new(bytes.clone());
            let (public_inputs, body) = proof.split().unwrap();
            assert_eq!(public_inputs.len(), 32);
            assert_eq!(&public_inputs[..], &bytes[..32]);
            assert_eq!(body, &bytes[32..]);
            assert_eq!(public_inputs.len() + body.len(), len);
        }
    }

    #[test]
    fn test_short_proof_rejected() {
        assert!(Proof::new(vec![0u8; 32]).split().is_err());
        assert!(Proof::new(vec![]).body().is_err());
    }

    #[test]
    fn test_hex() {
        assert_eq!(Proof::new(vec![0xab, 0x01]).to_hex(), "0xab01");
    }
}
