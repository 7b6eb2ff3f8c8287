//! `eth_call` client for a Solidity verifier contract.

use alloy_primitives::{Bytes, B256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starter_common::PUBLIC_INPUTS_LEN;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{ChainError, VerifierContract};

sol! {
    function verify(bytes proof, bytes32[] publicInputs) external view returns (bool);
}

/// ABI calldata for `verify(bytes,bytes32[])`
pub fn encode_verify_call(
    proof_body: &[u8],
    public_inputs: &[[u8; PUBLIC_INPUTS_LEN]],
) -> Vec<u8> {
    verifyCall {
        proof: Bytes::copy_from_slice(proof_body),
        publicInputs: public_inputs.iter().map(|input| B256::from(*input)).collect(),
    }
    .abi_encode()
}

/// Decode the ABI-encoded `bool` returned by `verify`
pub fn decode_bool(returned: &[u8]) -> Result<bool, ChainError> {
    if returned.len() != 32 {
        return Err(ChainError::InvalidResponse(format!(
            "expected a 32-byte bool, got {} bytes",
            returned.len()
        )));
    }
    verifyCall::abi_decode_returns(returned, true)
        .map(|decoded| decoded._0)
        .map_err(|e| ChainError::InvalidResponse(e.to_string()))
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (CallObject, &'a str),
}

#[derive(Serialize)]
struct CallObject {
    to: String,
    data: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Calls the verifier through a node's JSON-RPC endpoint
pub struct EthCallVerifier {
    rpc_url: String,
    address: [u8; 20],
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl EthCallVerifier {
    pub fn new(rpc_url: impl Into<String>, address: &str) -> Result<Self, ChainError> {
        let digits = address.strip_prefix("0x").unwrap_or(address);
        let bytes =
            hex::decode(digits).map_err(|_| ChainError::InvalidAddress(address.to_string()))?;
        let address: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidAddress(address.to_string()))?;

        Ok(Self {
            rpc_url: rpc_url.into(),
            address,
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn address(&self) -> String {
        format!("0x{}", hex::encode(self.address))
    }
}

#[async_trait]
impl VerifierContract for EthCallVerifier {
    async fn verify(
        &self,
        proof_body: &[u8],
        public_inputs: &[[u8; PUBLIC_INPUTS_LEN]],
    ) -> Result<bool, ChainError> {
        let calldata = encode_verify_call(proof_body, public_inputs);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "eth_call",
            params: (
                CallObject {
                    to: self.address(),
                    data: format!("0x{}", hex::encode(calldata)),
                },
                "latest",
            ),
        };

        debug!(
            "eth_call {} on {} via {}",
            verifyCall::SIGNATURE,
            self.address(),
            self.rpc_url
        );
        let response = self.client.post(&self.rpc_url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ChainError::InvalidResponse(format!(
                "RPC endpoint returned {}",
                response.status()
            )));
        }
        let response: RpcResponse = response.json().await?;

        if let Some(error) = response.error {
            if error.code == 3 || error.message.contains("revert") {
                warn!("Verifier call reverted: {}", error.message);
                let detail = match error.data {
                    Some(data) => format!("{} ({})", error.message, data),
                    None => error.message,
                };
                return Err(ChainError::Reverted(detail));
            }
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| ChainError::InvalidResponse("response has no result".to_string()))?;
        let returned = hex::decode(result.strip_prefix("0x").unwrap_or(&result))
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        decode_bool(&returned)
    }
}
