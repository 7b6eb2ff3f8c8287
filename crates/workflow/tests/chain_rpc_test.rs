//! JSON-RPC verifier client against a mock node

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use starter_common::{ErrorKind, Proof};
use starter_workflow::chain::{encode_verify_call, ChainVerifierBridge};
use starter_workflow::{ChainError, EthCallVerifier};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const VERIFIER: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

#[derive(Clone)]
struct MockNode {
    reply: Value,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn rpc_handler(State(node): State<MockNode>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    node.requests.lock().await.push(request);
    let mut reply = node.reply.clone();
    reply["id"] = id;
    Json(reply)
}

async fn spawn_node(reply: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let node = MockNode {
        reply,
        requests: requests.clone(),
    };
    let app = Router::new().route("/", post(rpc_handler)).with_state(node);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), requests)
}

fn sample_proof() -> Proof {
    let mut bytes = vec![0u8; 32];
    bytes[31] = 4;
    bytes.extend_from_slice(&[0xab; 128]);
    Proof::new(bytes)
}

fn bool_word(value: bool) -> String {
    format!("0x{:064x}", value as u8)
}

#[tokio::test]
async fn test_eth_call_true() {
    let (url, requests) = spawn_node(json!({"jsonrpc": "2.0", "result": bool_word(true)})).await;
    let bridge = ChainVerifierBridge::new(Arc::new(EthCallVerifier::new(url, VERIFIER).unwrap()));

    let proof = sample_proof();
    assert!(bridge.submit(&proof).await.unwrap());

    let requests = requests.lock().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request["jsonrpc"], "2.0");
    assert_eq!(request["method"], "eth_call");
    assert_eq!(request["params"][0]["to"], VERIFIER);
    assert_eq!(request["params"][1], "latest");

    let (public_inputs, body) = proof.split().unwrap();
    let expected = format!("0x{}", hex::encode(encode_verify_call(body, &[*public_inputs])));
    assert_eq!(request["params"][0]["data"], expected);
}

#[tokio::test]
async fn test_eth_call_false() {
    let (url, _) = spawn_node(json!({"jsonrpc": "2.0", "result": bool_word(false)})).await;
    let verifier = EthCallVerifier::new(url, VERIFIER).unwrap();
    let bridge = ChainVerifierBridge::new(Arc::new(verifier));

    assert!(!bridge.submit(&sample_proof()).await.unwrap());
}

#[tokio::test]
async fn test_revert_is_an_error() {
    let (url, _) = spawn_node(json!({
        "jsonrpc": "2.0",
        "error": {"code": 3, "message": "execution reverted", "data": "0x08c379a0"}
    }))
    .await;
    let bridge = ChainVerifierBridge::new(Arc::new(EthCallVerifier::new(url, VERIFIER).unwrap()));

    let err = bridge.submit(&sample_proof()).await.unwrap_err();
    assert!(matches!(err, ChainError::Reverted(_)), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::ChainVerificationError);
}

#[tokio::test]
async fn test_rpc_error() {
    let (url, _) = spawn_node(json!({
        "jsonrpc": "2.0",
        "error": {"code": -32602, "message": "invalid argument"}
    }))
    .await;
    let bridge = ChainVerifierBridge::new(Arc::new(EthCallVerifier::new(url, VERIFIER).unwrap()));

    match bridge.submit(&sample_proof()).await {
        Err(ChainError::Rpc { code, .. }) => assert_eq!(code, -32602),
        other => panic!("expected an RPC error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_result() {
    let (url, _) = spawn_node(json!({"jsonrpc": "2.0", "result": "0x01"})).await;
    let bridge = ChainVerifierBridge::new(Arc::new(EthCallVerifier::new(url, VERIFIER).unwrap()));

    assert!(matches!(
        bridge.submit(&sample_proof()).await,
        Err(ChainError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_unreachable_node() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let verifier = EthCallVerifier::new(format!("http://{}", addr), VERIFIER).unwrap();
    let err = ChainVerifierBridge::new(Arc::new(verifier))
        .submit(&sample_proof())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Transport(_)));
}
