//! EvmLedger against a wiremock JSON-RPC node.

mod common;

use chat_ledger::ledger::abi::{event_topic, selector_hex};
use chat_ledger::ledger::{EvmLedger, EvmLedgerConfig, Ledger};
use chat_ledger::{ContentDigest, LedgerError, RecordId};
use common::{CAT_DIGEST, DOG_DIGEST};
use serde_json::{json, Value};
use std::sync::Mutex;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const FROM: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const TX_HASH: &str = "0x8e1f3c5f0c6f4f4c9d7b2b8f0f2e9a1c3d5e7f9a1b3c5d7e9f1a3b5c7d9e1f3a";

/// Minimal registry node: keeps stored words in order and answers the three
/// contract calls from that list.
struct FakeNode {
    receipt_status: &'static str,
    words: Mutex<Vec<String>>,
}

impl FakeNode {
    fn new(receipt_status: &'static str) -> Self {
        Self { receipt_status, words: Mutex::new(Vec::new()) }
    }

    fn call(&self, data: &str) -> Value {
        let (selector, arg) = (&data[2..10], &data[10..]);
        let words = self.words.lock().unwrap();
        if selector == selector_hex("getImageHashId(bytes32)") {
            let id = words.iter().rposition(|w| w == arg).map_or(0, |i| i + 1);
            json!(format!("0x{id:064x}"))
        } else if selector == selector_hex("getHashById(uint256)") {
            let id = usize::from_str_radix(arg, 16).unwrap();
            let word = id
                .checked_sub(1)
                .and_then(|i| words.get(i))
                .cloned()
                .unwrap_or_else(|| "0".repeat(64));
            json!(format!("0x{word}"))
        } else {
            panic!("unexpected selector {selector}");
        }
    }
}

impl Respond for FakeNode {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let params = &body["params"];
        let result = match body["method"].as_str().unwrap() {
            "eth_sendTransaction" => {
                let data = params[0]["data"].as_str().unwrap();
                assert_eq!(&data[2..10], selector_hex("storeImageHash(bytes32)"));
                self.words.lock().unwrap().push(data[10..].to_string());
                json!(TX_HASH)
            }
            "eth_getTransactionReceipt" => {
                let id = self.words.lock().unwrap().len();
                json!({
                    "transactionHash": TX_HASH,
                    "status": self.receipt_status,
                    "blockNumber": "0x10",
                    "logs": [stored_log(id)],
                })
            }
            "eth_call" => {
                assert_eq!(params[1], "latest");
                self.call(params[0]["data"].as_str().unwrap())
            }
            other => panic!("unexpected method {other}"),
        };
        ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": body["id"], "result": result }))
    }
}

fn stored_log(id: usize) -> Value {
    json!({
        "address": CONTRACT.to_lowercase(),
        "topics": [event_topic("HashStored(uint256,bytes32)"), format!("0x{id:064x}")],
        "data": format!("0x{CAT_DIGEST}"),
    })
}

fn ledger(server: &MockServer) -> EvmLedger {
    let config = EvmLedgerConfig::new(server.uri(), CONTRACT, FROM).with_polling(10, 3);
    EvmLedger::new(config).expect("ledger build")
}

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn rpc_method(name: &str) -> impl wiremock::Match {
    body_partial_json(json!({ "method": name }))
}

#[tokio::test]
async fn evm_store_then_lookup_both_ways() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(FakeNode::new("0x1")).mount(&server).await;
    let ledger = ledger(&server);

    let cat = ContentDigest::from_hex(CAT_DIGEST).unwrap();
    let dog = ContentDigest::from_hex(DOG_DIGEST).unwrap();

    let id = ledger.store(&cat).await.unwrap();
    assert_eq!(id.get(), 1);
    assert_eq!(ledger.id_by_digest(&cat).await.unwrap(), Some(id));
    assert_eq!(ledger.digest_by_id(id).await.unwrap(), Some(cat));

    assert_eq!(ledger.id_by_digest(&dog).await.unwrap(), None);
    assert_eq!(ledger.digest_by_id(RecordId::new(7).unwrap()).await.unwrap(), None);
}

#[tokio::test]
async fn evm_store_sends_expected_transaction() {
    let server = MockServer::start().await;
    let data = format!("0x{}{CAT_DIGEST}", selector_hex("storeImageHash(bytes32)"));

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_sendTransaction",
            "params": [{ "from": FROM, "to": CONTRACT, "data": data, "gas": "0xf4240" }],
        })))
        .respond_with(rpc_result(json!(TX_HASH)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(rpc_method("eth_getTransactionReceipt"))
        .respond_with(rpc_result(json!({ "status": "0x1", "blockNumber": "0x2a" })))
        .mount(&server)
        .await;
    // No HashStored log: the id comes from the reverse index at the receipt's block.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call", "params": [{ "to": CONTRACT }, "0x2a"] })))
        .respond_with(rpc_result(json!(format!("0x{:064x}", 5))))
        .expect(1)
        .mount(&server)
        .await;

    let id = ledger(&server).store(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap();
    assert_eq!(id.get(), 5);
}

#[tokio::test]
async fn evm_store_takes_id_from_receipt_log() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(rpc_method("eth_sendTransaction"))
        .respond_with(rpc_result(json!(TX_HASH)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(rpc_method("eth_getTransactionReceipt"))
        .respond_with(rpc_result(json!({ "status": "0x1", "blockNumber": "0x2a", "logs": [stored_log(9)] })))
        .mount(&server)
        .await;
    // A lagging or raced reverse index would disagree; it must not be consulted.
    Mock::given(method("POST"))
        .and(rpc_method("eth_call"))
        .respond_with(rpc_result(json!(format!("0x{:064x}", 5))))
        .expect(0)
        .mount(&server)
        .await;

    let id = ledger(&server).store(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap();
    assert_eq!(id.get(), 9);
}

#[tokio::test]
async fn evm_reverted_store_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(FakeNode::new("0x0")).mount(&server).await;

    let err = ledger(&server).store(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Rejected { .. }), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn evm_missing_receipt_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(rpc_method("eth_sendTransaction"))
        .respond_with(rpc_result(json!(TX_HASH)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(rpc_method("eth_getTransactionReceipt"))
        .respond_with(rpc_result(Value::Null))
        .expect(3)
        .mount(&server)
        .await;

    let err = ledger(&server).store(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap_err();
    assert!(matches!(err, LedgerError::ConfirmationTimeout { polls: 3, .. }), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn evm_rpc_error_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted" },
        })))
        .mount(&server)
        .await;

    let err = ledger(&server).digest_by_id(RecordId::new(1).unwrap()).await.unwrap_err();
    match err {
        LedgerError::Rejected { reason, .. } => assert_eq!(reason, "execution reverted"),
        other => panic!("expected Rejected, got {other}"),
    }
}

#[tokio::test]
async fn evm_http_failure_is_retryable_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

    let err = ledger(&server).id_by_digest(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Transport { .. }), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn evm_short_result_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(rpc_result(json!("0x1234"))).mount(&server).await;

    let err = ledger(&server).digest_by_id(RecordId::new(1).unwrap()).await.unwrap_err();
    assert!(matches!(err, LedgerError::MalformedResponse { .. }), "{err}");
}
