mod common;

use chat_ledger::api::{routes, AppState};
use chat_ledger::ledger::{Ledger, MemoryLedger};
use chat_ledger::records::MemoryRecordStore;
use chat_ledger::ContentDigest;
use common::{UnreachableLedger, CAT, CAT_DIGEST, DOG};
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

fn state<L: Ledger>(ledger: Arc<L>) -> Arc<AppState<L>> {
    Arc::new(AppState::new(ledger, Arc::new(MemoryRecordStore::new())))
}

async fn post<F>(api: &F, path: &str, body: Value) -> (StatusCode, Value)
where
    F: Filter + 'static,
    F::Extract: warp::Reply + Send,
{
    let resp = warp::test::request().method("POST").path(path).json(&body).reply(api).await;
    (resp.status(), serde_json::from_slice(resp.body()).unwrap())
}

async fn get<F>(api: &F, path: &str) -> (StatusCode, Value)
where
    F: Filter + 'static,
    F::Extract: warp::Reply + Send,
{
    let resp = warp::test::request().method("GET").path(path).reply(api).await;
    (resp.status(), serde_json::from_slice(resp.body()).unwrap())
}

#[tokio::test]
async fn api_register_and_verify_flow() {
    let api = routes(state(Arc::new(MemoryLedger::new())));

    let (status, body) = post(&api, "/api/files", json!({ "fileUrl": CAT, "owner": "alice" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["canonical"], "res.cloudinary.com/demo/cat.png");
    assert_eq!(body["digest"], CAT_DIGEST);
    assert_eq!(body["recordId"], 1);
    assert_eq!(body["cached"], true);

    let (status, body) =
        post(&api, "/api/verify", json!({ "fileReference": CAT, "owner": "alice", "tokenId": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
    assert_eq!(body["status"], "verified");
    assert_eq!(body["source"], "cache");

    let (status, body) =
        post(&api, "/api/verify", json!({ "fileReference": DOG, "owner": "alice", "tokenId": "1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
    assert_eq!(body["status"], "mismatch");
    assert_eq!(body["expectedDigest"], CAT_DIGEST);

    let (status, body) =
        post(&api, "/api/verify", json!({ "fileReference": CAT, "owner": "alice", "tokenId": 99 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn api_verify_digest_accepts_prefixed_hex() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.store(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap();
    let api = routes(state(ledger));

    let (status, body) = post(&api, "/api/verify-digest", json!({ "computedHash": format!("0x{CAT_DIGEST}") })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
    assert_eq!(body["source"], "ledger");

    let (status, body) = post(&api, "/api/verify-digest", json!({ "computedHash": "0xabc" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "invalid");
}

#[tokio::test]
async fn api_digest_endpoint_needs_no_ledger() {
    let api = routes(state(Arc::new(UnreachableLedger)));
    let (status, body) = post(&api, "/api/digest", json!({ "imageUrl": CAT })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["digest"], CAT_DIGEST);
}

#[tokio::test]
async fn api_store_hash_then_get_hash() {
    let ledger = Arc::new(MemoryLedger::new());
    let id = ledger.store(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap();
    let api = routes(state(ledger));
    let claim = json!({ "fileUrl": CAT, "owner": "alice", "tokenId": id.to_string() });

    let (status, body) = post(&api, "/api/store-hash", claim.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["record"]["digest"], CAT_DIGEST);
    assert_eq!(body["record"]["confirmed"], true);

    let (_, body) = post(&api, "/api/store-hash", claim).await;
    assert_eq!(body["duplicate"], true);

    let (status, body) = get(&api, &format!("/api/get-hash/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["digest"], CAT_DIGEST);
    assert_eq!(body["owner"], "alice");
    assert_eq!(body["source"], "cache");
}

#[tokio::test]
async fn api_store_hash_cannot_override_the_ledger() {
    let ledger = Arc::new(MemoryLedger::new());
    let api = routes(state(ledger.clone()));

    let (status, _) = post(&api, "/api/files", json!({ "fileUrl": CAT, "owner": "alice" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let tampered = json!({ "fileUrl": DOG, "owner": "mallory", "tokenId": 1 });
    let (_, body) = post(&api, "/api/verify", tampered.clone()).await;
    assert_eq!(body["status"], "mismatch");

    let (status, body) = post(&api, "/api/store-hash", tampered.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], 1003);

    let (status, body) = post(&api, "/api/verify", tampered).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "mismatch");
    assert_eq!(body["expectedDigest"], CAT_DIGEST);

    let unassigned = json!({ "fileUrl": DOG, "owner": "mallory", "tokenId": 77 });
    let (status, _) = post(&api, "/api/store-hash", unassigned.clone()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = post(&api, "/api/verify", unassigned).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");
    let (status, _) = get(&api, "/api/get-hash/77").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn api_store_hash_needs_ledger() {
    let api = routes(state(Arc::new(UnreachableLedger)));
    let (status, body) = post(&api, "/api/store-hash", json!({ "fileUrl": CAT, "owner": "alice", "tokenId": 1 })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["retryable"], true);
}

#[tokio::test]
async fn api_get_hash_falls_back_to_ledger() {
    let ledger = Arc::new(MemoryLedger::new());
    let id = ledger.store(&ContentDigest::from_hex(CAT_DIGEST).unwrap()).await.unwrap();
    let api = routes(state(ledger));

    let (status, body) = get(&api, &format!("/api/get-hash/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "ledger");
    assert!(body.get("owner").is_none());

    let (status, body) = get(&api, "/api/get-hash/2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 1002);

    let (status, _) = get(&api, "/api/get-hash/nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_rejects_bad_requests() {
    let api = routes(state(Arc::new(MemoryLedger::new())));

    let (status, body) = post(&api, "/api/files", json!({ "owner": "alice" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 1001);

    let (status, _) = post(&api, "/api/verify", json!({ "fileUrl": CAT, "owner": "alice" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&api, "/api/files", json!({ "fileUrl": "ftp://x.com/a.png", "owner": "alice" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let resp = warp::test::request().method("POST").path("/api/files").body("{not json").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, _) = get(&api, "/api/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_unreachable_ledger_is_bad_gateway() {
    let api = routes(state(Arc::new(UnreachableLedger)));

    let (status, body) =
        post(&api, "/api/verify", json!({ "fileUrl": CAT, "owner": "alice", "tokenId": 1 })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], 5001);
    assert_eq!(body["error"]["retryable"], true);

    let (status, _) = post(&api, "/api/files", json!({ "fileUrl": CAT, "owner": "alice" })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
