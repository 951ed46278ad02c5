//! HTTP surface consumed by the chat UI.

pub mod protocol;

use crate::integrity::{fingerprint, Registrar, Verdict, Verifier};
use crate::ledger::Ledger;
use crate::records::{RecordStore, StoreOutcome};
use crate::RecordId;
use protocol::{
    error_codes, ApiError, DigestRequest, FileClaimRequest, FingerprintRequest, FingerprintResponse,
    HashLookupResponse, RegisterRequest, RegisterResponse, StoreHashResponse, VerifyResponse,
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Maximum accepted JSON body size.
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Shared handler state.
pub struct AppState<L> {
    pub registrar: Registrar<L>,
    pub verifier: Verifier<L>,
    pub ledger: Arc<L>,
    pub records: Arc<dyn RecordStore>,
}

impl<L: Ledger> AppState<L> {
    pub fn new(ledger: Arc<L>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            registrar: Registrar::new(ledger.clone(), records.clone()),
            verifier: Verifier::new(ledger.clone(), records.clone()),
            ledger,
            records,
        }
    }
}

/// All API routes, with rejections rendered as JSON errors.
pub fn routes<L: Ledger + 'static>(
    state: Arc<AppState<L>>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let register = warp::path!("api" / "files")
        .and(warp::post())
        .and(json_body::<RegisterRequest>())
        .and(with_state(state.clone()))
        .and_then(register_handler::<L>);

    let verify = warp::path!("api" / "verify")
        .and(warp::post())
        .and(json_body::<FileClaimRequest>())
        .and(with_state(state.clone()))
        .and_then(verify_handler::<L>);

    let verify_digest = warp::path!("api" / "verify-digest")
        .and(warp::post())
        .and(json_body::<DigestRequest>())
        .and(with_state(state.clone()))
        .and_then(verify_digest_handler::<L>);

    let digest = warp::path!("api" / "digest")
        .and(warp::post())
        .and(json_body::<FingerprintRequest>())
        .and_then(digest_handler);

    let store_hash = warp::path!("api" / "store-hash")
        .and(warp::post())
        .and(json_body::<FileClaimRequest>())
        .and(with_state(state.clone()))
        .and_then(store_hash_handler::<L>);

    let get_hash = warp::path!("api" / "get-hash" / String)
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_hash_handler::<L>);

    register
        .or(verify)
        .or(verify_digest)
        .or(digest)
        .or(store_hash)
        .or(get_hash)
        .recover(handle_rejection)
}

fn with_state<L: Ledger + 'static>(
    state: Arc<AppState<L>>,
) -> impl Filter<Extract = (Arc<AppState<L>>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

type HandlerResult = Result<Box<dyn Reply>, Rejection>;

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
    field
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::invalid(format!("missing required field: {name}")))
}

fn json_reply<T: serde::Serialize>(body: &T, status: StatusCode) -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(warp::reply::json(body), status))
}

fn error_reply(err: ApiError) -> HandlerResult {
    if err.status.is_server_error() {
        error!(status = %err.status, code = err.body.code, message = %err.body.message, "request failed");
    }
    Ok(err.into_reply())
}

async fn register_handler<L: Ledger>(req: RegisterRequest, state: Arc<AppState<L>>) -> HandlerResult {
    let (file_reference, owner) = match (required(req.file_reference, "fileReference"), required(req.owner, "owner")) {
        (Ok(f), Ok(o)) => (f, o),
        (Err(e), _) | (_, Err(e)) => return error_reply(e),
    };
    match state.registrar.register(&file_reference, &owner).await {
        Ok(reg) => Ok(json_reply(&RegisterResponse::from(reg), StatusCode::CREATED)),
        Err(e) => error_reply(e.into()),
    }
}

async fn verify_handler<L: Ledger>(req: FileClaimRequest, state: Arc<AppState<L>>) -> HandlerResult {
    let token_id = req.token_id.map(|t| t.into_string());
    let fields = (
        required(req.file_reference, "fileReference"),
        required(req.owner, "owner"),
        required(token_id, "tokenId"),
    );
    let (file_reference, owner, token_id) = match fields {
        (Ok(f), Ok(o), Ok(t)) => (f, o, t),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return error_reply(e),
    };

    match state.verifier.verify(&file_reference, &owner, &token_id).await {
        Ok(report) => {
            let status = verdict_status(&report.verdict);
            Ok(json_reply(&VerifyResponse::from(report), status))
        }
        Err(e) => error_reply(e.into()),
    }
}

async fn verify_digest_handler<L: Ledger>(req: DigestRequest, state: Arc<AppState<L>>) -> HandlerResult {
    let computed = match required(req.computed_hash, "computedHash") {
        Ok(c) => c,
        Err(e) => return error_reply(e),
    };
    match state.verifier.verify_digest(&computed).await {
        Ok(report) => {
            let status = verdict_status(&report.verdict);
            Ok(json_reply(&VerifyResponse::from(report), status))
        }
        Err(e) => error_reply(e.into()),
    }
}

async fn digest_handler(req: FingerprintRequest) -> HandlerResult {
    let file_reference = match required(req.file_reference, "fileReference") {
        Ok(f) => f,
        Err(e) => return error_reply(e),
    };
    match fingerprint(&file_reference) {
        Ok((canonical, digest)) => Ok(json_reply(
            &FingerprintResponse { canonical: canonical.to_string(), digest },
            StatusCode::OK,
        )),
        Err(e) => error_reply(e.into()),
    }
}

async fn store_hash_handler<L: Ledger>(req: FileClaimRequest, state: Arc<AppState<L>>) -> HandlerResult {
    let token_id = req.token_id.map(|t| t.into_string());
    let fields = (
        required(req.file_reference, "fileReference"),
        required(req.owner, "owner"),
        required(token_id, "tokenId"),
    );
    let (file_reference, owner, token_id) = match fields {
        (Ok(f), Ok(o), Ok(t)) => (f, o, t),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return error_reply(e),
    };

    match state.registrar.cache_existing(&file_reference, &owner, &token_id).await {
        Ok(outcome) => {
            let duplicate = outcome.is_duplicate();
            let record = match outcome {
                StoreOutcome::Inserted(r) | StoreOutcome::Duplicate(r) => r,
            };
            Ok(json_reply(&StoreHashResponse { duplicate, record }, StatusCode::OK))
        }
        Err(e) => error_reply(e.into()),
    }
}

async fn get_hash_handler<L: Ledger>(token_id: String, state: Arc<AppState<L>>) -> HandlerResult {
    match state.records.find_confirmed_by_token(&token_id) {
        Ok(Some(record)) => {
            return Ok(json_reply(
                &HashLookupResponse {
                    token_id: record.token_id,
                    digest: record.digest,
                    owner: Some(record.owner),
                    source: "cache",
                },
                StatusCode::OK,
            ))
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(%token_id, error = %e, "record store lookup failed, falling back to ledger"),
    }

    let id = match RecordId::parse(&token_id) {
        Ok(id) => id,
        Err(e) => return error_reply(e.into()),
    };
    match state.ledger.digest_by_id(id).await {
        Ok(Some(digest)) => Ok(json_reply(
            &HashLookupResponse { token_id, digest, owner: None, source: "ledger" },
            StatusCode::OK,
        )),
        Ok(None) => error_reply(ApiError::not_found(format!("no hash recorded for token id {id}"))),
        Err(e) => error_reply(crate::IntegrityError::from(e).into()),
    }
}

fn verdict_status(verdict: &Verdict) -> StatusCode {
    match verdict {
        Verdict::Verified | Verdict::Mismatch => StatusCode::OK,
        Verdict::NotFound => StatusCode::NOT_FOUND,
        Verdict::Invalid(_) => StatusCode::BAD_REQUEST,
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Box<dyn Reply>, Infallible> {
    let err = if rejection.is_not_found() {
        ApiError::not_found("no such endpoint")
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::invalid(format!("invalid JSON body: {e}"))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, error_codes::INVALID_INPUT, "request body too large")
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        ApiError::new(StatusCode::LENGTH_REQUIRED, error_codes::INVALID_INPUT, "content-length header required")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::new(StatusCode::METHOD_NOT_ALLOWED, error_codes::INVALID_INPUT, "method not allowed")
    } else {
        error!(?rejection, "unhandled rejection");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR, "internal server error")
    };
    Ok(err.into_reply())
}
