use crate::integrity::{Registration, VerificationReport};
use crate::records::CachedHashRecord;
use crate::{ContentDigest, IntegrityError, RecordId};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;

/// Token ids arrive as JSON strings from some clients and numbers from others.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TokenId {
    Text(String),
    Number(u64),
}

impl TokenId {
    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Body for `POST /api/files`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(alias = "fileUrl", alias = "imageUrl")]
    pub file_reference: Option<String>,
    pub owner: Option<String>,
}

/// Body for `POST /api/verify` and `POST /api/store-hash`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileClaimRequest {
    #[serde(alias = "fileUrl", alias = "imageUrl")]
    pub file_reference: Option<String>,
    pub owner: Option<String>,
    pub token_id: Option<TokenId>,
}

/// Body for `POST /api/verify-digest`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestRequest {
    #[serde(alias = "digest")]
    pub computed_hash: Option<String>,
}

/// Body for `POST /api/digest`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintRequest {
    #[serde(alias = "fileUrl", alias = "imageUrl")]
    pub file_reference: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub canonical: String,
    pub digest: ContentDigest,
    pub record_id: RecordId,
    pub cached: bool,
}

impl From<Registration> for RegisterResponse {
    fn from(reg: Registration) -> Self {
        Self {
            canonical: reg.canonical.to_string(),
            digest: reg.digest,
            record_id: reg.record_id,
            cached: reg.cached,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub verified: bool,
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<ContentDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_digest: Option<ContentDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_matches: Option<bool>,
}

impl From<VerificationReport> for VerifyResponse {
    fn from(report: VerificationReport) -> Self {
        Self {
            verified: report.verdict.is_verified(),
            status: report.verdict.status(),
            message: report.message,
            canonical: report.canonical.map(|c| c.to_string()),
            digest: report.digest,
            expected_digest: report.expected,
            record_id: report.record_id,
            source: report.source.map(|s| s.as_str()),
            owner_matches: report.owner_matches,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintResponse {
    pub canonical: String,
    pub digest: ContentDigest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHashResponse {
    pub duplicate: bool,
    pub record: CachedHashRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashLookupResponse {
    pub token_id: String,
    pub digest: ContentDigest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub source: &'static str,
}

/// Error codes carried in error bodies
pub mod error_codes {
    pub const INVALID_INPUT: u32 = 1001;
    pub const NOT_FOUND: u32 = 1002;
    pub const LEDGER_CONFLICT: u32 = 1003;
    pub const UPSTREAM_FAILURE: u32 = 5001;
    pub const INTERNAL_CONSISTENCY: u32 = 5002;
    pub const RECORD_STORE: u32 = 5003;
    pub const INTERNAL_ERROR: u32 = 5000;
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// An error response: HTTP status plus a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: u32, message: impl Into<String>) -> Self {
        Self { status, body: ErrorBody { code, message: message.into(), retryable: false } }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_INPUT, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, message)
    }

    pub fn into_reply(self) -> Box<dyn warp::Reply> {
        Box::new(warp::reply::with_status(
            warp::reply::json(&ErrorEnvelope { error: self.body }),
            self.status,
        ))
    }
}

/// Convert IntegrityError to an HTTP error response
impl From<IntegrityError> for ApiError {
    fn from(error: IntegrityError) -> Self {
        match error {
            IntegrityError::InvalidInput(reason) => Self::invalid(reason),
            IntegrityError::NotFound(reason) => Self::not_found(reason),
            IntegrityError::Conflict(reason) => Self::new(StatusCode::CONFLICT, error_codes::LEDGER_CONFLICT, reason),
            IntegrityError::Upstream(e) => {
                let mut err = Self::new(StatusCode::BAD_GATEWAY, error_codes::UPSTREAM_FAILURE, e.to_string());
                err.body.retryable = e.is_retryable();
                err
            }
            IntegrityError::InternalConsistency(reason) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_CONSISTENCY, reason)
            }
            IntegrityError::Records(e) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_codes::RECORD_STORE, e.to_string())
            }
        }
    }
}
