pub mod api;
pub mod config;
pub mod integrity;
pub mod ledger;
pub mod records;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use ledger::LedgerError;
pub use records::RecordError;

/// Number of hex characters in a SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Normalized string form of a file URL, used as the hashing input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalIdentifier(String);

impl CanonicalIdentifier {
    /// Wrap an already-canonical string. Empty strings are rejected.
    pub(crate) fn new(value: String) -> Result<Self> {
        if value.is_empty() {
            return Err(IntegrityError::InvalidInput("canonical identifier is empty".into()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 256-bit digest held as 64 lowercase hex characters, without a `0x` prefix.
///
/// This is the only digest representation used inside the crate; the
/// `0x`-prefixed bytes32 form exists only at the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Parse a digest, accepting an optional `0x` prefix and upper-case hex.
    pub fn from_hex(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex_part.len() != DIGEST_HEX_LEN {
            return Err(IntegrityError::InvalidInput(format!(
                "digest must be {DIGEST_HEX_LEN} hex characters, got {}",
                hex_part.len()
            )));
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IntegrityError::InvalidInput("digest contains non-hex characters".into()));
        }
        Ok(Self(hex_part.to_ascii_lowercase()))
    }

    /// Build from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// True for the all-zero word the contract returns for unset slots.
    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    /// Compare against another digest without regard to hex letter case.
    pub fn matches(&self, other: &ContentDigest) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = IntegrityError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Integer handle assigned by the ledger to a stored digest. Zero is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Returns `None` for the contract's zero sentinel.
    pub fn new(value: u64) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Parse a client-supplied token id.
    pub fn parse(value: &str) -> Result<Self> {
        let parsed: u64 = value
            .trim()
            .parse()
            .map_err(|_| IntegrityError::InvalidInput(format!("token id {value:?} is not an integer")))?;
        Self::new(parsed).ok_or_else(|| IntegrityError::InvalidInput("token id must be positive".into()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error types for the integrity subsystem
#[derive(thiserror::Error, Debug)]
pub enum IntegrityError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("ledger failure: {0}")]
    Upstream(#[from] LedgerError),
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),
    #[error("record store failure: {0}")]
    Records(#[from] RecordError),
}

pub type Result<T> = std::result::Result<T, IntegrityError>;
