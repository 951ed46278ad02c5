//! Local mirror of `{digest, owner, tokenId}` triples.
//!
//! The record store only saves ledger round-trips; nothing relies on it for
//! correctness. Only records marked `confirmed` (written after the ledger
//! returned the same digest for the token id) may stand in for a ledger read.
//! Duplicates are tolerated: [`RecordStore::insert_unless_present`] reports an
//! existing `(digest, tokenId)` pair instead of writing it again.

mod file;

use crate::ContentDigest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

pub use file::FileRecordStore;

/// Errors from record store backends.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cached copy of a ledger registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedHashRecord {
    pub digest: ContentDigest,
    pub owner: String,
    pub token_id: String,
    pub recorded_at: DateTime<Utc>,
    /// Set once the ledger has returned this digest for `token_id`.
    #[serde(default)]
    pub confirmed: bool,
}

impl CachedHashRecord {
    /// An unconfirmed record.
    pub fn new(digest: ContentDigest, owner: impl Into<String>, token_id: impl Into<String>) -> Self {
        Self { digest, owner: owner.into(), token_id: token_id.into(), recorded_at: Utc::now(), confirmed: false }
    }

    /// Mark the record as matching the ledger.
    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }
}

/// Result of a checked insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted(CachedHashRecord),
    Duplicate(CachedHashRecord),
}

impl StoreOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    pub fn record(&self) -> &CachedHashRecord {
        match self {
            Self::Inserted(r) | Self::Duplicate(r) => r,
        }
    }
}

/// Document-style store for cached hash records.
pub trait RecordStore: Send + Sync {
    /// Append unconditionally.
    fn insert(&self, record: CachedHashRecord) -> Result<(), RecordError>;

    /// First record matching both digest and token id.
    fn find(&self, digest: &ContentDigest, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError>;

    /// Most recent record for a token id.
    fn find_by_token(&self, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError>;

    /// Most recent ledger-confirmed record for a token id.
    fn find_confirmed_by_token(&self, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError>;

    /// Insert unless the `(digest, tokenId)` pair is already present.
    ///
    /// A confirmed record is still written when only an unconfirmed copy exists.
    fn insert_unless_present(&self, record: CachedHashRecord) -> Result<StoreOutcome, RecordError> {
        if let Some(existing) = self.find(&record.digest, &record.token_id)? {
            if existing.confirmed || !record.confirmed {
                return Ok(StoreOutcome::Duplicate(existing));
            }
        }
        self.insert(record.clone())?;
        Ok(StoreOutcome::Inserted(record))
    }
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<CachedHashRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CachedHashRecord>> {
        lock_records(&self.records)
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, record: CachedHashRecord) -> Result<(), RecordError> {
        self.lock().push(record);
        Ok(())
    }

    fn find(&self, digest: &ContentDigest, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError> {
        Ok(find_in(&self.lock(), digest, token_id))
    }

    fn find_by_token(&self, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError> {
        Ok(find_token_in(&self.lock(), token_id, false))
    }

    fn find_confirmed_by_token(&self, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError> {
        Ok(find_token_in(&self.lock(), token_id, true))
    }
}

pub(crate) fn lock_records(records: &Mutex<Vec<CachedHashRecord>>) -> MutexGuard<'_, Vec<CachedHashRecord>> {
    match records.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("record store mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Prefers a confirmed match over an unconfirmed one.
pub(crate) fn find_in(records: &[CachedHashRecord], digest: &ContentDigest, token_id: &str) -> Option<CachedHashRecord> {
    let mut matching = records.iter().filter(|r| r.digest.matches(digest) && r.token_id == token_id);
    let first = matching.next()?;
    if first.confirmed {
        return Some(first.clone());
    }
    Some(matching.find(|r| r.confirmed).unwrap_or(first).clone())
}

pub(crate) fn find_token_in(records: &[CachedHashRecord], token_id: &str, confirmed_only: bool) -> Option<CachedHashRecord> {
    records
        .iter()
        .rev()
        .find(|r| r.token_id == token_id && (r.confirmed || !confirmed_only))
        .cloned()
}
