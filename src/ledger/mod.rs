//! Ledger clients for the on-chain digest registry.
//!
//! The registry is an append-only key/value contract: `store(digest) -> id`,
//! `digest_by_id(id)` and the reverse index `id_by_digest(digest)`. Absence is
//! `Ok(None)`; errors are reserved for transport and submission failures.

pub mod abi;
pub mod evm;

use crate::{ContentDigest, RecordId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

pub use evm::{EvmLedger, EvmLedgerConfig};

/// Errors from ledger calls.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Network, timeout or HTTP-level failure. Safe to retry.
    #[error("transport error calling {method}: {reason}")]
    Transport { method: String, reason: String },
    /// The node refused the call or the transaction reverted.
    #[error("{method} rejected: {reason}")]
    Rejected { method: String, reason: String },
    /// The node answered with something we could not decode.
    #[error("malformed response to {method}: {reason}")]
    MalformedResponse { method: String, reason: String },
    /// No receipt was observed within the polling budget.
    #[error("transaction {tx_hash} not confirmed after {polls} receipt polls")]
    ConfirmationTimeout { tx_hash: String, polls: u32 },
    /// A value could not be encoded for the contract.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// The client was built with unusable settings.
    #[error("invalid ledger configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether the caller may retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ConfirmationTimeout { .. })
    }
}

/// Client for the digest registry contract.
pub trait Ledger: Send + Sync {
    /// Record `digest` and wait for one confirmation. Returns the assigned id.
    fn store(&self, digest: &ContentDigest) -> impl Future<Output = Result<RecordId, LedgerError>> + Send;

    /// Reverse lookup. `None` when the digest was never stored.
    fn id_by_digest(
        &self,
        digest: &ContentDigest,
    ) -> impl Future<Output = Result<Option<RecordId>, LedgerError>> + Send;

    /// Forward lookup. `None` when no record carries this id.
    fn digest_by_id(&self, id: RecordId) -> impl Future<Output = Result<Option<ContentDigest>, LedgerError>> + Send;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<ContentDigest>,
    index: HashMap<ContentDigest, RecordId>,
}

/// In-process registry for development and tests.
///
/// Ids start at 1. Storing a digest twice appends a second record and points
/// the reverse index at the newest id.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records written so far.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("memory ledger mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Ledger for MemoryLedger {
    async fn store(&self, digest: &ContentDigest) -> Result<RecordId, LedgerError> {
        let mut state = self.lock();
        let next = state.records.len() as u64 + 1;
        let id = RecordId::new(next).ok_or_else(|| LedgerError::Rejected {
            method: "store".into(),
            reason: "record id space exhausted".into(),
        })?;
        state.records.push(digest.clone());
        state.index.insert(digest.clone(), id);
        debug!(%digest, %id, "memory ledger stored digest");
        Ok(id)
    }

    async fn id_by_digest(&self, digest: &ContentDigest) -> Result<Option<RecordId>, LedgerError> {
        Ok(self.lock().index.get(digest).copied())
    }

    async fn digest_by_id(&self, id: RecordId) -> Result<Option<ContentDigest>, LedgerError> {
        let state = self.lock();
        let slot = usize::try_from(id.get() - 1).ok();
        Ok(slot.and_then(|i| state.records.get(i)).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
