use super::fingerprint;
use crate::ledger::Ledger;
use crate::records::{CachedHashRecord, RecordStore, StoreOutcome};
use crate::{CanonicalIdentifier, ContentDigest, IntegrityError, RecordId, Result};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// What a successful registration produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub canonical: CanonicalIdentifier,
    pub digest: ContentDigest,
    pub record_id: RecordId,
    /// False when the ledger write succeeded but the record store did not.
    pub cached: bool,
}

/// Runs the send-time pipeline: canonicalize, hash, record on the ledger,
/// mirror into the record store.
pub struct Registrar<L> {
    ledger: Arc<L>,
    records: Arc<dyn RecordStore>,
    span: tracing::Span,
}

impl<L: Ledger> Registrar<L> {
    pub fn new(ledger: Arc<L>, records: Arc<dyn RecordStore>) -> Self {
        Self { ledger, records, span: tracing::info_span!("registrar") }
    }

    /// Emit this component's events inside `span`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub async fn register(&self, file_reference: &str, owner: &str) -> Result<Registration> {
        async {
            if owner.trim().is_empty() {
                return Err(IntegrityError::InvalidInput("owner is required".into()));
            }
            let (canonical, digest) = fingerprint(file_reference)?;
            info!(%canonical, %digest, ledger = self.ledger.name(), "registering file");

            let record_id = self.ledger.store(&digest).await?;

            let record = CachedHashRecord::new(digest.clone(), owner, record_id.to_string()).confirmed();
            let cached = match self.records.insert_unless_present(record) {
                Ok(StoreOutcome::Inserted(_)) => true,
                Ok(StoreOutcome::Duplicate(existing)) => {
                    debug!(%record_id, owner = %existing.owner, "record already cached");
                    true
                }
                Err(e) => {
                    warn!(%record_id, error = %e, "ledger write succeeded but caching the record failed");
                    false
                }
            };

            info!(%record_id, cached, "file registered");
            Ok(Registration { canonical, digest, record_id, cached })
        }
        .instrument(self.span.clone())
        .await
    }

    /// Cache a record for a file that is already on the ledger under `token_id`.
    ///
    /// The ledger must hold the file's digest for that id; anything else is
    /// refused and nothing is written.
    pub async fn cache_existing(&self, file_reference: &str, owner: &str, token_id: &str) -> Result<StoreOutcome> {
        async {
            if owner.trim().is_empty() {
                return Err(IntegrityError::InvalidInput("owner is required".into()));
            }
            let id = RecordId::parse(token_id)?;
            let (_, digest) = fingerprint(file_reference)?;

            let on_ledger = self
                .ledger
                .digest_by_id(id)
                .await?
                .ok_or_else(|| IntegrityError::NotFound(format!("no ledger record for token id {id}")))?;
            if !on_ledger.matches(&digest) {
                warn!(%id, %digest, expected = %on_ledger, "refusing to cache a digest the ledger does not hold");
                return Err(IntegrityError::Conflict(format!(
                    "ledger record {id} holds a different digest"
                )));
            }

            let outcome = self
                .records
                .insert_unless_present(CachedHashRecord::new(digest, owner, id.to_string()).confirmed())?;
            info!(%id, duplicate = outcome.is_duplicate(), "hash record cached");
            Ok(outcome)
        }
        .instrument(self.span.clone())
        .await
    }
}
