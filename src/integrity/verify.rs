//! Re-derive a file's digest and reconcile it with the recorded value.
//!
//! One linear pass per request: validate, canonicalize, hash, look up the
//! expected digest, compare. The ledger is authoritative. A ledger-confirmed
//! record store entry for the token id may stand in for the ledger read;
//! unconfirmed entries are ignored. Ledger failures propagate unchanged; they
//! are never folded into a `Mismatch`.

use super::fingerprint;
use crate::ledger::Ledger;
use crate::records::RecordStore;
use crate::{CanonicalIdentifier, ContentDigest, IntegrityError, RecordId, Result};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Outcome of a verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Mismatch,
    NotFound,
    Invalid(String),
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Stable machine-readable name.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Mismatch => "mismatch",
            Self::NotFound => "not_found",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Where the expected digest was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSource {
    Ledger,
    Cache,
}

impl ExpectedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ledger => "ledger",
            Self::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub verdict: Verdict,
    pub canonical: Option<CanonicalIdentifier>,
    /// Digest recomputed from the presented reference.
    pub digest: Option<ContentDigest>,
    pub expected: Option<ContentDigest>,
    pub record_id: Option<RecordId>,
    pub source: Option<ExpectedSource>,
    /// Whether a cached owner agrees with the claimed one. Informational only.
    pub owner_matches: Option<bool>,
    pub message: String,
}

impl VerificationReport {
    fn invalid(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            message: reason.clone(),
            verdict: Verdict::Invalid(reason),
            canonical: None,
            digest: None,
            expected: None,
            record_id: None,
            source: None,
            owner_matches: None,
        }
    }
}

struct Expected {
    digest: ContentDigest,
    source: ExpectedSource,
    cached_owner: Option<String>,
}

/// Verification orchestrator.
pub struct Verifier<L> {
    ledger: Arc<L>,
    records: Arc<dyn RecordStore>,
    span: tracing::Span,
}

impl<L: Ledger> Verifier<L> {
    pub fn new(ledger: Arc<L>, records: Arc<dyn RecordStore>) -> Self {
        Self { ledger, records, span: tracing::info_span!("verifier") }
    }

    /// Emit this component's events inside `span`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Verify a file reference against the record for `claimed_token_id`.
    ///
    /// An empty token id resolves the record through the ledger's reverse
    /// index instead.
    pub async fn verify(
        &self,
        file_reference: &str,
        claimed_owner: &str,
        claimed_token_id: &str,
    ) -> Result<VerificationReport> {
        async {
            info!(file_reference, claimed_owner, claimed_token_id, "verification requested");

            if claimed_owner.trim().is_empty() {
                return Ok(VerificationReport::invalid("owner is required"));
            }
            let token = match claimed_token_id.trim() {
                "" => None,
                raw => match RecordId::parse(raw) {
                    Ok(id) => Some(id),
                    Err(IntegrityError::InvalidInput(reason)) => return Ok(VerificationReport::invalid(reason)),
                    Err(other) => return Err(other),
                },
            };
            let (canonical, digest) = match fingerprint(file_reference) {
                Ok(pair) => pair,
                Err(IntegrityError::InvalidInput(reason)) => return Ok(VerificationReport::invalid(reason)),
                Err(other) => return Err(other),
            };
            debug!(%canonical, %digest, "recomputed fingerprint");

            let record_id = match token {
                Some(id) => Some(id),
                None => self.ledger.id_by_digest(&digest).await?,
            };

            let expected = match record_id {
                Some(id) => self.expected_for(id).await?,
                None => None,
            };

            let report = conclude(Some(canonical), digest, record_id, expected, claimed_owner);
            log_verdict(&report);
            Ok(report)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Verify a digest the client computed itself.
    pub async fn verify_digest(&self, digest_hex: &str) -> Result<VerificationReport> {
        async {
            info!(digest = digest_hex, "digest verification requested");
            let digest = match ContentDigest::from_hex(digest_hex) {
                Ok(d) => d,
                Err(IntegrityError::InvalidInput(reason)) => return Ok(VerificationReport::invalid(reason)),
                Err(other) => return Err(other),
            };

            let record_id = self.ledger.id_by_digest(&digest).await?;
            let expected = match record_id {
                Some(id) => self.expected_for(id).await?,
                None => None,
            };

            let report = conclude(None, digest, record_id, expected, "");
            log_verdict(&report);
            Ok(report)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn expected_for(&self, id: RecordId) -> Result<Option<Expected>> {
        match self.records.find_confirmed_by_token(&id.to_string()) {
            Ok(Some(record)) => {
                debug!(%id, "expected digest served from record store");
                return Ok(Some(Expected {
                    digest: record.digest,
                    source: ExpectedSource::Cache,
                    cached_owner: Some(record.owner),
                }));
            }
            Ok(None) => {}
            Err(e) => warn!(%id, error = %e, "record store lookup failed, falling back to ledger"),
        }

        let stored = self.ledger.digest_by_id(id).await?;
        Ok(stored.map(|digest| Expected { digest, source: ExpectedSource::Ledger, cached_owner: None }))
    }
}

fn conclude(
    canonical: Option<CanonicalIdentifier>,
    digest: ContentDigest,
    record_id: Option<RecordId>,
    expected: Option<Expected>,
    claimed_owner: &str,
) -> VerificationReport {
    let Some(expected) = expected else {
        return VerificationReport {
            verdict: Verdict::NotFound,
            canonical,
            digest: Some(digest),
            expected: None,
            record_id,
            source: None,
            owner_matches: None,
            message: "No ledger record found for this file.".into(),
        };
    };

    let (verdict, message) = if digest.matches(&expected.digest) {
        (Verdict::Verified, "File integrity verified.")
    } else {
        (Verdict::Mismatch, "File integrity check failed!")
    };
    let owner_matches = match (&expected.cached_owner, claimed_owner) {
        (Some(owner), claimed) if !claimed.is_empty() => Some(owner == claimed),
        _ => None,
    };

    VerificationReport {
        verdict,
        canonical,
        digest: Some(digest),
        expected: Some(expected.digest),
        record_id,
        source: Some(expected.source),
        owner_matches,
        message: message.into(),
    }
}

fn log_verdict(report: &VerificationReport) {
    match &report.verdict {
        Verdict::Mismatch => warn!(
            record_id = ?report.record_id,
            digest = ?report.digest,
            expected = ?report.expected,
            "digest mismatch"
        ),
        verdict => info!(record_id = ?report.record_id, status = verdict.status(), "verification finished"),
    }
}
