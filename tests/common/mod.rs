#![allow(dead_code)]

use chat_ledger::ledger::Ledger;
use chat_ledger::{ContentDigest, LedgerError, RecordId};

pub const CAT: &str = "https://res.cloudinary.com/demo/image/upload/v1741156546/cat.png";
pub const DOG: &str = "https://res.cloudinary.com/demo/image/upload/v1741156546/dog.png";

/// sha256("res.cloudinary.com/demo/cat.png")
pub const CAT_DIGEST: &str = "7b46d0cddc9980e93112e5c818457267bf07dc07a9527c0f5420f8102a1e8b39";
/// sha256("res.cloudinary.com/demo/dog.png")
pub const DOG_DIGEST: &str = "c981bcf75394bcd17e9990e7b144dc59407b1b4837e5214841bf37d311e66558";

/// Ledger whose node is never reachable.
#[derive(Debug, Default)]
pub struct UnreachableLedger;

fn unreachable(method: &str) -> LedgerError {
    LedgerError::Transport { method: method.to_string(), reason: "connection refused".into() }
}

impl Ledger for UnreachableLedger {
    async fn store(&self, _digest: &ContentDigest) -> Result<RecordId, LedgerError> {
        Err(unreachable("eth_sendTransaction"))
    }

    async fn id_by_digest(&self, _digest: &ContentDigest) -> Result<Option<RecordId>, LedgerError> {
        Err(unreachable("eth_call"))
    }

    async fn digest_by_id(&self, _id: RecordId) -> Result<Option<ContentDigest>, LedgerError> {
        Err(unreachable("eth_call"))
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}
