use crate::{ContentDigest, IntegrityError, Result, DIGEST_HEX_LEN};
use sha2::{Digest, Sha256};

/// SHA-256 over the UTF-8 bytes of `input`, rendered as lowercase hex.
pub fn digest(input: &str) -> Result<ContentDigest> {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let encoded = hex::encode(hasher.finalize());

    // Fixed by the hash algorithm; a different length means something upstream is broken.
    if encoded.len() != DIGEST_HEX_LEN {
        tracing::error!(len = encoded.len(), "digest length invariant violated");
        return Err(IntegrityError::InternalConsistency(format!(
            "digest has {} hex characters, expected {DIGEST_HEX_LEN}",
            encoded.len()
        )));
    }

    ContentDigest::from_hex(&encoded)
        .map_err(|e| IntegrityError::InternalConsistency(format!("freshly computed digest rejected: {e}")))
}
