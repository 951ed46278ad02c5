//! Minimal ABI helpers for single-word contract calls.
//!
//! Every function the registry exposes takes one 32-byte argument and returns
//! one 32-byte word, so calldata is always `selector || word`.

use super::LedgerError;
use crate::{ContentDigest, RecordId, DIGEST_HEX_LEN};
use sha3::{Digest, Keccak256};

/// Hex characters in one ABI word.
const WORD_HEX_LEN: usize = 64;

/// 4-byte function selector: the first four bytes of keccak256(signature).
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Selector as 8 lowercase hex characters, no prefix.
pub fn selector_hex(signature: &str) -> String {
    hex::encode(selector(signature))
}

/// Log topic for an event: the full keccak256 of its signature, `0x`-prefixed.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(signature.as_bytes())))
}

/// Format a digest as a `0x`-prefixed bytes32 literal.
pub fn to_bytes32(digest: &ContentDigest) -> Result<String, LedgerError> {
    let raw = digest.as_hex();
    if raw.len() != DIGEST_HEX_LEN {
        return Err(LedgerError::Encoding(format!(
            "digest has {} hex characters, bytes32 needs {DIGEST_HEX_LEN}",
            raw.len()
        )));
    }
    Ok(format!("0x{raw}"))
}

/// Calldata for `f(bytes32)`.
pub fn encode_bytes32_call(selector_hex: &str, digest: &ContentDigest) -> Result<String, LedgerError> {
    let word = to_bytes32(digest)?;
    Ok(format!("0x{selector_hex}{}", &word[2..]))
}

/// Calldata for `f(uint256)`.
pub fn encode_uint_call(selector_hex: &str, id: RecordId) -> String {
    format!("0x{selector_hex}{:064x}", id.get())
}

/// Extract the first 32-byte word from an `eth_call` result.
fn first_word<'a>(method: &str, result: &'a str) -> Result<&'a str, LedgerError> {
    let body = result
        .strip_prefix("0x")
        .ok_or_else(|| malformed(method, format!("result {result:?} is not 0x-prefixed")))?;
    if body.len() < WORD_HEX_LEN {
        return Err(malformed(method, format!("result has {} hex characters, expected a word", body.len())));
    }
    let word = &body[..WORD_HEX_LEN];
    if !word.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed(method, "result contains non-hex characters".into()));
    }
    Ok(word)
}

/// Decode a `uint256` return value that must fit in 64 bits.
pub fn decode_uint(method: &str, result: &str) -> Result<u64, LedgerError> {
    let word = first_word(method, result)?;
    let (high, low) = word.split_at(WORD_HEX_LEN - 16);
    if high.bytes().any(|b| b != b'0') {
        return Err(malformed(method, "uint256 does not fit in 64 bits".into()));
    }
    u64::from_str_radix(low, 16).map_err(|e| malformed(method, e.to_string()))
}

/// Decode a `bytes32` return value.
pub fn decode_bytes32(method: &str, result: &str) -> Result<ContentDigest, LedgerError> {
    let word = first_word(method, result)?;
    ContentDigest::from_hex(word).map_err(|e| malformed(method, e.to_string()))
}

/// Parse a JSON-RPC quantity such as `0x1b4`.
pub fn parse_quantity(value: &str) -> Option<u64> {
    u64::from_str_radix(value.strip_prefix("0x")?, 16).ok()
}

fn malformed(method: &str, reason: String) -> LedgerError {
    LedgerError::MalformedResponse { method: method.to_string(), reason }
}
