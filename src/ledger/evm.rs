//! # EVM JSON-RPC ledger
//!
//! Talks to the digest registry contract through a plain JSON-RPC endpoint.
//!
//! - Writes go through `eth_sendTransaction`. Signing is delegated to the
//!   node, so the `from` account must be unlocked or managed by the provider.
//! - A write counts as durable once its receipt is observed with status
//!   `0x1` (one confirmation). The assigned id is read from the contract's
//!   `HashStored` log in that receipt; without one, the reverse index is
//!   queried at the receipt's block.
//! - Reads use `eth_call` against `latest`.
//!
//! ## Contract interface
//!
//! ```solidity
//! function storeImageHash(bytes32 hash) external;
//! function getHashById(uint256 id) external view returns (bytes32);
//! function getImageHashId(bytes32 hash) external view returns (uint256);
//! event HashStored(uint256 indexed id, bytes32 hash);
//! ```
//!
//! A non-indexed `id` is read from the first word of the log data instead.
//!
//! The signatures are configurable for contracts that name these differently.

use super::{abi, Ledger, LedgerError};
use crate::{ContentDigest, RecordId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Configuration for [`EvmLedger`].
#[derive(Debug, Clone)]
pub struct EvmLedgerConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Registry contract address (0x-prefixed, 40 hex chars).
    pub contract_address: String,
    /// Sender whose transactions the node signs (0x-prefixed).
    pub from_address: String,
    /// Gas limit attached to store transactions.
    pub gas_limit: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Delay between receipt polls.
    pub poll_interval_ms: u64,
    /// Receipt polls before giving up on confirmation.
    pub max_polls: u32,
    pub store_signature: String,
    pub digest_by_id_signature: String,
    pub id_by_digest_signature: String,
    pub stored_event_signature: String,
}

impl EvmLedgerConfig {
    /// Defaults: 1M gas, 30s timeout, 500ms x 120 receipt polls.
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            from_address: from_address.into(),
            gas_limit: 1_000_000,
            timeout_secs: 30,
            poll_interval_ms: 500,
            max_polls: 120,
            store_signature: "storeImageHash(bytes32)".into(),
            digest_by_id_signature: "getHashById(uint256)".into(),
            id_by_digest_signature: "getImageHashId(bytes32)".into(),
            stored_event_signature: "HashStored(uint256,bytes32)".into(),
        }
    }

    /// Set the receipt polling cadence.
    pub fn with_polling(mut self, interval_ms: u64, max_polls: u32) -> Self {
        self.poll_interval_ms = interval_ms;
        self.max_polls = max_polls;
        self
    }

    /// Override the contract function signatures.
    pub fn with_signatures(
        mut self,
        store: impl Into<String>,
        digest_by_id: impl Into<String>,
        id_by_digest: impl Into<String>,
    ) -> Self {
        self.store_signature = store.into();
        self.digest_by_id_signature = digest_by_id.into();
        self.id_by_digest_signature = id_by_digest.into();
        self
    }

    /// Override the event emitted by the store call.
    pub fn with_event_signature(mut self, stored: impl Into<String>) -> Self {
        self.stored_event_signature = stored.into();
        self
    }
}

#[derive(Debug)]
struct Selectors {
    store: String,
    digest_by_id: String,
    id_by_digest: String,
    stored_topic: String,
}

/// Ledger backed by an EVM contract over JSON-RPC.
#[derive(Debug)]
pub struct EvmLedger {
    client: reqwest::Client,
    config: EvmLedgerConfig,
    selectors: Selectors,
    next_request_id: AtomicU64,
    span: tracing::Span,
}

impl EvmLedger {
    pub fn new(config: EvmLedgerConfig) -> Result<Self, LedgerError> {
        if !is_valid_eth_address(&config.contract_address) {
            return Err(LedgerError::Config(format!(
                "invalid contract address: {}",
                config.contract_address
            )));
        }
        if !is_valid_eth_address(&config.from_address) {
            return Err(LedgerError::Config(format!("invalid from address: {}", config.from_address)));
        }
        if config.max_polls == 0 {
            return Err(LedgerError::Config("max_polls must be at least 1".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Config(format!("failed to build HTTP client: {e}")))?;

        let selectors = Selectors {
            store: abi::selector_hex(&config.store_signature),
            digest_by_id: abi::selector_hex(&config.digest_by_id_signature),
            id_by_digest: abi::selector_hex(&config.id_by_digest_signature),
            stored_topic: abi::event_topic(&config.stored_event_signature),
        };

        Ok(Self {
            client,
            config,
            selectors,
            next_request_id: AtomicU64::new(1),
            span: tracing::info_span!("evm_ledger"),
        })
    }

    /// Emit this client's events inside `span`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &EvmLedgerConfig {
        &self.config
    }

    /// Send a JSON-RPC request and return the `result` field.
    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, LedgerError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_request_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport {
                method: method.to_string(),
                reason: if e.is_timeout() { "request timed out".to_string() } else { e.to_string() },
            })?;

        if !resp.status().is_success() {
            return Err(LedgerError::Transport {
                method: method.to_string(),
                reason: format!("HTTP {}", resp.status()),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| LedgerError::MalformedResponse {
            method: method.to_string(),
            reason: format!("invalid JSON: {e}"),
        })?;

        if let Some(error) = json.get("error") {
            let msg = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            return Err(LedgerError::Rejected { method: method.to_string(), reason: msg.to_string() });
        }

        json.get("result").cloned().ok_or_else(|| LedgerError::MalformedResponse {
            method: method.to_string(),
            reason: "response missing 'result' field".into(),
        })
    }

    /// Read-only contract call at `block` (a quantity or tag) returning the raw hex result.
    async fn eth_call(&self, data: String, block: &str) -> Result<String, LedgerError> {
        let call = serde_json::json!({ "to": self.config.contract_address, "data": data });
        let result = self.rpc_call("eth_call", serde_json::json!([call, block])).await?;
        result.as_str().map(str::to_string).ok_or_else(|| LedgerError::MalformedResponse {
            method: "eth_call".into(),
            reason: "non-string result".into(),
        })
    }

    async fn send_store_tx(&self, digest: &ContentDigest) -> Result<String, LedgerError> {
        let tx = serde_json::json!({
            "from": self.config.from_address,
            "to": self.config.contract_address,
            "data": abi::encode_bytes32_call(&self.selectors.store, digest)?,
            "gas": format!("0x{:x}", self.config.gas_limit),
        });
        let result = self.rpc_call("eth_sendTransaction", serde_json::json!([tx])).await?;
        result.as_str().map(str::to_string).ok_or_else(|| LedgerError::MalformedResponse {
            method: "eth_sendTransaction".into(),
            reason: "non-string transaction hash".into(),
        })
    }

    /// Poll for the receipt until it appears or the budget runs out.
    async fn await_receipt(&self, tx_hash: &str) -> Result<serde_json::Value, LedgerError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        for poll in 1..=self.config.max_polls {
            let receipt = self
                .rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                debug!(tx_hash, poll, "receipt observed");
                return Ok(receipt);
            }
            if poll < self.config.max_polls {
                tokio::time::sleep(interval).await;
            }
        }
        Err(LedgerError::ConfirmationTimeout { tx_hash: tx_hash.to_string(), polls: self.config.max_polls })
    }

    async fn lookup_id(&self, digest: &ContentDigest, block: &str) -> Result<Option<RecordId>, LedgerError> {
        let data = abi::encode_bytes32_call(&self.selectors.id_by_digest, digest)?;
        let raw = self.eth_call(data, block).await?;
        Ok(RecordId::new(abi::decode_uint("eth_call", &raw)?))
    }

    /// Id from the contract's `HashStored` log in a receipt, if present.
    fn id_from_logs(&self, receipt: &serde_json::Value) -> Result<Option<RecordId>, LedgerError> {
        const METHOD: &str = "eth_getTransactionReceipt";
        let Some(logs) = receipt.get("logs").and_then(|l| l.as_array()) else {
            return Ok(None);
        };
        for log in logs {
            let from_contract = log
                .get("address")
                .and_then(|a| a.as_str())
                .is_some_and(|a| a.eq_ignore_ascii_case(&self.config.contract_address));
            let topics: Vec<&str> = log
                .get("topics")
                .and_then(|t| t.as_array())
                .map(|t| t.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();
            let is_stored = topics.first().is_some_and(|t| t.eq_ignore_ascii_case(&self.selectors.stored_topic));
            if !from_contract || !is_stored {
                continue;
            }

            let word = match topics.get(1) {
                Some(indexed) => *indexed,
                None => log.get("data").and_then(|d| d.as_str()).unwrap_or("0x"),
            };
            if let Some(id) = RecordId::new(abi::decode_uint(METHOD, word)?) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

impl Ledger for EvmLedger {
    async fn store(&self, digest: &ContentDigest) -> Result<RecordId, LedgerError> {
        async {
            let tx_hash = self.send_store_tx(digest).await?;
            info!(%digest, %tx_hash, "store transaction submitted, awaiting confirmation");

            let receipt = self.await_receipt(&tx_hash).await?;
            let status = receipt.get("status").and_then(|s| s.as_str()).unwrap_or("0x0");
            if abi::parse_quantity(status) != Some(1) {
                warn!(%tx_hash, status, "store transaction failed");
                return Err(LedgerError::Rejected {
                    method: "eth_sendTransaction".into(),
                    reason: format!("transaction {tx_hash} has receipt status {status}"),
                });
            }

            let block = receipt
                .get("blockNumber")
                .and_then(|b| b.as_str())
                .unwrap_or("latest")
                .to_string();

            let id = match self.id_from_logs(&receipt)? {
                Some(id) => id,
                None => {
                    debug!(%tx_hash, "no HashStored log in receipt, querying reverse index");
                    self.lookup_id(digest, &block).await?.ok_or_else(|| LedgerError::Rejected {
                        method: "eth_sendTransaction".into(),
                        reason: format!("transaction {tx_hash} confirmed but no record id was assigned"),
                    })?
                }
            };
            info!(%digest, %id, %block, "digest recorded on ledger");
            Ok(id)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn id_by_digest(&self, digest: &ContentDigest) -> Result<Option<RecordId>, LedgerError> {
        self.lookup_id(digest, "latest").instrument(self.span.clone()).await
    }

    async fn digest_by_id(&self, id: RecordId) -> Result<Option<ContentDigest>, LedgerError> {
        async {
            let data = abi::encode_uint_call(&self.selectors.digest_by_id, id);
            let raw = self.eth_call(data, "latest").await?;
            let digest = abi::decode_bytes32("eth_call", &raw)?;
            debug!(%id, %digest, "ledger digest lookup");
            Ok((!digest.is_zero()).then_some(digest))
        }
        .instrument(self.span.clone())
        .await
    }

    fn name(&self) -> &str {
        "evm"
    }
}

/// Validate that a string is a well-formed Ethereum address (0x + 40 hex chars).
pub fn is_valid_eth_address(addr: &str) -> bool {
    addr.len() == 42 && addr.starts_with("0x") && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}
