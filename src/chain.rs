//! The narrow contract every component uses to reach the chain.
//!
//! Implementations perform network I/O only and never retry; a failed request
//! surfaces as [`HtkError::Rpc`] and the caller decides what to do next.

use crate::error::HtkError;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, B256, Bytes, TxHash};
use async_trait::async_trait;
use tracing::debug;

/// A log entry as returned by the node, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<TxHash>,
}

/// The parts of a transaction receipt the submitter cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub block_number: Option<u64>,
    pub success: bool,
    pub gas_used: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Executes a read-only call and returns the raw return data.
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, HtkError>;

    /// Submits a state-changing call from `sender`. Returns once the node has
    /// accepted the transaction.
    async fn send(&self, to: Address, input: Bytes, sender: Address) -> Result<TxHash, HtkError>;

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, HtkError>;

    async fn block_number(&self) -> Result<u64, HtkError>;

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, HtkError>;

    async fn code_at(&self, address: Address, block: u64) -> Result<Bytes, HtkError>;

    async fn accounts(&self) -> Result<Vec<Address>, HtkError>;
}

/// Encodes `call`, executes it against `to` and decodes the typed return.
pub async fn call_contract<C>(
    client: &dyn ChainClient,
    to: Address,
    call: C,
) -> Result<C::Return, HtkError>
where
    C: SolCall + Send,
{
    debug!("eth_call {} on {:?}", C::SIGNATURE, to);
    let output = client.call(to, Bytes::from(call.abi_encode())).await?;
    C::abi_decode_returns(&output).map_err(|e| HtkError::abi(C::SIGNATURE, e))
}

/// Picks the account that signs outgoing transactions: the configured one
/// when present, otherwise the first account the node exposes.
pub async fn resolve_sender(
    client: &dyn ChainClient,
    configured: Option<Address>,
) -> Result<Address, HtkError> {
    if let Some(address) = configured {
        return Ok(address);
    }
    client
        .accounts()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| HtkError::NotFound("sender account".to_string()))
}
