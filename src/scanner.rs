use crate::chain::{ChainClient, RawLog};
use crate::contracts::{IHToken, TRANSFER_SIGNATURE};
use crate::error::HtkError;
use alloy::sol_types::{SolEvent, SolValue};
use alloy_primitives::{Address, B256, TxHash, U256, keccak256};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Option<TxHash>,
}

/// A log that matched the filter but could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeWarning {
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<TxHash>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Transfer(TransferRecord),
    Skipped(DecodeWarning),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub records: Vec<TransferRecord>,
    pub warnings: Vec<DecodeWarning>,
}

pub type ScanStream = BoxStream<'static, Result<ScanItem, HtkError>>;

/// Topic hash of a textual event signature.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Decodes a transfer log. Accepts the standard layout (sender and receiver
/// indexed, value in data) and the layout with all three fields in data.
pub fn decode_transfer(log: &RawLog) -> Result<TransferRecord, DecodeWarning> {
    let warning = |reason: String| DecodeWarning {
        block_number: log.block_number,
        log_index: log.log_index,
        transaction_hash: log.transaction_hash,
        reason,
    };

    let (from, to, value) = match log.topics.len() {
        3 => {
            let event = IHToken::Transfer::decode_raw_log(log.topics.iter().copied(), &log.data)
                .map_err(|e| warning(format!("indexed transfer: {e}")))?;
            (event.from, event.to, event.value)
        }
        1 => <(Address, Address, U256)>::abi_decode_params(&log.data)
            .map_err(|e| warning(format!("unindexed transfer: {e}")))?,
        n => return Err(warning(format!("unexpected topic count {n}"))),
    };

    let block_number = log
        .block_number
        .ok_or_else(|| warning("log has no block number".to_string()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| warning("log has no log index".to_string()))?;

    Ok(TransferRecord {
        from,
        to,
        value,
        block_number,
        log_index,
        transaction_hash: log.transaction_hash,
    })
}

/// Reads historical transfer events of one contract.
///
/// The range is fetched lazily, one window of `batch_size` blocks at a time,
/// and each window is emitted in (block, log index) order. A log that fails
/// to decode is yielded as [`ScanItem::Skipped`] and the scan continues; an
/// RPC failure ends the stream with that error.
#[derive(Clone)]
pub struct LogScanner {
    client: Arc<dyn ChainClient>,
    batch_size: u64,
}

impl LogScanner {
    pub fn new(client: Arc<dyn ChainClient>, batch_size: u64) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    pub fn scan(
        &self,
        contract_address: Address,
        event_signature: &str,
        from_block: u64,
        to_block: u64,
    ) -> ScanStream {
        let cursor = ScanCursor {
            client: Arc::clone(&self.client),
            contract_address,
            topic0: event_topic(event_signature),
            batch_size: self.batch_size,
            next_block: (from_block <= to_block).then_some(from_block),
            to_block,
            buffered: VecDeque::new(),
        };
        stream::unfold(cursor, ScanCursor::advance).boxed()
    }

    pub fn scan_transfers(
        &self,
        contract_address: Address,
        from_block: u64,
        to_block: u64,
    ) -> ScanStream {
        self.scan(contract_address, TRANSFER_SIGNATURE, from_block, to_block)
    }

    /// Runs a scan to completion.
    pub async fn scan_all(
        &self,
        contract_address: Address,
        event_signature: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<ScanReport, HtkError> {
        let mut stream = self.scan(contract_address, event_signature, from_block, to_block);
        let mut report = ScanReport::default();
        while let Some(item) = stream.next().await {
            match item? {
                ScanItem::Transfer(record) => report.records.push(record),
                ScanItem::Skipped(warning) => report.warnings.push(warning),
            }
        }
        Ok(report)
    }
}

struct ScanCursor {
    client: Arc<dyn ChainClient>,
    contract_address: Address,
    topic0: B256,
    batch_size: u64,
    next_block: Option<u64>,
    to_block: u64,
    buffered: VecDeque<ScanItem>,
}

impl ScanCursor {
    async fn advance(mut self) -> Option<(Result<ScanItem, HtkError>, Self)> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some((Ok(item), self));
            }

            let from = self.next_block?;
            let to = from.saturating_add(self.batch_size - 1).min(self.to_block);
            self.next_block = (to < self.to_block).then(|| to + 1);

            match self.fetch_window(from, to).await {
                Ok(items) => self.buffered = items,
                Err(err) => {
                    self.next_block = None;
                    return Some((Err(err), self));
                }
            }
        }
    }

    async fn fetch_window(&self, from: u64, to: u64) -> Result<VecDeque<ScanItem>, HtkError> {
        let start = Instant::now();
        debug!("Fetching logs for blocks {} to {}", from, to);

        let logs = self
            .client
            .get_logs(self.contract_address, self.topic0, from, to)
            .await?;

        let mut records = Vec::with_capacity(logs.len());
        let mut warnings = Vec::new();
        for log in &logs {
            match decode_transfer(log) {
                Ok(record) => records.push(record),
                Err(warning) => {
                    warn!(
                        "Failed to decode transfer event in block {:?}: {}",
                        warning.block_number, warning.reason
                    );
                    warnings.push(warning);
                }
            }
        }
        records.sort_by_key(|r| (r.block_number, r.log_index));

        info!(
            "Decoded {} transfer(s), skipped {} log(s) for blocks {} to {} in {:?}",
            records.len(),
            warnings.len(),
            from,
            to,
            start.elapsed()
        );

        Ok(records
            .into_iter()
            .map(ScanItem::Transfer)
            .chain(warnings.into_iter().map(ScanItem::Skipped))
            .collect())
    }
}
