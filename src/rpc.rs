use crate::chain::{ChainClient, RawLog, ReceiptSummary};
use crate::error::{BoxError, HtkError};
use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log, TransactionInput, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{Address, B256, Bytes, TxHash};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const MAX_RESULTS_ERROR: &str = "exceeds max results";

/// One configured JSON-RPC endpoint.
struct Endpoint {
    url: String,
    provider: DynProvider,
}

/// Outcome of a single `eth_getLogs` round trip.
enum LogsPage {
    Complete(Vec<Log>),
    /// The node refused the range for returning too many logs.
    TooMany(String),
}

/// [`ChainClient`] backed by alloy HTTP providers.
///
/// Several endpoints may be configured. A failing request is reported to the
/// caller as-is and the client moves on to the next endpoint for the request
/// after it.
#[derive(Clone)]
pub struct AlloyChainClient {
    endpoints: Arc<Vec<Endpoint>>,
    active: Arc<AtomicUsize>,
    request_timeout: Duration,
    signer_address: Option<Address>,
}

impl AlloyChainClient {
    pub fn new(
        rpc_urls: &[String],
        private_key: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("No JSON-RPC endpoint configured"));
        }

        let signer = private_key
            .map(|key| key.trim().parse::<PrivateKeySigner>())
            .transpose()
            .context("Invalid SENDER_PRIVATE_KEY")?;
        let wallet = signer.clone().map(EthereumWallet::from);

        let endpoints = rpc_urls
            .iter()
            .map(|url| -> Result<Endpoint> {
                let endpoint = url
                    .parse()
                    .with_context(|| format!("Invalid JSON-RPC URL: {url}"))?;
                let provider = match &wallet {
                    Some(wallet) => ProviderBuilder::new()
                        .wallet(wallet.clone())
                        .connect_http(endpoint)
                        .erased(),
                    None => ProviderBuilder::new().connect_http(endpoint).erased(),
                };
                Ok(Endpoint {
                    url: url.clone(),
                    provider,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let signer_address = signer.map(|s| s.address());
        if let Some(address) = signer_address {
            info!("Signing transactions locally as {:?}", address);
        }

        Ok(AlloyChainClient {
            endpoints: Arc::new(endpoints),
            active: Arc::new(AtomicUsize::new(0)),
            request_timeout,
            signer_address,
        })
    }

    /// Address of the local signer, if a private key was configured.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer_address
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoints[self.active.load(Ordering::Relaxed) % self.endpoints.len()]
    }

    fn provider(&self) -> &DynProvider {
        &self.endpoint().provider
    }

    pub fn current_url(&self) -> &str {
        &self.endpoint().url
    }

    /// Moves subsequent requests to the next configured endpoint.
    pub fn rotate_endpoint(&self) {
        let count = self.endpoints.len();
        if count < 2 {
            return;
        }
        let previous = self.active.fetch_add(1, Ordering::Relaxed);
        debug!("Switching to JSON-RPC endpoint #{}", (previous + 1) % count);
    }

    fn failed(&self, operation: &str, error: BoxError) -> HtkError {
        warn!("{} failed on {}: {}", operation, self.current_url(), error);
        self.rotate_endpoint();
        HtkError::rpc(operation, error)
    }

    fn timed_out(&self, operation: &str) -> HtkError {
        let waited = self.request_timeout;
        warn!("{} on {} gave no answer within {:?}", operation, self.current_url(), waited);
        self.rotate_endpoint();
        HtkError::rpc(operation, format!("no response within {waited:?}"))
    }

    async fn request<T, E, F>(&self, operation: &str, future: F) -> Result<T, HtkError>
    where
        F: IntoFuture<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        match timeout(self.request_timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.failed(operation, e.into())),
            Err(_) => Err(self.timed_out(operation)),
        }
    }

    async fn fetch_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<LogsPage, HtkError> {
        let filter = Filter::new()
            .address(address)
            .event_signature(topic0)
            .from_block(from_block)
            .to_block(to_block);

        match timeout(self.request_timeout, self.provider().get_logs(&filter)).await {
            Ok(Ok(logs)) => Ok(LogsPage::Complete(logs)),
            Ok(Err(e)) if e.to_string().contains(MAX_RESULTS_ERROR) => {
                Ok(LogsPage::TooMany(e.to_string()))
            }
            Ok(Err(e)) => Err(self.failed("eth_getLogs", Box::new(e))),
            Err(_) => Err(self.timed_out("eth_getLogs")),
        }
    }
}

/// Extracts the block range a node suggests after refusing a log query.
pub(crate) fn parse_max_results_error(message: &str) -> Option<(u64, u64)> {
    let pattern = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
    let range = pattern.captures(message)?;
    Some((range[1].parse().ok()?, range[2].parse().ok()?))
}

fn to_raw_log(log: Log) -> RawLog {
    RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number,
        log_index: log.log_index,
        transaction_hash: log.transaction_hash,
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, HtkError> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(input));
        self.request("eth_call", self.provider().call(tx)).await
    }

    async fn send(&self, to: Address, input: Bytes, sender: Address) -> Result<TxHash, HtkError> {
        let tx = TransactionRequest::default()
            .from(sender)
            .to(to)
            .input(TransactionInput::new(input));
        let pending = self
            .request("eth_sendTransaction", self.provider().send_transaction(tx))
            .await?;
        let hash = *pending.tx_hash();
        info!("Transaction {:?} accepted by {}", hash, self.current_url());
        Ok(hash)
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, HtkError> {
        let mut collected = Vec::new();
        let mut start = from_block;
        let mut end = to_block;

        while start <= to_block {
            match self.fetch_logs(address, topic0, start, end).await? {
                LogsPage::Complete(logs) => {
                    collected.extend(logs.into_iter().map(to_raw_log));
                    if end == to_block {
                        break;
                    }
                    start = end + 1;
                    end = to_block;
                }
                LogsPage::TooMany(message) => {
                    // Only a strictly narrower window that still starts at
                    // `start` keeps the result gap-free.
                    let Some(narrower) = parse_max_results_error(&message)
                        .map(|(_, to)| to)
                        .filter(|&to| to >= start && to < end)
                    else {
                        return Err(HtkError::rpc("eth_getLogs", message));
                    };
                    debug!(
                        "Node caps logs for blocks {}-{}, narrowing to {}-{}",
                        start, end, start, narrower
                    );
                    end = narrower;
                }
            }
        }

        Ok(collected)
    }

    async fn block_number(&self) -> Result<u64, HtkError> {
        self.request("eth_blockNumber", self.provider().get_block_number())
            .await
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, HtkError> {
        let receipt = self
            .request(
                "eth_getTransactionReceipt",
                self.provider().get_transaction_receipt(hash),
            )
            .await?;

        Ok(receipt.map(|r| ReceiptSummary {
            block_number: r.block_number(),
            success: r.status(),
            gas_used: r.gas_used(),
        }))
    }

    async fn code_at(&self, address: Address, block: u64) -> Result<Bytes, HtkError> {
        let future = self
            .provider()
            .get_code_at(address)
            .block_id(BlockNumberOrTag::Number(block).into());
        self.request("eth_getCode", future).await
    }

    async fn accounts(&self) -> Result<Vec<Address>, HtkError> {
        let mut accounts = self
            .request("eth_accounts", self.provider().get_accounts())
            .await?;
        if let Some(address) = self.signer_address {
            accounts.retain(|a| *a != address);
            accounts.insert(0, address);
        }
        Ok(accounts)
    }
}
