//! Submission of state-changing token calls and confirmation tracking.
//!
//! `submit` validates and encodes locally, sends once, and hands back a lazy
//! stream of [`TransactionHandle`] snapshots:
//!
//! ```text
//! Pending -> Confirmed(1) -> ... -> Confirmed(target)
//!         \-> Failed(reason)
//!         \-> Err(ConfirmationTimeout | Rpc)
//! ```
//!
//! Confirmation counts observed through the stream never decrease, and the
//! stream ends right after its terminal item.

use crate::amount::to_base_units;
use crate::chain::{ChainClient, ReceiptSummary};
use crate::contracts::{IHToken, IHTokenFactory, IHTokenRouter};
use crate::error::HtkError;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes, TxHash};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

const REVERTED: &str = "execution reverted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionStatus {
    Pending,
    Confirmed(u64),
    Failed(String),
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Confirmed(n) => write!(f, "confirmed ({n})"),
            TransactionStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    pub hash: TxHash,
    pub status: TransactionStatus,
    /// Latest receipt seen for the transaction, if any.
    pub receipt: Option<ReceiptSummary>,
}

pub type TransactionUpdates = BoxStream<'static, Result<TransactionHandle, HtkError>>;

/// The write operations the HToken forms offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenAction {
    Create {
        name: String,
        symbol: String,
    },
    Mint {
        token: Address,
        amount: String,
        decimals: u8,
    },
    Burn {
        token: Address,
        amount: String,
        decimals: u8,
    },
    Swap {
        from_token: Address,
        to_token: Address,
        amount: String,
        decimals: u8,
    },
}

/// A validated, ABI-encoded call ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub to: Address,
    pub input: Bytes,
    pub method: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

pub struct TransactionSubmitter {
    client: Arc<dyn ChainClient>,
    factory: Address,
    router: Option<Address>,
    policy: ConfirmationPolicy,
}

impl TransactionSubmitter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        factory: Address,
        router: Option<Address>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            client,
            factory,
            router,
            policy,
        }
    }

    /// Validates `action` and encodes it. Performs no I/O.
    pub fn prepare(&self, action: &TokenAction) -> Result<PreparedCall, HtkError> {
        match action {
            TokenAction::Create { name, symbol } => {
                let name = name.trim();
                let symbol = symbol.trim();
                if name.is_empty() || symbol.is_empty() {
                    return Err(HtkError::InvalidInput(
                        "token name and symbol must not be empty".to_string(),
                    ));
                }
                Ok(encode(
                    self.factory,
                    IHTokenFactory::createHTKCall {
                        name: name.to_string(),
                        symbol: symbol.to_string(),
                    },
                ))
            }
            TokenAction::Mint {
                token,
                amount,
                decimals,
            } => {
                let amount = to_base_units(amount, *decimals)?;
                Ok(encode(*token, IHToken::mintCall { amount }))
            }
            TokenAction::Burn {
                token,
                amount,
                decimals,
            } => {
                let amount = to_base_units(amount, *decimals)?;
                Ok(encode(*token, IHToken::burnCall { amount }))
            }
            TokenAction::Swap {
                from_token,
                to_token,
                amount,
                decimals,
            } => {
                let amount = to_base_units(amount, *decimals)?;
                let router = self.router.ok_or_else(|| {
                    HtkError::InvalidInput("no router address configured for swaps".to_string())
                })?;
                Ok(encode(
                    router,
                    IHTokenRouter::swapExactHTKForHTKCall {
                        fromToken: *from_token,
                        amount,
                        toToken: *to_token,
                    },
                ))
            }
        }
    }

    /// Validates, sends, and returns the status stream of `action`.
    ///
    /// Validation failures return before any network call. Once this returns
    /// `Ok` the transaction is on its way and cannot be revoked: dropping the
    /// stream only stops watching it.
    pub async fn submit(
        &self,
        action: &TokenAction,
        sender: Address,
        confirmations: u64,
    ) -> Result<TransactionUpdates, HtkError> {
        let call = self.prepare(action)?;
        self.submit_call(call, sender, confirmations).await
    }

    pub async fn submit_call(
        &self,
        call: PreparedCall,
        sender: Address,
        confirmations: u64,
    ) -> Result<TransactionUpdates, HtkError> {
        info!("Submitting {} to {:?} from {:?}", call.method, call.to, sender);
        let hash = self.client.send(call.to, call.input, sender).await?;
        info!("Transaction {:?} submitted", hash);
        Ok(self.track(hash, confirmations))
    }

    /// Watches an already-sent transaction until `confirmations` is reached.
    pub fn track(&self, hash: TxHash, confirmations: u64) -> TransactionUpdates {
        let tracker = Tracker::new(Arc::clone(&self.client), hash, confirmations, self.policy);
        stream::unfold(tracker, Tracker::advance).boxed()
    }
}

fn encode<C: SolCall>(to: Address, call: C) -> PreparedCall {
    PreparedCall {
        to,
        input: Bytes::from(call.abi_encode()),
        method: C::SIGNATURE,
    }
}

/// Link to a transaction page on a block explorer.
pub fn explorer_link(base_url: &str, hash: &TxHash) -> String {
    format!("{}/tx/{:?}", base_url.trim_end_matches('/'), hash)
}

struct Tracker {
    client: Arc<dyn ChainClient>,
    hash: TxHash,
    target: u64,
    poll_interval: Duration,
    started: Instant,
    deadline: Instant,
    /// `None` until `Pending` has been yielded, then the last confirmation
    /// count yielded.
    emitted: Option<u64>,
    observed: u64,
    receipt: Option<ReceiptSummary>,
    done: bool,
}

impl Tracker {
    fn new(
        client: Arc<dyn ChainClient>,
        hash: TxHash,
        target: u64,
        policy: ConfirmationPolicy,
    ) -> Self {
        let started = Instant::now();
        Tracker {
            client,
            hash,
            target,
            poll_interval: policy.poll_interval,
            started,
            deadline: started + policy.timeout,
            emitted: None,
            observed: 0,
            receipt: None,
            done: false,
        }
    }

    fn handle(&self, status: TransactionStatus) -> TransactionHandle {
        TransactionHandle {
            hash: self.hash,
            status,
            receipt: self.receipt,
        }
    }

    async fn advance(mut self) -> Option<(Result<TransactionHandle, HtkError>, Self)> {
        if self.done {
            return None;
        }

        let Some(emitted) = self.emitted else {
            self.emitted = Some(0);
            self.done = self.target == 0;
            let handle = self.handle(TransactionStatus::Pending);
            return Some((Ok(handle), self));
        };

        loop {
            if emitted < self.observed.min(self.target) {
                let count = emitted + 1;
                self.emitted = Some(count);
                self.done = count >= self.target;
                debug!("Transaction {:?} has {} confirmation(s)", self.hash, count);
                let handle = self.handle(TransactionStatus::Confirmed(count));
                return Some((Ok(handle), self));
            }

            if Instant::now() >= self.deadline {
                self.done = true;
                warn!(
                    "Transaction {:?} not confirmed {} time(s) within {:?}",
                    self.hash,
                    self.target,
                    self.deadline - self.started
                );
                let err = HtkError::ConfirmationTimeout {
                    hash: self.hash,
                    waited: self.started.elapsed(),
                    confirmations: emitted,
                };
                return Some((Err(err), self));
            }

            // A slow node must not carry the wait past the deadline.
            let Ok(polled) = timeout_at(self.deadline, self.poll()).await else {
                continue;
            };
            match polled {
                Ok(Some(reason)) => {
                    self.done = true;
                    warn!("Transaction {:?} failed: {}", self.hash, reason);
                    let handle = self.handle(TransactionStatus::Failed(reason));
                    return Some((Ok(handle), self));
                }
                Ok(None) => {}
                Err(err) => {
                    self.done = true;
                    return Some((Err(err), self));
                }
            }

            if emitted < self.observed.min(self.target) {
                continue;
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Reads the receipt and chain head once. Returns a failure reason when
    /// the transaction reverted.
    async fn poll(&mut self) -> Result<Option<String>, HtkError> {
        let Some(receipt) = self.client.receipt(self.hash).await? else {
            return Ok(None);
        };
        self.receipt = Some(receipt);

        if !receipt.success {
            return Ok(Some(REVERTED.to_string()));
        }
        let Some(block) = receipt.block_number else {
            return Ok(None);
        };

        let head = self.client.block_number().await?;
        let confirmations = head.saturating_sub(block) + 1;
        self.observed = self.observed.max(confirmations);
        Ok(None)
    }
}
