use alloy::sol_types::{SolCall, SolEvent, SolValue};
use alloy_primitives::{Address, B256, Bytes, LogData, TxHash, U256, keccak256};
use async_trait::async_trait;
use htk_client::chain::{ChainClient, RawLog, ReceiptSummary};
use htk_client::contracts::{IHToken, IHTokenFactory};
use htk_client::error::HtkError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct MockToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    pub balances: HashMap<Address, U256>,
}

impl MockToken {
    pub fn new(byte: u8, name: &str, symbol: &str) -> Self {
        Self {
            address: Address::repeat_byte(byte),
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
            total_supply: U256::ZERO,
            balances: HashMap::new(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ReceiptMode {
    Never,
    Mined { block: u64, success: bool },
}

#[derive(Clone, Debug)]
pub struct SentTransaction {
    pub to: Address,
    pub input: Bytes,
    pub sender: Address,
    pub hash: TxHash,
}

/// In-memory chain holding one factory, its tokens, canned logs and a head
/// that advances by one block every time it is read.
pub struct MockChain {
    pub factory: Address,
    tokens: Mutex<Vec<MockToken>>,
    logs: Mutex<Vec<RawLog>>,
    accounts: Vec<Address>,
    head: AtomicU64,
    deployed_at: AtomicU64,
    receipt_mode: Mutex<ReceiptMode>,
    sent: Mutex<Vec<SentTransaction>>,
    calls: AtomicUsize,
    count_calls: AtomicUsize,
    log_calls: AtomicUsize,
    count_delay: Mutex<Duration>,
    receipt_delay: Mutex<Duration>,
    reported_count: Mutex<Option<u64>>,
    fail_symbol_at: Mutex<Option<usize>>,
    fail_logs_from: Mutex<Option<u64>>,
    fail_send: Mutex<bool>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            factory: Address::repeat_byte(0xfa),
            tokens: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            accounts: vec![Address::repeat_byte(0xa1), Address::repeat_byte(0xa2)],
            head: AtomicU64::new(1),
            deployed_at: AtomicU64::new(0),
            receipt_mode: Mutex::new(ReceiptMode::Never),
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
            count_delay: Mutex::new(Duration::ZERO),
            receipt_delay: Mutex::new(Duration::ZERO),
            reported_count: Mutex::new(None),
            fail_symbol_at: Mutex::new(None),
            fail_logs_from: Mutex::new(None),
            fail_send: Mutex::new(false),
        }
    }

    pub fn with_tokens(tokens: Vec<MockToken>) -> Self {
        let chain = Self::new();
        *chain.tokens.lock().unwrap() = tokens;
        chain
    }

    pub fn add_token(&self, token: MockToken) {
        self.tokens.lock().unwrap().push(token);
    }

    pub fn push_log(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn set_head(&self, block: u64) {
        self.head.store(block, Ordering::SeqCst);
    }

    pub fn set_deployed_at(&self, block: u64) {
        self.deployed_at.store(block, Ordering::SeqCst);
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        *self.receipt_mode.lock().unwrap() = mode;
    }

    pub fn set_count_delay(&self, delay: Duration) {
        *self.count_delay.lock().unwrap() = delay;
    }

    /// Makes the factory report `count` tokens regardless of how many exist.
    pub fn set_reported_count(&self, count: Option<u64>) {
        *self.reported_count.lock().unwrap() = count;
    }

    pub fn set_receipt_delay(&self, delay: Duration) {
        *self.receipt_delay.lock().unwrap() = delay;
    }

    pub fn fail_symbol_at(&self, index: Option<usize>) {
        *self.fail_symbol_at.lock().unwrap() = index;
    }

    pub fn fail_logs_from(&self, block: Option<u64>) {
        *self.fail_logs_from.lock().unwrap() = block;
    }

    pub fn fail_send(&self, fail: bool) {
        *self.fail_send.lock().unwrap() = fail;
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.sent.lock().unwrap().clone()
    }

    /// Every request of any kind made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn token_at(&self, index: U256) -> Result<MockToken, HtkError> {
        let tokens = self.tokens.lock().unwrap();
        usize::try_from(index)
            .ok()
            .and_then(|i| tokens.get(i).cloned())
            .ok_or_else(|| HtkError::rpc("eth_call", "execution reverted: index out of range"))
    }

    fn token_by_address(&self, address: Address) -> Result<MockToken, HtkError> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.address == address)
            .cloned()
            .ok_or_else(|| HtkError::rpc("eth_call", "execution reverted: not a token"))
    }
}

fn encoded<T: SolValue>(value: T) -> Bytes {
    Bytes::from((value,).abi_encode_params())
}

fn decode<C: SolCall>(input: &[u8]) -> Result<C, HtkError> {
    C::abi_decode(input).map_err(|e| HtkError::rpc("eth_call", e.to_string()))
}

#[async_trait]
impl ChainClient for MockChain {
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, HtkError> {
        self.record();
        if input.len() < 4 {
            return Err(HtkError::rpc("eth_call", "missing selector"));
        }
        let selector: [u8; 4] = [input[0], input[1], input[2], input[3]];

        if to == self.factory {
            return match selector {
                IHTokenFactory::getHTokenCountCall::SELECTOR => {
                    self.count_calls.fetch_add(1, Ordering::SeqCst);
                    let delay = *self.count_delay.lock().unwrap();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let actual = self.tokens.lock().unwrap().len() as u64;
                    let count = self.reported_count.lock().unwrap().unwrap_or(actual);
                    Ok(encoded(U256::from(count)))
                }
                IHTokenFactory::getHTokenAtIndexCall::SELECTOR => {
                    let call = decode::<IHTokenFactory::getHTokenAtIndexCall>(&input)?;
                    Ok(encoded(self.token_at(call.index)?.address))
                }
                IHTokenFactory::getHTokenNameAtIndexCall::SELECTOR => {
                    let call = decode::<IHTokenFactory::getHTokenNameAtIndexCall>(&input)?;
                    Ok(encoded(self.token_at(call.index)?.name))
                }
                IHTokenFactory::getHTokenSymbolAtIndexCall::SELECTOR => {
                    let call = decode::<IHTokenFactory::getHTokenSymbolAtIndexCall>(&input)?;
                    let failing = *self.fail_symbol_at.lock().unwrap();
                    if failing.is_some_and(|i| U256::from(i) == call.index) {
                        return Err(HtkError::rpc("eth_call", "node unavailable"));
                    }
                    Ok(encoded(self.token_at(call.index)?.symbol))
                }
                _ => Err(HtkError::rpc("eth_call", "unknown factory selector")),
            };
        }

        let token = self.token_by_address(to)?;
        match selector {
            IHToken::nameCall::SELECTOR => Ok(encoded(token.name)),
            IHToken::symbolCall::SELECTOR => Ok(encoded(token.symbol)),
            IHToken::decimalsCall::SELECTOR => Ok(encoded(U256::from(token.decimals))),
            IHToken::totalSupplyCall::SELECTOR => Ok(encoded(token.total_supply)),
            IHToken::balanceOfCall::SELECTOR => {
                let call = decode::<IHToken::balanceOfCall>(&input)?;
                let balance = token.balances.get(&call.owner).copied().unwrap_or_default();
                Ok(encoded(balance))
            }
            _ => Err(HtkError::rpc("eth_call", "unknown token selector")),
        }
    }

    async fn send(&self, to: Address, input: Bytes, sender: Address) -> Result<TxHash, HtkError> {
        self.record();
        if *self.fail_send.lock().unwrap() {
            return Err(HtkError::rpc("eth_sendTransaction", "insufficient funds for gas"));
        }
        let mut sent = self.sent.lock().unwrap();
        let hash = keccak256((sent.len() as u64).to_be_bytes());
        sent.push(SentTransaction {
            to,
            input,
            sender,
            hash,
        });
        Ok(hash)
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, HtkError> {
        self.record();
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(block) = *self.fail_logs_from.lock().unwrap() {
            if to_block >= block {
                return Err(HtkError::rpc("eth_getLogs", "429 Too Many Requests"));
            }
        }

        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.address == address)
            .filter(|log| log.topics.first() == Some(&topic0))
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| b >= from_block && b <= to_block)
            })
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64, HtkError> {
        self.record();
        Ok(self.head.fetch_add(1, Ordering::SeqCst))
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, HtkError> {
        self.record();
        let delay = *self.receipt_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.sent.lock().unwrap().iter().any(|tx| tx.hash == hash) {
            return Ok(None);
        }
        Ok(match *self.receipt_mode.lock().unwrap() {
            ReceiptMode::Never => None,
            ReceiptMode::Mined { block, success } => Some(ReceiptSummary {
                block_number: Some(block),
                success,
                gas_used: 21_000,
            }),
        })
    }

    async fn code_at(&self, address: Address, block: u64) -> Result<Bytes, HtkError> {
        self.record();
        let deployed = self.tokens.lock().unwrap().iter().any(|t| t.address == address);
        if deployed && block >= self.deployed_at.load(Ordering::SeqCst) {
            Ok(Bytes::from_static(&[0x60, 0x80]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn accounts(&self) -> Result<Vec<Address>, HtkError> {
        self.record();
        Ok(self.accounts.clone())
    }
}

pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    value: u64,
    block: u64,
    log_index: u64,
) -> RawLog {
    let event = IHToken::Transfer {
        from,
        to,
        value: U256::from(value),
    };
    let data: LogData = event.encode_log_data();
    RawLog {
        address: token,
        topics: data.topics().to_vec(),
        data: data.data,
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(keccak256(block.to_be_bytes())),
    }
}
