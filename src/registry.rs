//! Cache of the tokens a factory contract has created.
//!
//! A refresh reads the factory count, fans out one lookup per index, and only
//! publishes the new set once every lookup has succeeded. Readers therefore
//! see either the previous complete set or the new complete set, never a mix.

use crate::chain::{ChainClient, call_contract};
use crate::contracts::{IHToken, IHTokenFactory};
use crate::error::HtkError;
use crate::token::TokenDescriptor;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, U256};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

type RefreshOutcome = Result<Arc<RegistrySnapshot>, HtkError>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    tokens: Vec<TokenDescriptor>,
    by_address: HashMap<Address, usize>,
    factory_count: usize,
}

impl RegistrySnapshot {
    fn build(factory_count: usize, entries: Vec<TokenDescriptor>) -> Self {
        let mut tokens = Vec::with_capacity(entries.len());
        let mut by_address = HashMap::with_capacity(entries.len());

        for (index, descriptor) in entries.into_iter().enumerate() {
            if by_address.contains_key(&descriptor.address) {
                warn!(
                    "Factory lists {:?} again at index {}, keeping the first entry",
                    descriptor.address, index
                );
                continue;
            }
            by_address.insert(descriptor.address, tokens.len());
            tokens.push(descriptor);
        }

        RegistrySnapshot {
            tokens,
            by_address,
            factory_count,
        }
    }

    pub fn tokens(&self) -> &[TokenDescriptor] {
        &self.tokens
    }

    pub fn get(&self, address: &Address) -> Option<&TokenDescriptor> {
        self.by_address.get(address).map(|&i| &self.tokens[i])
    }

    /// Token count the factory reported when this snapshot was taken.
    pub fn factory_count(&self) -> usize {
        self.factory_count
    }
}

pub struct TokenRegistry {
    client: Arc<dyn ChainClient>,
    factory: Address,
    concurrency: usize,
    snapshot: Arc<RwLock<Option<Arc<RegistrySnapshot>>>>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl TokenRegistry {
    pub fn new(client: Arc<dyn ChainClient>, factory: Address, concurrency: usize) -> Self {
        Self {
            client,
            factory,
            concurrency: concurrency.max(1),
            snapshot: Arc::new(RwLock::new(None)),
            in_flight: Mutex::new(None),
        }
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    /// Re-reads the factory and replaces the cached set.
    ///
    /// At most one refresh runs at a time: a caller arriving while one is in
    /// progress waits for that refresh and receives its outcome. On failure
    /// the previously cached set is left untouched.
    pub async fn refresh(&self) -> Result<Vec<TokenDescriptor>, HtkError> {
        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.as_ref() {
                Some(running) if running.peek().is_none() => {
                    debug!("Joining refresh already in progress");
                    running.clone()
                }
                _ => {
                    let refresh = self.start_refresh();
                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        let outcome = shared.clone().await;

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight.as_ref().is_some_and(|f| f.ptr_eq(&shared)) {
                *in_flight = None;
            }
        }

        Ok(outcome?.tokens.clone())
    }

    /// Refreshes only when the factory count differs from the cached one, or
    /// when nothing is cached. Returns whether a refresh happened.
    pub async fn refresh_if_changed(&self) -> Result<bool, HtkError> {
        let cached = self.current().map(|s| s.factory_count);
        let count = read_count(self.client.as_ref(), self.factory).await?;
        if cached == Some(count) {
            debug!("Factory still reports {} token(s), keeping cache", count);
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    pub fn get(&self, address: &Address) -> Result<TokenDescriptor, HtkError> {
        self.current()
            .and_then(|snapshot| snapshot.get(address).cloned())
            .ok_or_else(|| HtkError::NotFound(format!("token {address:?}")))
    }

    /// Cached tokens in factory index order; empty until the first refresh.
    pub fn tokens(&self) -> Vec<TokenDescriptor> {
        self.current()
            .map(|snapshot| snapshot.tokens.clone())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Drops the cached set, e.g. after a token-creation transaction.
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("Token registry for factory {:?} invalidated", self.factory);
    }

    fn current(&self) -> Option<Arc<RegistrySnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn start_refresh(&self) -> RefreshFuture {
        let client = Arc::clone(&self.client);
        let snapshot = Arc::clone(&self.snapshot);
        let factory = self.factory;
        let concurrency = self.concurrency;

        async move {
            let start = Instant::now();
            info!("Refreshing token registry from factory {:?}", factory);

            let loaded = Arc::new(load_snapshot(client.as_ref(), factory, concurrency).await?);
            *snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&loaded));

            info!(
                "Token registry refreshed with {} token(s) in {:?}",
                loaded.tokens.len(),
                start.elapsed()
            );
            Ok::<_, HtkError>(loaded)
        }
        .boxed()
        .shared()
    }
}

async fn read_count(client: &dyn ChainClient, factory: Address) -> Result<usize, HtkError> {
    let count = call_contract(client, factory, IHTokenFactory::getHTokenCountCall {}).await?;
    usize::try_from(count).map_err(|_| {
        HtkError::abi(
            IHTokenFactory::getHTokenCountCall::SIGNATURE,
            format!("token count {count} out of range"),
        )
    })
}

async fn load_snapshot(
    client: &dyn ChainClient,
    factory: Address,
    concurrency: usize,
) -> Result<RegistrySnapshot, HtkError> {
    let count = read_count(client, factory).await?;
    debug!("Factory reports {} token(s)", count);

    let entries: Vec<TokenDescriptor> = stream::iter(0..count)
        .map(move |index| fetch_entry(client, factory, index))
        .buffered(concurrency)
        .try_collect()
        .await?;

    Ok(RegistrySnapshot::build(count, entries))
}

async fn fetch_entry(
    client: &dyn ChainClient,
    factory: Address,
    index: usize,
) -> Result<TokenDescriptor, HtkError> {
    let index = U256::from(index);
    let (address, name, symbol) = tokio::try_join!(
        call_contract(client, factory, IHTokenFactory::getHTokenAtIndexCall { index }),
        call_contract(client, factory, IHTokenFactory::getHTokenNameAtIndexCall { index }),
        call_contract(client, factory, IHTokenFactory::getHTokenSymbolAtIndexCall { index }),
    )?;
    let decimals = call_contract(client, address, IHToken::decimalsCall {}).await?;

    Ok(TokenDescriptor {
        address,
        name,
        symbol,
        decimals,
    })
}
