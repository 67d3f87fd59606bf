use super::mock_chain::{MockChain, MockToken};
use alloy_primitives::{Address, U256};
use htk_client::chain::ChainClient;
use htk_client::config::Config;
use htk_client::query::commands::CommandContext;
use htk_client::registry::TokenRegistry;
use htk_client::submitter::{ConfirmationPolicy, TransactionSubmitter};
use std::sync::Arc;
use std::time::Duration;

pub fn router() -> Address {
    Address::repeat_byte(0x77)
}

pub fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

pub fn token_aaa() -> MockToken {
    let mut token = MockToken::new(0x11, "AAA", "A");
    token.total_supply = U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18));
    token.balances.insert(alice(), U256::from(250u64) * U256::from(10u64).pow(U256::from(18)));
    token
}

pub fn token_bbb() -> MockToken {
    let mut token = MockToken::new(0x22, "BBB", "B");
    token.decimals = 6;
    token
}

/// Factory that has created AAA/A and BBB/B.
pub fn two_token_chain() -> Arc<MockChain> {
    Arc::new(MockChain::with_tokens(vec![token_aaa(), token_bbb()]))
}

pub fn registry_for(chain: &Arc<MockChain>, concurrency: usize) -> TokenRegistry {
    let client: Arc<dyn ChainClient> = chain.clone();
    TokenRegistry::new(client, chain.factory, concurrency)
}

pub fn fast_policy(timeout: Duration) -> ConfirmationPolicy {
    ConfirmationPolicy {
        poll_interval: Duration::from_millis(2),
        timeout,
    }
}

pub fn submitter_for(chain: &Arc<MockChain>, timeout: Duration) -> TransactionSubmitter {
    let client: Arc<dyn ChainClient> = chain.clone();
    TransactionSubmitter::new(client, chain.factory, Some(router()), fast_policy(timeout))
}

/// Command context over `chain`, signing as [`alice`] with no confirmations
/// awaited.
pub fn context_for(chain: &Arc<MockChain>) -> CommandContext {
    let factory = format!("{:?}", chain.factory);
    let router = format!("{:?}", router());
    let config = Config::from_lookup(|key| match key {
        "JSON_RPC_URLS" => Some("http://localhost:8545".to_string()),
        "HTK_FACTORY_ADDRESS" => Some(factory.clone()),
        "HTK_ROUTER_ADDRESS" => Some(router.clone()),
        "CONFIRMATIONS" => Some("0".to_string()),
        "POLL_INTERVAL_MS" => Some("1".to_string()),
        _ => None,
    })
    .unwrap();
    let client: Arc<dyn ChainClient> = chain.clone();
    CommandContext::new(config, client, Some(alice()))
}
