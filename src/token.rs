use crate::chain::{ChainClient, call_contract};
use crate::contracts::IHToken;
use crate::error::HtkError;
use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::info;

/// Metadata of one HToken, keyed by its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenDescriptor {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Supply and holder balance read at the moment of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalanceView {
    pub token: Address,
    pub owner: Address,
    pub total_supply: U256,
    pub balance: U256,
}

pub async fn fetch_descriptor(
    client: &dyn ChainClient,
    address: Address,
) -> Result<TokenDescriptor, HtkError> {
    let (name, symbol, decimals) = tokio::try_join!(
        call_contract(client, address, IHToken::nameCall {}),
        call_contract(client, address, IHToken::symbolCall {}),
        call_contract(client, address, IHToken::decimalsCall {}),
    )?;

    Ok(TokenDescriptor {
        address,
        name,
        symbol,
        decimals,
    })
}

pub async fn balance_view(
    client: &dyn ChainClient,
    token: Address,
    owner: Address,
) -> Result<TokenBalanceView, HtkError> {
    let (total_supply, balance) = tokio::try_join!(
        call_contract(client, token, IHToken::totalSupplyCall {}),
        call_contract(client, token, IHToken::balanceOfCall { owner }),
    )?;

    Ok(TokenBalanceView {
        token,
        owner,
        total_supply,
        balance,
    })
}

/// Binary search for the first block at which `address` has code.
pub async fn find_deployment_block(
    client: &dyn ChainClient,
    address: Address,
    latest_block: u64,
) -> Result<u64, HtkError> {
    info!("Searching for deployment block of contract {:?}", address);

    let code = client.code_at(address, latest_block).await?;
    if code.is_empty() {
        return Err(HtkError::NotFound(format!("contract code at {address:?}")));
    }

    let mut left = 0u64;
    let mut right = latest_block;

    while left < right {
        let mid = left + (right - left) / 2;

        let code = client.code_at(address, mid).await?;

        if code.is_empty() {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    info!("Contract deployed at block {}", left);
    Ok(left)
}
