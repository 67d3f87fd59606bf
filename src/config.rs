use crate::scanner::DEFAULT_BATCH_SIZE;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIRMATIONS: u64 = 2;
pub const DEFAULT_EXPLORER_URL: &str = "https://etherscan.io";

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub factory_address: Address,
    pub router_address: Option<Address>,
    pub sender_address: Option<Address>,
    pub sender_private_key: Option<String>,
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub request_timeout: Duration,
    pub log_batch_size: u64,
    pub registry_concurrency: usize,
    pub rpc_max_retries: usize,
    pub explorer_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let urls = lookup("JSON_RPC_URLS")
            .or_else(|| lookup("JSON_RPC_URL"))
            .context("JSON_RPC_URLS (or JSON_RPC_URL) must be set in .env")?;
        let json_rpc_urls: Vec<String> = urls
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS contains no usable URL");
        }

        let factory_str = lookup("HTK_FACTORY_ADDRESS")
            .context("HTK_FACTORY_ADDRESS must be set in .env")?;
        let factory_address = Address::from_str(factory_str.trim())
            .context("Invalid HTK_FACTORY_ADDRESS format")?;

        let router_address = optional_address(&lookup, "HTK_ROUTER_ADDRESS")?;
        let sender_address = optional_address(&lookup, "SENDER_ADDRESS")?;
        let sender_private_key = lookup("SENDER_PRIVATE_KEY").filter(|k| !k.trim().is_empty());

        let confirmations = parse_or(&lookup, "CONFIRMATIONS", DEFAULT_CONFIRMATIONS)?;
        let poll_interval =
            Duration::from_millis(parse_or(&lookup, "POLL_INTERVAL_MS", 1000u64)?.max(1));
        let confirmation_timeout =
            Duration::from_secs(parse_or(&lookup, "CONFIRMATION_TIMEOUT_SECS", 300)?);
        let request_timeout = Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 120)?);
        let log_batch_size = parse_or(&lookup, "LOG_BATCH_SIZE", DEFAULT_BATCH_SIZE)?.max(1);
        let registry_concurrency = parse_or(&lookup, "REGISTRY_CONCURRENCY", 8usize)?.max(1);
        let rpc_max_retries = parse_or(&lookup, "RPC_MAX_RETRIES", 0usize)?;

        let explorer_url = lookup("EXPLORER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string());

        Ok(Config {
            json_rpc_urls,
            factory_address,
            router_address,
            sender_address,
            sender_private_key,
            confirmations,
            poll_interval,
            confirmation_timeout,
            request_timeout,
            log_batch_size,
            registry_concurrency,
            rpc_max_retries,
            explorer_url,
        })
    }
}

fn optional_address<F>(lookup: &F, key: &str) -> Result<Option<Address>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => {
            let address = Address::from_str(value.trim())
                .with_context(|| format!("Invalid {key} format"))?;
            Ok(Some(address))
        }
        None => Ok(None),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {value}")),
        None => Ok(default),
    }
}
