use crate::amount;
use crate::chain::{ChainClient, call_contract, resolve_sender};
use crate::config::Config;
use crate::contracts::{IHToken, TRANSFER_SIGNATURE};
use crate::query::formatters::{
    OutputFormat, STATUS_CSV_HEADER, format_accounts, format_balance_view, format_status,
    format_tokens, format_transfers,
};
use crate::registry::TokenRegistry;
use crate::retry::{RetryPolicy, with_retry};
use crate::scanner::LogScanner;
use crate::submitter::{ConfirmationPolicy, TokenAction, TransactionStatus, TransactionSubmitter};
use crate::token::{balance_view, fetch_descriptor, find_deployment_block};
use alloy_primitives::Address;
use anyhow::Result;
use futures::StreamExt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a command needs, built once per process.
pub struct CommandContext {
    pub config: Config,
    pub client: Arc<dyn ChainClient>,
    pub registry: TokenRegistry,
    pub submitter: TransactionSubmitter,
    pub scanner: LogScanner,
    pub retry: RetryPolicy,
    pub sender: Option<Address>,
}

impl CommandContext {
    pub fn new(config: Config, client: Arc<dyn ChainClient>, sender: Option<Address>) -> Self {
        let registry = TokenRegistry::new(
            Arc::clone(&client),
            config.factory_address,
            config.registry_concurrency,
        );
        let submitter = TransactionSubmitter::new(
            Arc::clone(&client),
            config.factory_address,
            config.router_address,
            ConfirmationPolicy {
                poll_interval: config.poll_interval,
                timeout: config.confirmation_timeout,
            },
        );
        let scanner = LogScanner::new(Arc::clone(&client), config.log_batch_size);
        let retry = RetryPolicy::new(config.rpc_max_retries);

        CommandContext {
            config,
            client,
            registry,
            submitter,
            scanner,
            retry,
            sender,
        }
    }

    async fn sender(&self) -> Result<Address> {
        let sender = with_retry(self.retry, "resolve sender", || {
            resolve_sender(self.client.as_ref(), self.sender)
        })
        .await?;
        Ok(sender)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        if let Ok(descriptor) = self.registry.get(&token) {
            return Ok(descriptor.decimals);
        }
        let decimals = with_retry(self.retry, "decimals()", || {
            call_contract(self.client.as_ref(), token, IHToken::decimalsCall {})
        })
        .await?;
        Ok(decimals)
    }
}

pub fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|_| anyhow::anyhow!("Invalid address format: {}", value))
}

pub async fn cmd_accounts(ctx: &CommandContext, format: &OutputFormat) -> Result<()> {
    let mut accounts = with_retry(ctx.retry, "eth_accounts", || ctx.client.accounts()).await?;
    if let Some(sender) = ctx.sender {
        accounts.retain(|a| *a != sender);
        accounts.insert(0, sender);
    }
    println!("{}", format_accounts(&accounts, format));
    Ok(())
}

pub async fn cmd_tokens(ctx: &CommandContext, format: &OutputFormat) -> Result<()> {
    let tokens = with_retry(ctx.retry, "registry refresh", || ctx.registry.refresh()).await?;
    println!("{}", format_tokens(&tokens, format));
    Ok(())
}

pub async fn cmd_token(
    ctx: &CommandContext,
    token: &str,
    owner: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let token = parse_address(token)?;
    let owner = match owner {
        Some(owner) => parse_address(owner)?,
        None => ctx.sender().await?,
    };

    let client = ctx.client.as_ref();
    let (descriptor, view) = with_retry(ctx.retry, "token details", || async move {
        tokio::try_join!(
            fetch_descriptor(client, token),
            balance_view(client, token, owner)
        )
    })
    .await?;

    println!("{}", format_balance_view(&view, Some(&descriptor), format));
    Ok(())
}

pub async fn cmd_balance(
    ctx: &CommandContext,
    token: &str,
    owner: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let token = parse_address(token)?;
    let owner = match owner {
        Some(owner) => parse_address(owner)?,
        None => ctx.sender().await?,
    };

    let view = with_retry(ctx.retry, "balance", || {
        balance_view(ctx.client.as_ref(), token, owner)
    })
    .await?;
    let descriptor = ctx.registry.get(&token).ok();

    println!("{}", format_balance_view(&view, descriptor.as_ref(), format));
    Ok(())
}

#[derive(Debug, Default)]
pub struct TransferQuery {
    pub token: String,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub from_deployment: bool,
    pub event_signature: Option<String>,
    pub limit: usize,
}

pub async fn cmd_transfers(
    ctx: &CommandContext,
    query: TransferQuery,
    format: &OutputFormat,
) -> Result<()> {
    let token = parse_address(&query.token)?;
    let client = ctx.client.as_ref();

    let to_block = match query.to_block {
        Some(block) => block,
        None => with_retry(ctx.retry, "eth_blockNumber", || client.block_number()).await?,
    };
    let from_block = match query.from_block {
        Some(block) => block,
        None if query.from_deployment => find_deployment_block(client, token, to_block).await?,
        None => 0,
    };

    if from_block > to_block {
        return Err(anyhow::anyhow!(
            "Invalid block range: {} is after {}",
            from_block,
            to_block
        ));
    }

    let signature = query.event_signature.as_deref().unwrap_or(TRANSFER_SIGNATURE);
    info!("Scanning {} events of {:?} in blocks {} to {}", signature, token, from_block, to_block);
    let report = ctx
        .scanner
        .scan_all(token, signature, from_block, to_block)
        .await?;

    if !report.warnings.is_empty() {
        warn!("Skipped {} undecodable log(s)", report.warnings.len());
    }

    let skip = report.records.len().saturating_sub(query.limit);
    let latest = &report.records[skip..];
    let decimals = ctx.token_decimals(token).await.ok();

    println!("{}", format_transfers(latest, decimals, format));
    Ok(())
}

/// Amount-bearing actions are resolved against the token's decimals before
/// they reach the submitter.
pub enum WriteCommand {
    Create { name: String, symbol: String },
    Mint { token: String, amount: String },
    Burn { token: String, amount: String },
    Swap { from_token: String, to_token: String, amount: String },
}

pub async fn cmd_write(
    ctx: &CommandContext,
    command: WriteCommand,
    confirmations: Option<u64>,
    format: &OutputFormat,
) -> Result<()> {
    let creates_token = matches!(command, WriteCommand::Create { .. });
    // Reject malformed amounts before any lookup reaches the chain.
    if let WriteCommand::Mint { amount: input, .. }
    | WriteCommand::Burn { amount: input, .. }
    | WriteCommand::Swap { amount: input, .. } = &command
    {
        amount::validate(input)?;
    }

    let action = match command {
        WriteCommand::Create { name, symbol } => TokenAction::Create { name, symbol },
        WriteCommand::Mint { token, amount } => {
            let token = parse_address(&token)?;
            TokenAction::Mint {
                token,
                amount,
                decimals: ctx.token_decimals(token).await?,
            }
        }
        WriteCommand::Burn { token, amount } => {
            let token = parse_address(&token)?;
            TokenAction::Burn {
                token,
                amount,
                decimals: ctx.token_decimals(token).await?,
            }
        }
        WriteCommand::Swap {
            from_token,
            to_token,
            amount,
        } => {
            let from_token = parse_address(&from_token)?;
            let to_token = parse_address(&to_token)?;
            TokenAction::Swap {
                from_token,
                to_token,
                amount,
                decimals: ctx.token_decimals(from_token).await?,
            }
        }
    };

    let call = ctx.submitter.prepare(&action)?;
    let sender = ctx.sender().await?;
    let confirmations = confirmations.unwrap_or(ctx.config.confirmations);

    let mut updates = ctx
        .submitter
        .submit_call(call, sender, confirmations)
        .await?;

    if matches!(format, OutputFormat::Csv) {
        println!("{STATUS_CSV_HEADER}");
    }

    let mut confirmed = false;
    while let Some(update) = updates.next().await {
        let handle = update?;
        println!("{}", format_status(&handle, &ctx.config.explorer_url, format));
        match handle.status {
            TransactionStatus::Confirmed(n) if n >= confirmations => confirmed = true,
            TransactionStatus::Failed(reason) => {
                return Err(anyhow::anyhow!("Transaction {:?} failed: {}", handle.hash, reason));
            }
            _ => {}
        }
    }

    if creates_token && (confirmed || confirmations == 0) {
        ctx.registry.invalidate();
        if ctx.registry.refresh_if_changed().await? {
            println!("{}", format_tokens(&ctx.registry.tokens(), format));
        }
    }

    Ok(())
}
