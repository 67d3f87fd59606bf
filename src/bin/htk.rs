use anyhow::Result;
use clap::{Parser, Subcommand};
use htk_client::HtkError;
use htk_client::chain::ChainClient;
use htk_client::config::Config;
use htk_client::query::commands::{
    CommandContext, TransferQuery, WriteCommand, cmd_accounts, cmd_balance, cmd_token,
    cmd_tokens, cmd_transfers, cmd_write,
};
use htk_client::query::formatters::OutputFormat;
use htk_client::rpc::AlloyChainClient;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "htk")]
#[command(about = "Explore, create, mint, burn and swap HTK tokens", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the accounts available for signing
    Accounts,
    /// List every token created by the factory
    Tokens,
    /// Show metadata, supply and a holder balance of one token
    Token {
        address: String,
        #[arg(long)]
        owner: Option<String>,
    },
    Balance {
        token: String,
        owner: Option<String>,
    },
    /// Show recent transfer events of a token
    Transfers {
        token: String,

        #[arg(long)]
        from_block: Option<u64>,

        #[arg(long)]
        to_block: Option<u64>,

        #[arg(long, default_value = "false")]
        from_deployment: bool,

        #[arg(long)]
        event: Option<String>,

        #[arg(long, default_value = "10")]
        limit: usize,
    },
    Create {
        name: String,
        symbol: String,
        #[arg(long)]
        confirmations: Option<u64>,
    },
    Mint {
        token: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
        #[arg(long)]
        confirmations: Option<u64>,
    },
    Burn {
        token: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
        #[arg(long)]
        confirmations: Option<u64>,
    },
    Swap {
        from_token: String,
        to_token: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
        #[arg(long)]
        confirmations: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<HtkError>() {
                Some(htk) => error!("{} error: {:#}", htk.kind(), e),
                None => error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Factory address: {:?}", config.factory_address);
    info!("RPC URLs: {} endpoint(s) configured", config.json_rpc_urls.len());

    let client = AlloyChainClient::new(
        &config.json_rpc_urls,
        config.sender_private_key.as_deref(),
        config.request_timeout,
    )?;
    let sender = config.sender_address.or(client.signer_address());
    let client: Arc<dyn ChainClient> = Arc::new(client);
    let ctx = CommandContext::new(config, client, sender);

    match cli.command {
        Commands::Accounts => cmd_accounts(&ctx, &format).await?,
        Commands::Tokens => cmd_tokens(&ctx, &format).await?,
        Commands::Token { address, owner } => {
            cmd_token(&ctx, &address, owner.as_deref(), &format).await?
        }
        Commands::Balance { token, owner } => {
            cmd_balance(&ctx, &token, owner.as_deref(), &format).await?
        }
        Commands::Transfers {
            token,
            from_block,
            to_block,
            from_deployment,
            event,
            limit,
        } => {
            let query = TransferQuery {
                token,
                from_block,
                to_block,
                from_deployment,
                event_signature: event,
                limit,
            };
            cmd_transfers(&ctx, query, &format).await?
        }
        Commands::Create {
            name,
            symbol,
            confirmations,
        } => cmd_write(&ctx, WriteCommand::Create { name, symbol }, confirmations, &format).await?,
        Commands::Mint {
            token,
            amount,
            confirmations,
        } => cmd_write(&ctx, WriteCommand::Mint { token, amount }, confirmations, &format).await?,
        Commands::Burn {
            token,
            amount,
            confirmations,
        } => cmd_write(&ctx, WriteCommand::Burn { token, amount }, confirmations, &format).await?,
        Commands::Swap {
            from_token,
            to_token,
            amount,
            confirmations,
        } => {
            let command = WriteCommand::Swap {
                from_token,
                to_token,
                amount,
            };
            cmd_write(&ctx, command, confirmations, &format).await?
        }
    }

    Ok(())
}
