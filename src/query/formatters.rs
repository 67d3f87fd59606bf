use crate::amount::{DEFAULT_DECIMALS, from_base_units};
use crate::scanner::TransferRecord;
use crate::submitter::{TransactionHandle, TransactionStatus, explorer_link};
use crate::token::{TokenBalanceView, TokenDescriptor};
use alloy_primitives::Address;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_string(rows: Vec<Vec<String>>) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    for row in rows {
        let _ = wtr.write_record(&row);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_tokens(tokens: &[TokenDescriptor], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if tokens.is_empty() {
                return "No tokens found.".to_string();
            }
            let mut table = new_table(vec!["#", "Name", "Symbol", "Decimals", "Address"]);
            for (i, token) in tokens.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(i),
                    Cell::new(&token.name),
                    Cell::new(&token.symbol),
                    Cell::new(token.decimals),
                    Cell::new(format!("{:?}", token.address)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(tokens).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut rows = vec![vec![
                "index".to_string(),
                "name".to_string(),
                "symbol".to_string(),
                "decimals".to_string(),
                "address".to_string(),
            ]];
            rows.extend(tokens.iter().enumerate().map(|(i, t)| {
                vec![
                    i.to_string(),
                    t.name.clone(),
                    t.symbol.clone(),
                    t.decimals.to_string(),
                    format!("{:?}", t.address),
                ]
            }));
            csv_string(rows)
        }
    }
}

pub fn format_balance_view(
    view: &TokenBalanceView,
    token: Option<&TokenDescriptor>,
    format: &OutputFormat,
) -> String {
    let decimals = token.map_or(DEFAULT_DECIMALS, |t| t.decimals);
    let supply_formatted = from_base_units(view.total_supply, decimals);
    let balance_formatted = from_base_units(view.balance, decimals);
    let label = token.map_or_else(
        || format!("{:?}", view.token),
        |t| format!("{} ({})", t.name, t.symbol),
    );

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value (Formatted)", "Value (Base Units)"]);
            table.add_row(vec![
                Cell::new("Token"),
                Cell::new(&label),
                Cell::new(format!("{:?}", view.token)),
            ]);
            table.add_row(vec![
                Cell::new("Owner"),
                Cell::new(""),
                Cell::new(format!("{:?}", view.owner)),
            ]);
            table.add_row(vec![
                Cell::new("Total Supply"),
                Cell::new(&supply_formatted),
                Cell::new(view.total_supply.to_string()),
            ]);
            table.add_row(vec![
                Cell::new("Balance"),
                Cell::new(&balance_formatted),
                Cell::new(view.balance.to_string()),
            ]);
            table.to_string()
        }
        OutputFormat::Json => json!({
            "token": format!("{:?}", view.token),
            "name": token.map(|t| t.name.clone()),
            "symbol": token.map(|t| t.symbol.clone()),
            "owner": format!("{:?}", view.owner),
            "total_supply": supply_formatted,
            "total_supply_base": view.total_supply.to_string(),
            "balance": balance_formatted,
            "balance_base": view.balance.to_string(),
        })
        .to_string(),
        OutputFormat::Csv => csv_string(vec![
            vec!["metric".into(), "value_formatted".into(), "value_base".into()],
            vec!["total_supply".into(), supply_formatted, view.total_supply.to_string()],
            vec!["balance".into(), balance_formatted, view.balance.to_string()],
        ]),
    }
}

pub fn format_transfers(
    transfers: &[TransferRecord],
    decimals: Option<u8>,
    format: &OutputFormat,
) -> String {
    let decimals = decimals.unwrap_or(DEFAULT_DECIMALS);
    match format {
        OutputFormat::Table => {
            if transfers.is_empty() {
                return "No transfers found.".to_string();
            }
            let mut table = new_table(vec![
                "Block",
                "From",
                "To",
                "Value",
                "Value (Base Units)",
                "Tx Hash",
            ]);
            for transfer in transfers {
                table.add_row(vec![
                    Cell::new(transfer.block_number),
                    Cell::new(format!("{:#}", transfer.from)),
                    Cell::new(format!("{:#}", transfer.to)),
                    Cell::new(from_base_units(transfer.value, decimals)),
                    Cell::new(transfer.value.to_string()),
                    Cell::new(
                        transfer
                            .transaction_hash
                            .map_or("N/A".to_string(), |h| format_tx_hash(&format!("{h:?}"))),
                    ),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_transfers: Vec<_> = transfers
                .iter()
                .map(|t| {
                    json!({
                        "block_number": t.block_number,
                        "log_index": t.log_index,
                        "transaction_hash": t.transaction_hash.map(|h| format!("{h:?}")),
                        "from": format!("{:?}", t.from),
                        "to": format!("{:?}", t.to),
                        "value": from_base_units(t.value, decimals),
                        "value_base": t.value.to_string(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_transfers).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut rows = vec![vec![
                "block_number".to_string(),
                "log_index".to_string(),
                "from".to_string(),
                "to".to_string(),
                "value".to_string(),
                "value_base".to_string(),
                "transaction_hash".to_string(),
            ]];
            rows.extend(transfers.iter().map(|t| {
                vec![
                    t.block_number.to_string(),
                    t.log_index.to_string(),
                    format!("{:?}", t.from),
                    format!("{:?}", t.to),
                    from_base_units(t.value, decimals),
                    t.value.to_string(),
                    t.transaction_hash.map(|h| format!("{h:?}")).unwrap_or_default(),
                ]
            }));
            csv_string(rows)
        }
    }
}

pub fn format_accounts(accounts: &[Address], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if accounts.is_empty() {
                return "No accounts available.".to_string();
            }
            let mut table = new_table(vec!["#", "Account"]);
            for (i, account) in accounts.iter().enumerate() {
                table.add_row(vec![Cell::new(i), Cell::new(format!("{account:?}"))]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let list: Vec<String> = accounts.iter().map(|a| format!("{a:?}")).collect();
            json!({ "accounts": list }).to_string()
        }
        OutputFormat::Csv => {
            let mut rows = vec![vec!["account".to_string()]];
            rows.extend(accounts.iter().map(|a| vec![format!("{a:?}")]));
            csv_string(rows)
        }
    }
}

/// One line per status update, so progress can be printed as it arrives.
pub fn format_status(
    handle: &TransactionHandle,
    explorer_url: &str,
    format: &OutputFormat,
) -> String {
    let link = explorer_link(explorer_url, &handle.hash);
    let gas_used = handle.receipt.map(|r| r.gas_used);
    let block = handle.receipt.and_then(|r| r.block_number);

    match format {
        OutputFormat::Table => match &handle.status {
            TransactionStatus::Pending => format!("Transaction submitted with hash: {link}"),
            TransactionStatus::Confirmed(n) => {
                let mut line = format!("Transaction confirmed with {n} confirmation(s)");
                if let Some(block) = block {
                    line.push_str(&format!(" in block {block}"));
                }
                if let Some(gas) = gas_used {
                    line.push_str(&format!(". Gas used: {gas}"));
                }
                line
            }
            TransactionStatus::Failed(reason) => format!("Transaction error: {reason} ({link})"),
        },
        OutputFormat::Json => json!({
            "hash": format!("{:?}", handle.hash),
            "status": handle.status.to_string(),
            "block_number": block,
            "gas_used": gas_used,
            "link": link,
        })
        .to_string(),
        OutputFormat::Csv => {
            let row = csv_string(vec![vec![
                format!("{:?}", handle.hash),
                handle.status.to_string(),
                block.map(|b| b.to_string()).unwrap_or_default(),
                gas_used.map(|g| g.to_string()).unwrap_or_default(),
            ]]);
            row.trim_end().to_string()
        }
    }
}

pub const STATUS_CSV_HEADER: &str = "hash,status,block_number,gas_used";

fn format_tx_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}
