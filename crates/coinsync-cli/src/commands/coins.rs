use coinsync_core::{AppConfig, ToolSurface};
use serde_json::{json, Value};

use super::call_tool;
use crate::cli::CoinsCommand;
use crate::error::CliError;

pub async fn run(
    command: &CoinsCommand,
    surface: ToolSurface,
    config: &AppConfig,
) -> Result<Value, CliError> {
    let (tool, args) = match command {
        CoinsCommand::List => ("get_all", json!({})),
        CoinsCommand::Get { symbol } => ("get_by_symbol", json!({ "symbol": symbol })),
        CoinsCommand::Add {
            id,
            symbol,
            name,
            price,
        } => (
            "add",
            json!({ "id": id, "symbol": symbol, "name": name, "price": price }),
        ),
        CoinsCommand::UpdatePrice { symbol, price } => {
            ("update_price", json!({ "symbol": symbol, "price": price }))
        }
        CoinsCommand::Delete { symbol } => ("delete", json!({ "symbol": symbol })),
    };

    Ok(call_tool(&surface, config, tool, args).await)
}
