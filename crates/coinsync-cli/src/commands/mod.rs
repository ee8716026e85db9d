mod coins;
mod history;
mod serve;
mod sync;

use std::sync::Arc;

use coinsync_core::{runtime, AppConfig, MarketStore, ToolSurface};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Run the selected command. `Some(value)` is printed by the caller.
pub async fn run(cli: &Cli, config: AppConfig) -> Result<Option<Value>, CliError> {
    if let Command::Tools = cli.command {
        return Ok(Some(serde_json::to_value(ToolSurface::list_tools())?));
    }

    let warehouse = Arc::new(runtime::open_warehouse(&config)?);
    let store: Arc<dyn MarketStore> = warehouse.clone();

    match &cli.command {
        Command::Sync(args) => sync::run(args, config, store).await,
        Command::Coins { command } => {
            coins::run(command, ToolSurface::new(store), &config).await.map(Some)
        }
        Command::Serve(args) => serve::run(args, config, store).await.map(|()| None),
        Command::History(args) => history::run(args, warehouse).await.map(Some),
        Command::Tools => Ok(None),
    }
}

/// Run one tool call on the blocking pool, bounded by the store timeout.
pub(crate) async fn call_tool(
    surface: &ToolSurface,
    config: &AppConfig,
    tool: &str,
    args: Value,
) -> Value {
    let surface = surface.clone();
    let name = tool.to_owned();
    let task = tokio::task::spawn_blocking(move || surface.call(&name, &args));

    match tokio::time::timeout(config.store_timeout, task).await {
        Ok(Ok(value)) => value,
        Ok(Err(join_error)) if join_error.is_panic() => {
            std::panic::resume_unwind(join_error.into_panic())
        }
        Ok(Err(join_error)) => serde_json::json!({ "error": join_error.to_string() }),
        Err(_) => serde_json::json!({
            "error": format!(
                "tool '{tool}' timed out after {}ms",
                config.store_timeout.as_millis()
            )
        }),
    }
}
