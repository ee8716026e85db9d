//! CRUD tool surface for external tool-calling clients.
//!
//! Every operation returns a JSON value and never an `Err`:
//!
//! | Outcome | Value |
//! |---------|-------|
//! | record(s) | the serialized [`MarketRecord`] or an array of them |
//! | not found | `null` |
//! | failure | `{"error": "<message>"}` |

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::store::{InsertOutcome, MarketStore};
use crate::{CoinSymbol, NewCoin};

/// Describes one callable tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    /// Short name used by `call` and the CLI.
    pub name: &'static str,
    /// Long name accepted by `call` as well.
    pub alias: &'static str,
    /// One-line summary for tool listings.
    pub description: &'static str,
    /// Argument names, in positional order.
    pub params: &'static [&'static str],
}

const TOOLS: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "get_all",
        alias: "get_all_cryptocurrencies",
        description: "List every stored cryptocurrency, ordered by symbol.",
        params: &[],
    },
    ToolDescriptor {
        name: "get_by_symbol",
        alias: "get_cryptocurrency_by_symbol",
        description: "Fetch one cryptocurrency by symbol (case-insensitive); null when absent.",
        params: &["symbol"],
    },
    ToolDescriptor {
        name: "add",
        alias: "add_cryptocurrency",
        description: "Insert a new cryptocurrency; fails if the id already exists.",
        params: &["id", "symbol", "name", "price"],
    },
    ToolDescriptor {
        name: "update_price",
        alias: "update_cryptocurrency_price",
        description: "Set the USD price for a symbol; null when absent.",
        params: &["symbol", "price"],
    },
    ToolDescriptor {
        name: "delete",
        alias: "delete_cryptocurrency",
        description: "Delete a cryptocurrency by symbol and return the deleted record; null when absent.",
        params: &["symbol"],
    },
];

/// Stateless dispatcher over a [`MarketStore`].
#[derive(Clone)]
pub struct ToolSurface {
    store: Arc<dyn MarketStore>,
}

impl ToolSurface {
    /// Wrap a shared store handle.
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Every tool, in a stable order.
    pub fn list_tools() -> &'static [ToolDescriptor] {
        TOOLS
    }

    /// All stored coins, ordered by symbol.
    pub fn get_all(&self) -> Value {
        match self.store.fetch_all() {
            Ok(records) => {
                debug!(count = records.len(), "get_all");
                to_payload(&records)
            }
            Err(error) => failure("get_all", error),
        }
    }

    /// First coin stored under `symbol` (case-insensitive), or `null`.
    pub fn get_by_symbol(&self, symbol: &str) -> Value {
        let symbol = match CoinSymbol::parse(symbol) {
            Ok(symbol) => symbol,
            Err(error) => return failure("get_by_symbol", error),
        };
        match self.store.fetch_by_symbol(&symbol) {
            Ok(Some(record)) => to_payload(&record),
            Ok(None) => Value::Null,
            Err(error) => failure("get_by_symbol", error),
        }
    }

    /// Insert a new coin. An existing id is an error value, never an overwrite.
    pub fn add(&self, id: &str, symbol: &str, name: &str, price: f64) -> Value {
        let coin = match NewCoin::new(id, symbol, name, price) {
            Ok(coin) => coin,
            Err(error) => return failure("add", error),
        };
        match self.store.insert_one(&coin) {
            Ok(InsertOutcome::Inserted(record)) => to_payload(&record),
            Ok(InsertOutcome::Conflict { id }) => {
                failure("add", format!("cryptocurrency with id '{id}' already exists"))
            }
            Err(error) => failure("add", error),
        }
    }

    /// Reprice the coin stored under `symbol`; `null` when there is none.
    pub fn update_price(&self, symbol: &str, price: f64) -> Value {
        let symbol = match CoinSymbol::parse(symbol) {
            Ok(symbol) => symbol,
            Err(error) => return failure("update_price", error),
        };
        if let Err(error) = crate::validate_price("price", price) {
            return failure("update_price", error);
        }
        match self.store.update_price(&symbol, price) {
            Ok(Some(record)) => to_payload(&record),
            Ok(None) => Value::Null,
            Err(error) => failure("update_price", error),
        }
    }

    /// Remove the coin stored under `symbol` and echo it back, or `null`.
    pub fn delete(&self, symbol: &str) -> Value {
        let symbol = match CoinSymbol::parse(symbol) {
            Ok(symbol) => symbol,
            Err(error) => return failure("delete", error),
        };
        match self.store.delete_by_symbol(&symbol) {
            Ok(Some(record)) => json!({
                "status": "deleted",
                "deleted_record": to_payload(&record),
            }),
            Ok(None) => Value::Null,
            Err(error) => failure("delete", error),
        }
    }

    /// Dispatch by tool name or alias with a JSON argument object.
    pub fn call(&self, tool: &str, args: &Value) -> Value {
        let Some(descriptor) = TOOLS
            .iter()
            .find(|descriptor| descriptor.name == tool || descriptor.alias == tool)
        else {
            return failure("call", format!("unknown tool '{tool}'"));
        };

        let result = match descriptor.name {
            "get_all" => Ok(self.get_all()),
            "get_by_symbol" => str_arg(args, &["symbol"]).map(|symbol| self.get_by_symbol(symbol)),
            "add" => (|| -> Result<Value, String> {
                let id = str_arg(args, &["id"])?;
                let symbol = str_arg(args, &["symbol"])?;
                let name = str_arg(args, &["name"])?;
                let price = f64_arg(args, &["price", "price_in_usd", "price_usd"])?;
                Ok(self.add(id, symbol, name, price))
            })(),
            "update_price" => (|| -> Result<Value, String> {
                let symbol = str_arg(args, &["symbol"])?;
                let price = f64_arg(args, &["price", "new_price", "price_usd"])?;
                Ok(self.update_price(symbol, price))
            })(),
            "delete" => str_arg(args, &["symbol"]).map(|symbol| self.delete(symbol)),
            other => Err(format!("tool '{other}' has no handler")),
        };

        result.unwrap_or_else(|message| failure(descriptor.name, message))
    }
}

fn str_arg<'a>(args: &'a Value, names: &[&str]) -> Result<&'a str, String> {
    match lookup(args, names) {
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(other) => Err(format!("argument '{}' must be a string, got {other}", names[0])),
        None => Err(format!("missing argument '{}'", names[0])),
    }
}

fn f64_arg(args: &Value, names: &[&str]) -> Result<f64, String> {
    match lookup(args, names) {
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| format!("argument '{}' is out of range", names[0])),
        Some(other) => Err(format!("argument '{}' must be a number, got {other}", names[0])),
        None => Err(format!("missing argument '{}'", names[0])),
    }
}

fn lookup<'a>(args: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| args.get(*name))
        .filter(|value| !value.is_null())
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|error| json!({ "error": error.to_string() }))
}

fn failure(tool: &str, error: impl std::fmt::Display) -> Value {
    let message = error.to_string();
    warn!(tool, error = %message, "tool call failed");
    json!({ "error": message })
}
