//! Behavior-driven tests for the CRUD tool surface
//!
//! These tests verify HOW tool callers experience the store: every call
//! returns a JSON value, absence is `null`, and failures are `{"error": ...}`.

use std::sync::Arc;

use coinsync_core::{MarketStore, ToolSurface};
use coinsync_warehouse::{Warehouse, WarehouseConfig};
use serde_json::{json, Value};

fn surface() -> (tempfile::TempDir, ToolSurface) {
    let temp = tempfile::tempdir().expect("tempdir");
    let warehouse = Warehouse::open(WarehouseConfig::at_path(temp.path().join("tools.duckdb")))
        .expect("warehouse");
    let store: Arc<dyn MarketStore> = Arc::new(warehouse);
    (temp, ToolSurface::new(store))
}

fn is_error(value: &Value) -> bool {
    value.get("error").and_then(Value::as_str).is_some()
}

// =============================================================================
// Tool Surface: Round Trip
// =============================================================================

#[test]
fn when_a_coin_is_added_updated_and_deleted_each_step_is_visible() {
    let (_temp, tools) = surface();

    // Given: Cardano is added
    let added = tools.add("cardano", "ADA", "Cardano", 0.45);
    assert_eq!(added["id"], "cardano");
    assert_eq!(added["symbol"], "ADA");
    assert_eq!(added["price_usd"], 0.45);

    // When: It is fetched, repriced and fetched again
    let fetched = tools.get_by_symbol("ADA");
    let updated = tools.update_price("ADA", 0.48);
    let refetched = tools.get_by_symbol("ada");

    // Then: Each read reflects the latest write
    assert_eq!(fetched["price_usd"], 0.45);
    assert_eq!(updated["price_usd"], 0.48);
    assert_eq!(refetched["price_usd"], 0.48);

    // When: It is deleted
    let deleted = tools.delete("ADA");

    // Then: The deleted record is echoed and the symbol is gone
    assert_eq!(deleted["status"], "deleted");
    assert_eq!(deleted["deleted_record"]["price_usd"], 0.48);
    assert_eq!(tools.get_by_symbol("ADA"), Value::Null);
}

// =============================================================================
// Tool Surface: Not Found and Errors
// =============================================================================

#[test]
fn when_a_symbol_is_unknown_reads_and_writes_return_null() {
    let (_temp, tools) = surface();

    assert_eq!(tools.get_by_symbol("NOPE"), Value::Null);
    assert_eq!(tools.update_price("NOPE", 1.0), Value::Null);
    assert_eq!(tools.delete("NOPE"), Value::Null);
}

#[test]
fn when_an_id_is_added_twice_the_second_add_is_an_error_value() {
    let (_temp, tools) = surface();
    tools.add("cardano", "ADA", "Cardano", 0.45);

    let second = tools.add("cardano", "ADA", "Cardano Again", 9.99);

    assert!(is_error(&second), "{second}");
    assert!(second["error"]
        .as_str()
        .expect("message")
        .contains("cardano"));
    assert_eq!(tools.get_by_symbol("ADA")["name"], "Cardano");
}

#[test]
fn when_input_is_invalid_an_error_value_is_returned() {
    let (_temp, tools) = surface();

    assert!(is_error(&tools.add("", "ADA", "Cardano", 0.45)));
    assert!(is_error(&tools.add("cardano", "  ", "Cardano", 0.45)));
    assert!(is_error(&tools.add("cardano", "ADA", "Cardano", -1.0)));
    assert!(is_error(&tools.add("card ano", "ADA", "Cardano", 0.45)));
    assert!(is_error(&tools.add("cardano", "ADA", "", 0.45)));
    assert!(is_error(&tools.update_price("ADA", f64::INFINITY)));
    assert_eq!(tools.get_all(), json!([]));
}

#[test]
fn when_listing_every_coin_is_returned_in_symbol_order() {
    let (_temp, tools) = surface();
    tools.add("solana", "sol", "Solana", 145.0);
    tools.add("bitcoin", "btc", "Bitcoin", 65_000.0);

    let all = tools.get_all();

    let symbols = all
        .as_array()
        .expect("array")
        .iter()
        .map(|coin| coin["symbol"].as_str().expect("symbol").to_owned())
        .collect::<Vec<_>>();
    assert_eq!(symbols, vec!["BTC", "SOL"]);
}

// =============================================================================
// Tool Surface: Dispatch by Name
// =============================================================================

#[test]
fn when_tools_are_called_by_their_long_names_arguments_map_through() {
    let (_temp, tools) = surface();

    let added = tools.call(
        "add_cryptocurrency",
        &json!({"id": "cardano", "symbol": "ADA", "name": "Cardano", "price_in_usd": 0.45}),
    );
    let updated = tools.call(
        "update_cryptocurrency_price",
        &json!({"symbol": "ada", "new_price": 0.48}),
    );
    let deleted = tools.call("delete_cryptocurrency", &json!({"symbol": "ADA"}));
    let after = tools.call("get_cryptocurrency_by_symbol", &json!({"symbol": "ADA"}));

    assert_eq!(added["price_usd"], 0.45);
    assert_eq!(updated["price_usd"], 0.48);
    assert_eq!(deleted["deleted_record"]["id"], "cardano");
    assert_eq!(after, Value::Null);
}

#[test]
fn when_dispatch_input_is_wrong_an_error_value_is_returned() {
    let (_temp, tools) = surface();

    assert!(is_error(&tools.call("drop_table", &json!({}))));
    assert!(is_error(&tools.call("get_by_symbol", &json!({}))));
    assert!(is_error(
        &tools.call("update_price", &json!({"symbol": "ADA", "price": "cheap"}))
    ));
    assert_eq!(tools.call("get_all", &Value::Null), json!([]));
}

#[test]
fn when_tools_are_listed_all_five_operations_are_described() {
    let names = ToolSurface::list_tools()
        .iter()
        .map(|tool| tool.name)
        .collect::<Vec<_>>();

    assert_eq!(
        names,
        vec!["get_all", "get_by_symbol", "add", "update_price", "delete"]
    );
}
