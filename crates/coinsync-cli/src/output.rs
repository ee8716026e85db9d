use serde_json::Value;

use crate::error::CliError;

pub fn render(value: &Value, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{payload}");
    Ok(())
}

/// The message of a `{"error": ...}` payload, if `value` is one.
pub fn error_message(value: &Value) -> Option<&str> {
    value.get("error").and_then(Value::as_str)
}
