//! Converts one untyped provider item into a [`MarketRecord`].
//!
//! Required fields are `id`, `symbol`, `name`, a price and `last_updated`.
//! The price may arrive as `current_price` (the provider's name), `price_usd`
//! or `price_in_usd`. Unknown fields are ignored.

use serde_json::{Map, Value};

use crate::{validate_price, CoinSymbol, MarketRecord, UtcDateTime, ValidationError};

const PRICE_FIELDS: [&str; 3] = ["current_price", "price_usd", "price_in_usd"];

/// Validate one raw item. Pure; never panics on unexpected shapes.
pub fn validate(raw: &Value) -> Result<MarketRecord, ValidationError> {
    let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let id = required_string(object, "id")?;
    let symbol = CoinSymbol::parse(required_string(object, "symbol")?)?;
    let name = required_string(object, "name")?;
    let (price_field, price_usd) = required_price(object)?;
    validate_price(price_field, price_usd)?;
    let last_updated = UtcDateTime::parse(required_string(object, "last_updated")?)?;

    MarketRecord::new(id, symbol, name, price_usd, last_updated)
}

fn required_string<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { field }),
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(other) => Err(ValidationError::InvalidField {
            field,
            raw: other.to_string(),
            reason: String::from("expected a string"),
        }),
    }
}

/// First price field present, with its name, so errors point at what the provider sent.
fn required_price(object: &Map<String, Value>) -> Result<(&'static str, f64), ValidationError> {
    let Some((field, value)) = PRICE_FIELDS
        .iter()
        .find_map(|field| object.get(*field).map(|value| (*field, value)))
    else {
        return Err(ValidationError::MissingField {
            field: "current_price",
        });
    };

    match value {
        Value::Number(number) => number
            .as_f64()
            .map(|price| (field, price))
            .ok_or_else(|| ValidationError::InvalidField {
                field,
                raw: number.to_string(),
                reason: String::from("not representable as f64"),
            }),
        Value::Null => Err(ValidationError::MissingField { field }),
        other => Err(ValidationError::InvalidField {
            field,
            raw: other.to_string(),
            reason: String::from("expected a number"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn provider_item() -> Value {
        json!({
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "image": "https://example.invalid/btc.png",
            "current_price": 65_123.5,
            "market_cap": 1_280_000_000_000u64,
            "market_cap_rank": 1,
            "last_updated": "2024-03-01T12:34:56.789Z"
        })
    }

    #[test]
    fn provider_shape_validates_and_ignores_extras() {
        let record = validate(&provider_item()).expect("valid item");
        assert_eq!(record.id, "bitcoin");
        assert_eq!(record.symbol.as_str(), "BTC");
        assert_eq!(record.price_usd, 65_123.5);
    }

    #[test]
    fn price_aliases_are_accepted() {
        let mut item = provider_item();
        let object = item.as_object_mut().expect("object");
        object.remove("current_price");
        object.insert(String::from("price_in_usd"), json!(1.25));

        assert_eq!(validate(&item).expect("valid").price_usd, 1.25);
    }

    #[test]
    fn null_price_is_reported_as_missing() {
        let mut item = provider_item();
        item["current_price"] = Value::Null;

        let err = validate(&item).expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::MissingField {
                field: "current_price"
            }
        );
    }

    #[test]
    fn negative_price_names_the_provider_field_and_value() {
        let mut item = provider_item();
        item["current_price"] = json!(-3.5);

        let err = validate(&item).expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::NegativeValue {
                field: "current_price",
                value: -3.5
            }
        );
    }

    #[test]
    fn blank_name_and_spaced_id_fail() {
        let mut blank_name = provider_item();
        blank_name["name"] = json!("");
        let mut spaced_id = provider_item();
        spaced_id["id"] = json!("bit coin");

        assert_eq!(validate(&blank_name).expect_err("must fail"), ValidationError::EmptyName);
        assert_eq!(validate(&spaced_id).expect_err("must fail").field(), Some("id"));
    }

    #[test]
    fn wrong_type_carries_field_and_raw_value() {
        let mut item = provider_item();
        item["name"] = json!(42);

        let err = validate(&item).expect_err("must fail");
        assert_eq!(err.field(), Some("name"));
        assert!(matches!(err, ValidationError::InvalidField { ref raw, .. } if raw == "42"));
    }

    #[test]
    fn missing_timestamp_fails() {
        let mut item = provider_item();
        item.as_object_mut().expect("object").remove("last_updated");

        let err = validate(&item).expect_err("must fail");
        assert_eq!(err.field(), Some("last_updated"));
    }

    #[test]
    fn non_object_items_fail() {
        assert_eq!(
            validate(&json!(["bitcoin"])).expect_err("must fail"),
            ValidationError::NotAnObject
        );
    }
}
