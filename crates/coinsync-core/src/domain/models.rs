use serde::{Deserialize, Serialize};

use crate::{CoinSymbol, UtcDateTime, ValidationError};

/// One coin's market snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub id: String,
    pub symbol: CoinSymbol,
    pub name: String,
    #[serde(alias = "price_in_usd", alias = "current_price")]
    pub price_usd: f64,
    pub last_updated: UtcDateTime,
}

impl MarketRecord {
    /// Build a record, enforcing the id, name and price invariants.
    pub fn new(
        id: impl Into<String>,
        symbol: CoinSymbol,
        name: impl Into<String>,
        price_usd: f64,
        last_updated: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        let id = validate_id(id.into())?;
        let name = validate_name(name.into())?;
        validate_price("price_usd", price_usd)?;

        Ok(Self {
            id,
            symbol,
            name,
            price_usd,
            last_updated,
        })
    }
}

/// A coin submitted through the plain-insert path. The store assigns
/// `last_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCoin {
    pub id: String,
    pub symbol: CoinSymbol,
    pub name: String,
    pub price_usd: f64,
}

impl NewCoin {
    pub fn new(
        id: impl Into<String>,
        symbol: &str,
        name: impl Into<String>,
        price_usd: f64,
    ) -> Result<Self, ValidationError> {
        let id = validate_id(id.into())?;
        let symbol = CoinSymbol::parse(symbol)?;
        let name = validate_name(name.into())?;
        validate_price("price_usd", price_usd)?;

        Ok(Self {
            id,
            symbol,
            name,
            price_usd,
        })
    }
}

fn validate_id(id: String) -> Result<String, ValidationError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ValidationError::IdContainsWhitespace {
            id: trimmed.to_owned(),
        });
    }
    if trimmed.len() == id.len() {
        Ok(id)
    } else {
        Ok(trimmed.to_owned())
    }
}

fn validate_name(name: String) -> Result<String, ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name)
}

/// Prices must be finite and non-negative.
pub fn validate_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field, value });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> CoinSymbol {
        CoinSymbol::parse("btc").expect("symbol")
    }

    #[test]
    fn record_rejects_negative_price() {
        let err = MarketRecord::new("bitcoin", btc(), "Bitcoin", -0.01, UtcDateTime::now())
            .expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::NegativeValue {
                field: "price_usd",
                value: -0.01
            }
        );
    }

    #[test]
    fn id_with_inner_whitespace_is_rejected() {
        let err = MarketRecord::new("bit coin", btc(), "Bitcoin", 1.0, UtcDateTime::now())
            .expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::IdContainsWhitespace {
                id: String::from("bit coin")
            }
        );
    }

    #[test]
    fn blank_name_is_rejected_on_both_paths() {
        let record = MarketRecord::new("bitcoin", btc(), " ", 1.0, UtcDateTime::now());
        let coin = NewCoin::new("cardano", "ADA", "", 0.45);

        assert_eq!(record.expect_err("must fail"), ValidationError::EmptyName);
        assert_eq!(coin.expect_err("must fail"), ValidationError::EmptyName);
    }

    #[test]
    fn record_rejects_blank_id() {
        let err = MarketRecord::new("  ", btc(), "Bitcoin", 1.0, UtcDateTime::now())
            .expect_err("must fail");
        assert_eq!(err, ValidationError::EmptyId);
    }

    #[test]
    fn new_coin_normalizes_symbol_and_trims_id() {
        let coin = NewCoin::new(" cardano ", "ada", "Cardano", 0.45).expect("valid");
        assert_eq!(coin.id, "cardano");
        assert_eq!(coin.symbol.as_str(), "ADA");
    }

    #[test]
    fn new_coin_rejects_nan_price() {
        let err = NewCoin::new("cardano", "ADA", "Cardano", f64::NAN).expect_err("must fail");
        assert!(matches!(err, ValidationError::NonFiniteValue { .. }));
    }

    #[test]
    fn record_serializes_price_as_price_usd() {
        let ts = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("ts");
        let record = MarketRecord::new("bitcoin", btc(), "Bitcoin", 65_000.0, ts).expect("valid");
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(value["price_usd"], 65_000.0);
        assert_eq!(value["symbol"], "BTC");
        assert_eq!(value["last_updated"], "2024-01-01T00:00:00Z");
    }
}
