//! # Domain Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MarketRecord`] | One coin's validated market snapshot |
//! | [`NewCoin`] | Coin submitted through the plain-insert path |
//! | [`CoinSymbol`] | Uppercase-normalized ticker |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Every type validates at construction, so a value that exists is a value
//! the store will accept.

mod models;
mod symbol;
mod timestamp;

pub use models::{validate_price, MarketRecord, NewCoin};
pub use symbol::CoinSymbol;
pub use timestamp::UtcDateTime;
