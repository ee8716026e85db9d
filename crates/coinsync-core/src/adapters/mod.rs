//! Market data provider adapters.

pub mod coingecko;

pub use coingecko::CoinGeckoAdapter;
