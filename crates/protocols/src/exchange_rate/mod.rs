//! Money-market backend with an appreciating receipt token.

/// Reference exchange-rate market.
pub mod market;

pub use market::{ExchangeRateMarket, mantissa_one};
