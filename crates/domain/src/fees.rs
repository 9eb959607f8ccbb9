//! Basis-point fee math.
//!
//! All fee results are exact integers: `fee = floor(amount * bps / 10_000)`.

use crate::error::{AggregatorError, AggregatorResult};
use crate::token::TokenAmount;
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis-point denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Ceiling on the configurable fee rate (10%).
pub const MAX_FEE_RATE_BPS: u32 = 1_000;

/// A validated fee rate in basis points, never above [`MAX_FEE_RATE_BPS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(u32);

impl FeeRate {
    /// Creates a fee rate, rejecting values above the ceiling.
    pub fn try_new(bps: u32) -> AggregatorResult<Self> {
        if bps > MAX_FEE_RATE_BPS {
            return Err(AggregatorError::FeeRateTooHigh {
                requested: bps,
                max: MAX_FEE_RATE_BPS,
            });
        }
        Ok(Self(bps))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    /// The rate as a percentage, for display only.
    pub fn as_percentage(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(100)
    }

    /// Splits `amount` into fee and net parts at this rate.
    pub fn quote(&self, amount: TokenAmount) -> FeeQuote {
        FeeQuote::new(amount, calculate_fee(amount, *self))
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bps", self.0)
    }
}

/// `floor(amount * rate / 10_000)` without intermediate overflow.
///
/// With `amount = q * 10_000 + r` the product splits into `q * rate + floor(r * rate / 10_000)`,
/// which is exact and never exceeds `amount`.
pub fn calculate_fee(amount: TokenAmount, rate: FeeRate) -> TokenAmount {
    let denominator = U256::from(BPS_DENOMINATOR);
    let bps = U256::from(rate.bps());
    let (quotient, remainder) = amount.as_u256().div_mod(denominator);
    TokenAmount(quotient * bps + remainder * bps / denominator)
}

/// A gross amount split into the fee withheld and the net amount forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub gross: TokenAmount,
    pub fee: TokenAmount,
    pub net: TokenAmount,
}

impl FeeQuote {
    fn new(gross: TokenAmount, fee: TokenAmount) -> Self {
        Self {
            gross,
            fee,
            net: gross.saturating_sub(fee),
        }
    }
}
