use crate::error::{AggregatorError, AggregatorResult};
use crate::token::{Address, TokenAmount};
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lowest tick a range position may use.
pub const MIN_TICK: i32 = -887_272;
/// Highest tick a range position may use.
pub const MAX_TICK: i32 = 887_272;

/// Opaque identifier a range-position backend assigns on mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    pub fn new(lower: i32, upper: i32) -> AggregatorResult<Self> {
        if lower >= upper {
            return Err(AggregatorError::InvalidParams(format!(
                "lower tick {lower} must be below upper tick {upper}"
            )));
        }
        if lower < MIN_TICK || upper > MAX_TICK {
            return Err(AggregatorError::InvalidParams(format!(
                "tick range [{lower}, {upper}] outside [{MIN_TICK}, {MAX_TICK}]"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// The widest range the backend accepts.
    pub fn full() -> Self {
        Self {
            lower: MIN_TICK,
            upper: MAX_TICK,
        }
    }

    pub fn contains(&self, tick: i32) -> bool {
        tick >= self.lower && tick < self.upper
    }
}

/// Underlying value of one receipt share, as an exact fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub numerator: U256,
    pub denominator: U256,
}

impl ExchangeRate {
    pub fn new(numerator: U256, denominator: U256) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `floor(shares * numerator / denominator)`; zero when the denominator is zero.
    pub fn value_of(&self, shares: TokenAmount) -> TokenAmount {
        shares
            .mul_div(self.numerator, self.denominator)
            .unwrap_or_default()
    }
}

/// A caller's stake in one backend, in the backend's own representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// Rebasing receipt: the receipt balance is the redeemable value.
    FungiblePrincipal {
        token: Address,
        principal: TokenAmount,
        balance: TokenAmount,
    },
    /// Exchange-rate receipt or vault share: value is `shares * rate`.
    ExchangeRateBacked {
        token: Address,
        principal: TokenAmount,
        shares: TokenAmount,
        rate: ExchangeRate,
    },
    /// Concentrated-liquidity range order.
    RangeOrder {
        id: PositionId,
        token0: Address,
        token1: Address,
        range: TickRange,
        liquidity: u128,
        /// Net amounts originally supplied.
        deposited: (TokenAmount, TokenAmount),
        /// Amounts currently backing the liquidity.
        underlying: (TokenAmount, TokenAmount),
        /// Amounts owed but not yet collected.
        owed: (TokenAmount, TokenAmount),
    },
}

impl Position {
    /// Live value snapshots, one per asset the position holds.
    pub fn yield_snapshots(&self) -> Vec<YieldSnapshot> {
        match self {
            Self::FungiblePrincipal {
                token,
                principal,
                balance,
            } => vec![YieldSnapshot::new(token.clone(), *principal, *balance)],
            Self::ExchangeRateBacked {
                token,
                principal,
                shares,
                rate,
            } => vec![YieldSnapshot::new(
                token.clone(),
                *principal,
                rate.value_of(*shares),
            )],
            Self::RangeOrder {
                token0,
                token1,
                deposited,
                underlying,
                owed,
                ..
            } => vec![
                YieldSnapshot::new(
                    token0.clone(),
                    deposited.0,
                    underlying.0.checked_add(owed.0).unwrap_or(TokenAmount::max()),
                ),
                YieldSnapshot::new(
                    token1.clone(),
                    deposited.1,
                    underlying.1.checked_add(owed.1).unwrap_or(TokenAmount::max()),
                ),
            ],
        }
    }
}

/// Principal against live redeemable value for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldSnapshot {
    pub token: Address,
    pub principal: TokenAmount,
    pub current_value: TokenAmount,
    /// Absolute difference between current value and principal.
    pub profit: TokenAmount,
    /// `true` when current value is at least the principal.
    pub is_profit: bool,
}

impl YieldSnapshot {
    pub fn new(token: Address, principal: TokenAmount, current_value: TokenAmount) -> Self {
        let is_profit = current_value >= principal;
        let profit = if is_profit {
            current_value.saturating_sub(principal)
        } else {
            principal.saturating_sub(current_value)
        };
        Self {
            token,
            principal,
            current_value,
            profit,
            is_profit,
        }
    }

    /// Signed profit as a percentage of principal, to four decimals.
    pub fn profit_pct(&self) -> Option<Decimal> {
        if self.principal.is_zero() {
            return None;
        }
        let ppm = self
            .profit
            .mul_div(U256::from(1_000_000u64), self.principal.as_u256())?
            .as_u256();
        if ppm > U256::from(i64::MAX as u64) {
            return None;
        }
        let magnitude = ppm.low_u64() as i64;
        let signed = if self.is_profit { magnitude } else { -magnitude };
        Some(Decimal::new(signed, 4))
    }

    /// Sums snapshots per token, preserving first-seen token order.
    pub fn aggregate(snapshots: impl IntoIterator<Item = YieldSnapshot>) -> Vec<YieldSnapshot> {
        let mut order = Vec::new();
        let mut totals: BTreeMap<Address, (TokenAmount, TokenAmount)> = BTreeMap::new();
        for snapshot in snapshots {
            let entry = totals.entry(snapshot.token.clone()).or_insert_with(|| {
                order.push(snapshot.token.clone());
                (TokenAmount::zero(), TokenAmount::zero())
            });
            entry.0 = entry
                .0
                .checked_add(snapshot.principal)
                .unwrap_or(TokenAmount::max());
            entry.1 = entry
                .1
                .checked_add(snapshot.current_value)
                .unwrap_or(TokenAmount::max());
        }
        order
            .into_iter()
            .filter_map(|token| {
                totals
                    .remove(&token)
                    .map(|(principal, current)| YieldSnapshot::new(token, principal, current))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amt(v: u64) -> TokenAmount {
        TokenAmount::from(v)
    }

    #[test]
    fn test_tick_range_validation() {
        assert!(TickRange::new(-60, 60).is_ok());
        assert!(TickRange::new(60, 60).is_err());
        assert!(TickRange::new(MIN_TICK - 1, 0).is_err());
        assert!(TickRange::full().contains(0));
        assert!(!TickRange::new(-60, 60).unwrap().contains(60));
    }

    #[test]
    fn test_rebasing_and_exchange_rate_normalize_to_same_shape() {
        let rebasing = Position::FungiblePrincipal {
            token: Address::from("usdc"),
            principal: amt(990),
            balance: amt(1000),
        };
        // 49_500 shares at 0.02 underlying per share, scaled 1e18
        let scaled = Position::ExchangeRateBacked {
            token: Address::from("usdc"),
            principal: amt(990),
            shares: amt(50_000),
            rate: ExchangeRate::new(U256::from(20_000_000_000_000_000u64), U256::exp10(18)),
        };

        let a = rebasing.yield_snapshots();
        let b = scaled.yield_snapshots();
        assert_eq!(a, b);
        assert_eq!(a[0].current_value, amt(1000));
        assert_eq!(a[0].profit, amt(10));
        assert!(a[0].is_profit);
    }

    #[test]
    fn test_loss_snapshot() {
        let snapshot = YieldSnapshot::new(Address::from("usdc"), amt(1000), amt(950));
        assert!(!snapshot.is_profit);
        assert_eq!(snapshot.profit, amt(50));
        assert_eq!(snapshot.profit_pct(), Some(dec!(-5)));
    }

    #[test]
    fn test_profit_pct() {
        let snapshot = YieldSnapshot::new(Address::from("usdc"), amt(990), amt(999));
        assert_eq!(snapshot.profit_pct(), Some(dec!(0.9090)));
        let empty = YieldSnapshot::new(Address::from("usdc"), amt(0), amt(0));
        assert_eq!(empty.profit_pct(), None);
        assert!(empty.is_profit);
    }

    #[test]
    fn test_range_order_snapshots_and_aggregate() {
        let position = Position::RangeOrder {
            id: PositionId(1),
            token0: Address::from("usdt"),
            token1: Address::from("weth"),
            range: TickRange::full(),
            liquidity: 1_000,
            deposited: (amt(9_900), amt(99)),
            underlying: (amt(9_900), amt(99)),
            owed: (amt(100), amt(1)),
        };
        let snapshots = position.yield_snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].current_value, amt(10_000));
        assert_eq!(snapshots[1].profit, amt(1));

        let doubled = YieldSnapshot::aggregate(snapshots.iter().cloned().chain(snapshots.clone()));
        assert_eq!(doubled.len(), 2);
        assert_eq!(doubled[0].token, Address::from("usdt"));
        assert_eq!(doubled[0].principal, amt(19_800));
        assert_eq!(doubled[1].current_value, amt(200));
    }
}
