//! Fee engine: the current rate and the ledger of fees collected per token.

use defi_agg_domain::{Address, AggregatorError, AggregatorResult, FeeQuote, FeeRate, TokenAmount};
use std::collections::BTreeMap;
use tracing::debug;

/// Owner-controlled fee rate plus the fees held for withdrawal.
#[derive(Debug, Clone, Default)]
pub struct FeeEngine {
    rate: FeeRate,
    /// Fees collected and not yet withdrawn, per token.
    collected: BTreeMap<Address, TokenAmount>,
    /// Fees ever collected, per token.
    lifetime: BTreeMap<Address, TokenAmount>,
}

impl FeeEngine {
    /// Creates an engine with an empty ledger.
    #[must_use]
    pub fn new(rate: FeeRate) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rate(&self) -> FeeRate {
        self.rate
    }

    /// Replaces the rate and returns the previous one.
    pub fn set_rate(&mut self, rate: FeeRate) -> FeeRate {
        std::mem::replace(&mut self.rate, rate)
    }

    #[must_use]
    pub fn quote(&self, amount: TokenAmount) -> FeeQuote {
        self.rate.quote(amount)
    }

    #[must_use]
    pub fn calculate_fee(&self, amount: TokenAmount) -> TokenAmount {
        self.quote(amount).fee
    }

    /// Adds `fee` of `token` to the ledger.
    pub fn accrue(&mut self, token: &Address, fee: TokenAmount) -> AggregatorResult<()> {
        if fee.is_zero() {
            return Ok(());
        }
        let collected = self
            .collected(token)
            .checked_add(fee)
            .ok_or(AggregatorError::Overflow)?;
        let lifetime = self
            .lifetime(token)
            .checked_add(fee)
            .ok_or(AggregatorError::Overflow)?;
        self.collected.insert(token.clone(), collected);
        self.lifetime.insert(token.clone(), lifetime);
        debug!(token = %token, fee = %fee, collected = %collected, "Fee accrued");
        Ok(())
    }

    /// Fees of `token` awaiting withdrawal.
    #[must_use]
    pub fn collected(&self, token: &Address) -> TokenAmount {
        self.collected.get(token).copied().unwrap_or_default()
    }

    /// Fees of `token` ever collected.
    #[must_use]
    pub fn lifetime(&self, token: &Address) -> TokenAmount {
        self.lifetime.get(token).copied().unwrap_or_default()
    }

    /// Non-zero balances awaiting withdrawal, ordered by token.
    pub fn balances(&self) -> Vec<(Address, TokenAmount)> {
        self.collected
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(token, amount)| (token.clone(), *amount))
            .collect()
    }

    /// Empties the ledger, returning what was owed. Fails when nothing is owed.
    pub fn drain(&mut self) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        let balances = self.balances();
        if balances.is_empty() {
            return Err(AggregatorError::NoFeesToWithdraw);
        }
        self.collected.clear();
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(v: u64) -> TokenAmount {
        TokenAmount::from(v)
    }

    #[test]
    fn test_accrue_per_token() {
        let mut engine = FeeEngine::new(FeeRate::try_new(100).unwrap());
        let usdc = Address::from("usdc");
        let weth = Address::from("weth");

        engine.accrue(&usdc, engine.calculate_fee(amt(1_000))).unwrap();
        engine.accrue(&usdc, engine.calculate_fee(amt(500))).unwrap();
        engine.accrue(&weth, amt(3)).unwrap();

        assert_eq!(engine.collected(&usdc), amt(15));
        assert_eq!(engine.collected(&weth), amt(3));
        assert_eq!(engine.balances().len(), 2);
    }

    #[test]
    fn test_set_rate_returns_previous() {
        let mut engine = FeeEngine::new(FeeRate::try_new(100).unwrap());
        let old = engine.set_rate(FeeRate::try_new(50).unwrap());
        assert_eq!(old.bps(), 100);
        assert_eq!(engine.rate().bps(), 50);
        assert_eq!(engine.calculate_fee(amt(1_000)), amt(5));
    }

    #[test]
    fn test_drain() {
        let mut engine = FeeEngine::new(FeeRate::try_new(100).unwrap());
        let usdc = Address::from("usdc");
        assert_eq!(engine.drain(), Err(AggregatorError::NoFeesToWithdraw));

        engine.accrue(&usdc, amt(10)).unwrap();
        assert_eq!(engine.drain().unwrap(), vec![(usdc.clone(), amt(10))]);
        assert!(engine.collected(&usdc).is_zero());
        assert_eq!(engine.lifetime(&usdc), amt(10));
        assert_eq!(engine.drain(), Err(AggregatorError::NoFeesToWithdraw));
    }
}
