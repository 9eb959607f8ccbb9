//! Money market whose receipt token appreciates against the underlying.
//!
//! The receipt is a plain ledger token issued under the market's own address; its value is
//! `receipt * exchange_rate / 1e18`.

use crate::chain::TokenLedger;
use crate::error::{BackendError, BackendResult};
use crate::fungible::ReceiptMarket;
use defi_agg_domain::{Address, BPS_DENOMINATOR, ExchangeRate, Position, TokenAmount};
use primitive_types::U256;
use tracing::debug;

/// Scale of the exchange-rate mantissa.
pub fn mantissa_one() -> U256 {
    U256::exp10(18)
}

#[derive(Debug, Clone)]
pub struct ExchangeRateMarket {
    /// Market identity; also the receipt token address.
    address: Address,
    underlying: Address,
    /// Underlying per receipt unit, scaled by 1e18.
    exchange_rate: U256,
}

impl ExchangeRateMarket {
    #[must_use]
    pub fn new(address: impl Into<Address>, underlying: impl Into<Address>, initial_rate: U256) -> Self {
        Self {
            address: address.into(),
            underlying: underlying.into(),
            exchange_rate: initial_rate,
        }
    }

    #[must_use]
    pub fn exchange_rate(&self) -> U256 {
        self.exchange_rate
    }

    /// Supplies `amount` of `from`'s underlying and mints `floor(amount * 1e18 / rate)` receipt
    /// to `minter`.
    pub fn mint(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        amount: TokenAmount,
        minter: &Address,
    ) -> BackendResult<TokenAmount> {
        let receipt = amount
            .mul_div(mantissa_one(), self.exchange_rate)
            .ok_or(BackendError::Overflow)?;
        if receipt.is_zero() {
            return Err(BackendError::InvalidAmount("mint rounds to zero".into()));
        }
        ledger.transfer(&self.underlying, from, &self.address, amount)?;
        ledger.mint(&self.address, minter, receipt)?;

        debug!(market = %self.address, minter = %minter, amount = %amount, receipt = %receipt, "Minted");
        Ok(receipt)
    }

    /// Burns `receipt` held by `redeemer` and pays `floor(receipt * rate / 1e18)` to `to`.
    pub fn redeem(
        &mut self,
        ledger: &mut TokenLedger,
        redeemer: &Address,
        receipt: TokenAmount,
        to: &Address,
    ) -> BackendResult<TokenAmount> {
        let amount = self.underlying_for(receipt)?;
        ledger.burn(&self.address, redeemer, receipt)?;
        ledger.transfer(&self.underlying, &self.address, to, amount)?;

        debug!(market = %self.address, redeemer = %redeemer, receipt = %receipt, amount = %amount, "Redeemed");
        Ok(amount)
    }

    /// Moves the rate to `rate`, minting underlying into the market so every receipt stays
    /// redeemable.
    pub fn set_exchange_rate(&mut self, ledger: &mut TokenLedger, rate: U256) -> BackendResult<()> {
        if rate.is_zero() {
            return Err(BackendError::InvalidAmount("exchange rate must be positive".into()));
        }
        self.exchange_rate = rate;
        let claims = self.underlying_for(ledger.total_supply(&self.address))?;
        let cash = ledger.balance_of(&self.underlying, &self.address);
        if claims > cash {
            ledger.mint(&self.underlying, &self.address, claims.saturating_sub(cash))?;
        }
        Ok(())
    }

    /// Raises the rate by `bps`.
    pub fn accrue_interest(&mut self, ledger: &mut TokenLedger, bps: u32) -> BackendResult<()> {
        let rate = self
            .exchange_rate
            .checked_mul(U256::from(BPS_DENOMINATOR + bps))
            .ok_or(BackendError::Overflow)?
            / U256::from(BPS_DENOMINATOR);
        self.set_exchange_rate(ledger, rate)
    }

    fn underlying_for(&self, receipt: TokenAmount) -> BackendResult<TokenAmount> {
        receipt
            .mul_div(self.exchange_rate, mantissa_one())
            .ok_or(BackendError::Overflow)
    }
}

impl ReceiptMarket for ExchangeRateMarket {
    fn address(&self) -> &Address {
        &self.address
    }

    fn underlying(&self) -> &Address {
        &self.underlying
    }

    fn receipt_token(&self) -> &Address {
        &self.address
    }

    fn supply(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        amount: TokenAmount,
        beneficiary: &Address,
    ) -> BackendResult<TokenAmount> {
        self.mint(ledger, from, amount, beneficiary)
    }

    fn receipt_balance(&self, ledger: &TokenLedger, holder: &Address) -> TokenAmount {
        ledger.balance_of(&self.address, holder)
    }

    fn redeemable_value(&self, ledger: &TokenLedger, holder: &Address) -> TokenAmount {
        self.underlying_for(self.receipt_balance(ledger, holder))
            .unwrap_or(TokenAmount::max())
    }

    fn receipt_for_underlying(
        &self,
        _ledger: &TokenLedger,
        amount: TokenAmount,
    ) -> BackendResult<TokenAmount> {
        amount
            .mul_div_ceil(mantissa_one(), self.exchange_rate)
            .ok_or(BackendError::Overflow)
    }

    fn pull_receipt(
        &mut self,
        ledger: &mut TokenLedger,
        spender: &Address,
        owner: &Address,
        to: &Address,
        receipt: TokenAmount,
    ) -> BackendResult<()> {
        ledger.transfer_from(&self.address, spender, owner, to, receipt)
    }

    fn redeem(
        &mut self,
        ledger: &mut TokenLedger,
        holder: &Address,
        receipt: TokenAmount,
        to: &Address,
    ) -> BackendResult<TokenAmount> {
        ExchangeRateMarket::redeem(self, ledger, holder, receipt, to)
    }

    fn approve_receipt(
        &mut self,
        ledger: &mut TokenLedger,
        owner: &Address,
        spender: &Address,
        receipt: TokenAmount,
    ) {
        ledger.approve(&self.address, owner, spender, receipt);
    }

    fn position(&self, ledger: &TokenLedger, holder: &Address, principal: TokenAmount) -> Position {
        Position::ExchangeRateBacked {
            token: self.underlying.clone(),
            principal,
            shares: self.receipt_balance(ledger, holder),
            rate: ExchangeRate::new(self.exchange_rate, mantissa_one()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(v: u64) -> TokenAmount {
        TokenAmount::from(v)
    }

    fn two_percent() -> U256 {
        U256::from(20_000_000_000_000_000u64)
    }

    #[test]
    fn test_mint_and_redeem_at_initial_rate() {
        let mut ledger = TokenLedger::new();
        let usdc = Address::from("usdc");
        let alice = Address::from("alice");
        ledger.mint(&usdc, &alice, amt(1_000)).unwrap();
        let mut market = ExchangeRateMarket::new("cusdc", "usdc", two_percent());

        let receipt = market.mint(&mut ledger, &alice, amt(990), &alice).unwrap();
        assert_eq!(receipt, amt(49_500));
        assert_eq!(market.redeemable_value(&ledger, &alice), amt(990));

        let paid = ExchangeRateMarket::redeem(&mut market, &mut ledger, &alice, amt(25_000), &alice)
            .unwrap();
        assert_eq!(paid, amt(500));
        assert_eq!(ledger.balance_of(&usdc, &alice), amt(510));
    }

    #[test]
    fn test_rate_rise_increases_value_and_funds_market() {
        let mut ledger = TokenLedger::new();
        let usdc = Address::from("usdc");
        let alice = Address::from("alice");
        ledger.mint(&usdc, &alice, amt(1_000)).unwrap();
        let mut market = ExchangeRateMarket::new("cusdc", "usdc", two_percent());
        market.mint(&mut ledger, &alice, amt(1_000), &alice).unwrap();

        market.accrue_interest(&mut ledger, 100).unwrap();
        assert_eq!(market.redeemable_value(&ledger, &alice), amt(1_010));
        assert_eq!(
            ledger.balance_of(&usdc, &Address::from("cusdc")),
            amt(1_010)
        );

        let receipt = market.receipt_balance(&ledger, &alice);
        let paid = ExchangeRateMarket::redeem(&mut market, &mut ledger, &alice, receipt, &alice)
            .unwrap();
        assert_eq!(paid, amt(1_010));
    }

    #[test]
    fn test_receipt_for_underlying_rounds_up() {
        let market = ExchangeRateMarket::new("cusdc", "usdc", U256::from(3u64) * U256::exp10(17));
        let ledger = TokenLedger::new();
        // 10 / 0.3 = 33.33.. receipt
        assert_eq!(market.receipt_for_underlying(&ledger, amt(10)).unwrap(), amt(34));
    }
}
