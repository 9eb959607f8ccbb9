//! Lending pool with a rebasing receipt token.
//!
//! Balances are stored scaled by the liquidity index, so every holder's receipt balance grows
//! as interest accrues without any per-holder update.

use crate::chain::TokenLedger;
use crate::error::{BackendError, BackendResult};
use crate::fungible::ReceiptMarket;
use defi_agg_domain::{Address, BPS_DENOMINATOR, Position, TokenAmount};
use primitive_types::U256;
use std::collections::HashMap;
use tracing::debug;

/// Fixed-point unit of the liquidity index (27 decimals).
pub fn ray() -> U256 {
    U256::exp10(27)
}

#[derive(Debug, Clone)]
pub struct LendingPool {
    address: Address,
    underlying: Address,
    receipt_token: Address,
    /// Underlying per scaled unit, in RAY.
    liquidity_index: U256,
    scaled_balances: HashMap<Address, TokenAmount>,
    scaled_supply: TokenAmount,
    /// Receipt allowances in nominal (rebased) units.
    allowances: HashMap<(Address, Address), TokenAmount>,
}

impl LendingPool {
    /// Creates a pool with an index of exactly one.
    #[must_use]
    pub fn new(
        address: impl Into<Address>,
        underlying: impl Into<Address>,
        receipt_token: impl Into<Address>,
    ) -> Self {
        Self {
            address: address.into(),
            underlying: underlying.into(),
            receipt_token: receipt_token.into(),
            liquidity_index: ray(),
            scaled_balances: HashMap::new(),
            scaled_supply: TokenAmount::zero(),
            allowances: HashMap::new(),
        }
    }

    /// Rebased receipt balance of `holder`.
    #[must_use]
    pub fn balance_of(&self, holder: &Address) -> TokenAmount {
        self.to_nominal(self.scaled_balance(holder))
    }

    #[must_use]
    pub fn total_supply(&self) -> TokenAmount {
        self.to_nominal(self.scaled_supply)
    }

    #[must_use]
    pub fn allowance(&self, owner: &Address, spender: &Address) -> TokenAmount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Pulls `amount` of underlying from `from` and credits the receipt to `on_behalf_of`.
    pub fn supply(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        amount: TokenAmount,
        on_behalf_of: &Address,
    ) -> BackendResult<TokenAmount> {
        let scaled = amount
            .mul_div(ray(), self.liquidity_index)
            .ok_or(BackendError::Overflow)?;
        if scaled.is_zero() {
            return Err(BackendError::InvalidAmount("supply rounds to zero".into()));
        }
        ledger.transfer(&self.underlying, from, &self.address, amount)?;
        self.add_scaled(on_behalf_of, scaled)?;
        self.scaled_supply = self
            .scaled_supply
            .checked_add(scaled)
            .ok_or(BackendError::Overflow)?;

        debug!(pool = %self.address, holder = %on_behalf_of, amount = %amount, "Supplied");
        Ok(self.to_nominal(scaled))
    }

    /// Burns `amount` of `owner`'s receipt and pays the same amount of underlying to `to`.
    pub fn withdraw(
        &mut self,
        ledger: &mut TokenLedger,
        owner: &Address,
        amount: TokenAmount,
        to: &Address,
    ) -> BackendResult<TokenAmount> {
        let scaled = self.scaled_for(owner, amount)?;
        ledger.transfer(&self.underlying, &self.address, to, amount)?;
        self.sub_scaled(owner, scaled);
        self.scaled_supply = self.scaled_supply.saturating_sub(scaled);

        debug!(pool = %self.address, holder = %owner, amount = %amount, "Withdrawn");
        Ok(amount)
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: TokenAmount) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Moves `amount` of rebased receipt from `from` to `to`, spending `spender`'s allowance.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> BackendResult<()> {
        let approved = self.allowance(from, spender);
        let remaining = approved
            .checked_sub(amount)
            .ok_or_else(|| BackendError::InsufficientAllowance {
                token: self.receipt_token.clone(),
                owner: from.clone(),
                spender: spender.clone(),
                required: amount,
                approved,
            })?;
        let scaled = self.scaled_for(from, amount)?;
        self.sub_scaled(from, scaled);
        self.add_scaled(to, scaled)?;
        if approved != TokenAmount::max() {
            self.approve(from, spender, remaining);
        }
        Ok(())
    }

    /// Grows the liquidity index by `bps` and mints the matching underlying into the pool.
    pub fn accrue_interest(&mut self, ledger: &mut TokenLedger, bps: u32) -> BackendResult<()> {
        let before = self.total_supply();
        self.liquidity_index = self
            .liquidity_index
            .checked_mul(U256::from(BPS_DENOMINATOR + bps))
            .ok_or(BackendError::Overflow)?
            / U256::from(BPS_DENOMINATOR);
        let interest = self.total_supply().saturating_sub(before);
        if !interest.is_zero() {
            ledger.mint(&self.underlying, &self.address, interest)?;
        }

        debug!(pool = %self.address, bps, interest = %interest, "Interest accrued");
        Ok(())
    }

    fn scaled_balance(&self, holder: &Address) -> TokenAmount {
        self.scaled_balances
            .get(holder)
            .copied()
            .unwrap_or_default()
    }

    fn to_nominal(&self, scaled: TokenAmount) -> TokenAmount {
        scaled
            .mul_div(self.liquidity_index, ray())
            .unwrap_or(TokenAmount::max())
    }

    /// Scaled units covering `amount` of `holder`'s rebased balance, rounded up but never more
    /// than the holder owns.
    fn scaled_for(&self, holder: &Address, amount: TokenAmount) -> BackendResult<TokenAmount> {
        let available = self.balance_of(holder);
        if amount > available {
            return Err(BackendError::InsufficientBalance {
                token: self.receipt_token.clone(),
                account: holder.clone(),
                required: amount,
                available,
            });
        }
        let scaled = amount
            .mul_div_ceil(ray(), self.liquidity_index)
            .ok_or(BackendError::Overflow)?;
        Ok(scaled.min(self.scaled_balance(holder)))
    }

    fn add_scaled(&mut self, holder: &Address, scaled: TokenAmount) -> BackendResult<()> {
        let balance = self
            .scaled_balance(holder)
            .checked_add(scaled)
            .ok_or(BackendError::Overflow)?;
        self.scaled_balances.insert(holder.clone(), balance);
        Ok(())
    }

    fn sub_scaled(&mut self, holder: &Address, scaled: TokenAmount) {
        let balance = self.scaled_balance(holder).saturating_sub(scaled);
        if balance.is_zero() {
            self.scaled_balances.remove(holder);
        } else {
            self.scaled_balances.insert(holder.clone(), balance);
        }
    }
}

impl ReceiptMarket for LendingPool {
    fn address(&self) -> &Address {
        &self.address
    }

    fn underlying(&self) -> &Address {
        &self.underlying
    }

    fn receipt_token(&self) -> &Address {
        &self.receipt_token
    }

    fn supply(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        amount: TokenAmount,
        beneficiary: &Address,
    ) -> BackendResult<TokenAmount> {
        LendingPool::supply(self, ledger, from, amount, beneficiary)
    }

    fn receipt_balance(&self, _ledger: &TokenLedger, holder: &Address) -> TokenAmount {
        self.balance_of(holder)
    }

    fn redeemable_value(&self, _ledger: &TokenLedger, holder: &Address) -> TokenAmount {
        self.balance_of(holder)
    }

    fn receipt_for_underlying(
        &self,
        _ledger: &TokenLedger,
        amount: TokenAmount,
    ) -> BackendResult<TokenAmount> {
        Ok(amount)
    }

    fn pull_receipt(
        &mut self,
        _ledger: &mut TokenLedger,
        spender: &Address,
        owner: &Address,
        to: &Address,
        receipt: TokenAmount,
    ) -> BackendResult<()> {
        self.transfer_from(spender, owner, to, receipt)
    }

    fn redeem(
        &mut self,
        ledger: &mut TokenLedger,
        holder: &Address,
        receipt: TokenAmount,
        to: &Address,
    ) -> BackendResult<TokenAmount> {
        self.withdraw(ledger, holder, receipt, to)
    }

    fn approve_receipt(
        &mut self,
        _ledger: &mut TokenLedger,
        owner: &Address,
        spender: &Address,
        receipt: TokenAmount,
    ) {
        self.approve(owner, spender, receipt);
    }

    fn position(&self, _ledger: &TokenLedger, holder: &Address, principal: TokenAmount) -> Position {
        Position::FungiblePrincipal {
            token: self.underlying.clone(),
            principal,
            balance: self.balance_of(holder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(v: u64) -> TokenAmount {
        TokenAmount::from(v)
    }

    fn setup() -> (LendingPool, TokenLedger, Address) {
        let mut ledger = TokenLedger::new();
        let alice = Address::from("alice");
        ledger
            .mint(&Address::from("usdc"), &alice, amt(10_000))
            .unwrap();
        (LendingPool::new("pool", "usdc", "ausdc"), ledger, alice)
    }

    #[test]
    fn test_supply_and_withdraw_at_unit_index() {
        let (mut pool, mut ledger, alice) = setup();
        let usdc = Address::from("usdc");

        pool.supply(&mut ledger, &alice, amt(1_000), &alice).unwrap();
        assert_eq!(pool.balance_of(&alice), amt(1_000));
        assert_eq!(ledger.balance_of(&usdc, &Address::from("pool")), amt(1_000));

        pool.withdraw(&mut ledger, &alice, amt(400), &alice).unwrap();
        assert_eq!(pool.balance_of(&alice), amt(600));
        assert_eq!(ledger.balance_of(&usdc, &alice), amt(9_400));
    }

    #[test]
    fn test_interest_rebases_balances_and_stays_solvent() {
        let (mut pool, mut ledger, alice) = setup();
        pool.supply(&mut ledger, &alice, amt(1_000), &alice).unwrap();

        pool.accrue_interest(&mut ledger, 500).unwrap();
        assert_eq!(pool.balance_of(&alice), amt(1_050));
        assert_eq!(
            ledger.balance_of(&Address::from("usdc"), &Address::from("pool")),
            amt(1_050)
        );

        pool.withdraw(&mut ledger, &alice, amt(1_050), &alice).unwrap();
        assert!(pool.balance_of(&alice).is_zero());
        assert!(pool.total_supply().is_zero());
    }

    #[test]
    fn test_withdraw_beyond_balance_fails() {
        let (mut pool, mut ledger, alice) = setup();
        pool.supply(&mut ledger, &alice, amt(100), &alice).unwrap();
        let err = pool
            .withdraw(&mut ledger, &alice, amt(101), &alice)
            .unwrap_err();
        assert!(matches!(err, BackendError::InsufficientBalance { .. }));
        assert_eq!(pool.balance_of(&alice), amt(100));
    }

    #[test]
    fn test_receipt_transfer_requires_allowance() {
        let (mut pool, mut ledger, alice) = setup();
        let adapter = Address::from("adapter");
        pool.supply(&mut ledger, &alice, amt(100), &alice).unwrap();

        assert!(matches!(
            pool.transfer_from(&adapter, &alice, &adapter, amt(50)),
            Err(BackendError::InsufficientAllowance { .. })
        ));

        pool.approve(&alice, &adapter, amt(50));
        pool.transfer_from(&adapter, &alice, &adapter, amt(50))
            .unwrap();
        assert_eq!(pool.balance_of(&adapter), amt(50));
        assert!(pool.allowance(&alice, &adapter).is_zero());
    }
}
