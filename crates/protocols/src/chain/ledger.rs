//! Fungible token balances, allowances and supply.

use crate::error::{BackendError, BackendResult};
use defi_agg_domain::{Address, TokenAmount};
use std::collections::HashMap;

/// Balances and allowances for every fungible token on the ledger.
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    /// token -> holder -> balance
    balances: HashMap<Address, HashMap<Address, TokenAmount>>,
    /// token -> (owner, spender) -> remaining allowance
    allowances: HashMap<Address, HashMap<(Address, Address), TokenAmount>>,
    supply: HashMap<Address, TokenAmount>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn balance_of(&self, token: &Address, account: &Address) -> TokenAmount {
        self.balances
            .get(token)
            .and_then(|holders| holders.get(account))
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn total_supply(&self, token: &Address) -> TokenAmount {
        self.supply.get(token).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> TokenAmount {
        self.allowances
            .get(token)
            .and_then(|approvals| approvals.get(&(owner.clone(), spender.clone())))
            .copied()
            .unwrap_or_default()
    }

    pub fn mint(&mut self, token: &Address, to: &Address, amount: TokenAmount) -> BackendResult<()> {
        let supply = self
            .total_supply(token)
            .checked_add(amount)
            .ok_or(BackendError::Overflow)?;
        self.credit(token, to, amount)?;
        self.supply.insert(token.clone(), supply);
        Ok(())
    }

    pub fn burn(&mut self, token: &Address, from: &Address, amount: TokenAmount) -> BackendResult<()> {
        self.debit(token, from, amount)?;
        let supply = self.total_supply(token).saturating_sub(amount);
        self.supply.insert(token.clone(), supply);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> BackendResult<()> {
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)
    }

    /// Sets `spender`'s allowance over `owner`'s balance, replacing any previous value.
    pub fn approve(&mut self, token: &Address, owner: &Address, spender: &Address, amount: TokenAmount) {
        self.allowances
            .entry(token.clone())
            .or_default()
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Moves `amount` from `from` to `to` on behalf of `spender`, spending its allowance.
    pub fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> BackendResult<()> {
        let approved = self.allowance(token, from, spender);
        let remaining = approved
            .checked_sub(amount)
            .ok_or_else(|| BackendError::InsufficientAllowance {
                token: token.clone(),
                owner: from.clone(),
                spender: spender.clone(),
                required: amount,
                approved,
            })?;
        self.transfer(token, from, to, amount)?;
        if approved != TokenAmount::max() {
            self.approve(token, from, spender, remaining);
        }
        Ok(())
    }

    fn credit(&mut self, token: &Address, to: &Address, amount: TokenAmount) -> BackendResult<()> {
        let balance = self
            .balance_of(token, to)
            .checked_add(amount)
            .ok_or(BackendError::Overflow)?;
        self.balances
            .entry(token.clone())
            .or_default()
            .insert(to.clone(), balance);
        Ok(())
    }

    fn debit(&mut self, token: &Address, from: &Address, amount: TokenAmount) -> BackendResult<()> {
        let available = self.balance_of(token, from);
        let balance = available
            .checked_sub(amount)
            .ok_or_else(|| BackendError::InsufficientBalance {
                token: token.clone(),
                account: from.clone(),
                required: amount,
                available,
            })?;
        self.balances
            .entry(token.clone())
            .or_default()
            .insert(from.clone(), balance);
        Ok(())
    }
}
