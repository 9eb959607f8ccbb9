//! Tokenized vault issuing shares over a single underlying asset.
//!
//! Assets under management are the vault's own underlying balance; strategy profit is modelled
//! by [`ShareVault::report_gain`], which raises assets per share.

use crate::chain::TokenLedger;
use crate::error::{BackendError, BackendResult};
use crate::fungible::ReceiptMarket;
use defi_agg_domain::{Address, ExchangeRate, Position, TokenAmount};
use primitive_types::U256;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ShareVault {
    /// Vault identity; also the share token address.
    address: Address,
    asset: Address,
}

impl ShareVault {
    #[must_use]
    pub fn new(address: impl Into<Address>, asset: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            asset: asset.into(),
        }
    }

    #[must_use]
    pub fn asset(&self) -> &Address {
        &self.asset
    }

    #[must_use]
    pub fn total_assets(&self, ledger: &TokenLedger) -> TokenAmount {
        ledger.balance_of(&self.asset, &self.address)
    }

    #[must_use]
    pub fn total_shares(&self, ledger: &TokenLedger) -> TokenAmount {
        ledger.total_supply(&self.address)
    }

    /// Assets behind outstanding shares; shares with nothing behind them cannot be priced.
    fn backing_assets(&self, ledger: &TokenLedger) -> BackendResult<U256> {
        let assets = self.total_assets(ledger);
        if assets.is_zero() {
            return Err(BackendError::InvalidAmount("vault has no assets".into()));
        }
        Ok(assets.as_u256())
    }

    /// Shares minted for `assets`, rounded down.
    pub fn convert_to_shares(&self, ledger: &TokenLedger, assets: TokenAmount) -> BackendResult<TokenAmount> {
        let supply = self.total_shares(ledger);
        if supply.is_zero() {
            return Ok(assets);
        }
        assets
            .mul_div(supply.as_u256(), self.backing_assets(ledger)?)
            .ok_or(BackendError::Overflow)
    }

    /// Assets paid for `shares`, rounded down.
    pub fn convert_to_assets(&self, ledger: &TokenLedger, shares: TokenAmount) -> BackendResult<TokenAmount> {
        let supply = self.total_shares(ledger);
        if supply.is_zero() {
            return Ok(shares);
        }
        shares
            .mul_div(self.total_assets(ledger).as_u256(), supply.as_u256())
            .ok_or(BackendError::Overflow)
    }

    /// Shares that must be burned to withdraw exactly `assets`, rounded up.
    pub fn preview_withdraw(&self, ledger: &TokenLedger, assets: TokenAmount) -> BackendResult<TokenAmount> {
        let supply = self.total_shares(ledger);
        if supply.is_zero() {
            return Ok(assets);
        }
        assets
            .mul_div_ceil(supply.as_u256(), self.backing_assets(ledger)?)
            .ok_or(BackendError::Overflow)
    }

    pub fn deposit(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        assets: TokenAmount,
        receiver: &Address,
    ) -> BackendResult<TokenAmount> {
        let shares = self.convert_to_shares(ledger, assets)?;
        if shares.is_zero() {
            return Err(BackendError::InvalidAmount("deposit rounds to zero shares".into()));
        }
        ledger.transfer(&self.asset, from, &self.address, assets)?;
        ledger.mint(&self.address, receiver, shares)?;

        debug!(vault = %self.address, receiver = %receiver, assets = %assets, shares = %shares, "Vault deposit");
        Ok(shares)
    }

    pub fn redeem(
        &mut self,
        ledger: &mut TokenLedger,
        owner: &Address,
        shares: TokenAmount,
        receiver: &Address,
    ) -> BackendResult<TokenAmount> {
        let assets = self.convert_to_assets(ledger, shares)?;
        ledger.burn(&self.address, owner, shares)?;
        ledger.transfer(&self.asset, &self.address, receiver, assets)?;

        debug!(vault = %self.address, owner = %owner, shares = %shares, assets = %assets, "Vault redeem");
        Ok(assets)
    }

    /// Credits strategy profit to the vault.
    pub fn report_gain(&mut self, ledger: &mut TokenLedger, gain: TokenAmount) -> BackendResult<()> {
        ledger.mint(&self.asset, &self.address, gain)?;
        debug!(vault = %self.address, gain = %gain, "Gain reported");
        Ok(())
    }

    fn price_per_share(&self, ledger: &TokenLedger) -> ExchangeRate {
        let supply = self.total_shares(ledger);
        if supply.is_zero() {
            return ExchangeRate::new(U256::one(), U256::one());
        }
        ExchangeRate::new(self.total_assets(ledger).as_u256(), supply.as_u256())
    }
}

impl ReceiptMarket for ShareVault {
    fn address(&self) -> &Address {
        &self.address
    }

    fn underlying(&self) -> &Address {
        &self.asset
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
        self.deposit(ledger, from, amount, beneficiary)
    }

    fn receipt_balance(&self, ledger: &TokenLedger, holder: &Address) -> TokenAmount {
        ledger.balance_of(&self.address, holder)
    }

    fn redeemable_value(&self, ledger: &TokenLedger, holder: &Address) -> TokenAmount {
        self.convert_to_assets(ledger, self.receipt_balance(ledger, holder))
            .unwrap_or(TokenAmount::max())
    }

    fn receipt_for_underlying(
        &self,
        ledger: &TokenLedger,
        amount: TokenAmount,
    ) -> BackendResult<TokenAmount> {
        self.preview_withdraw(ledger, amount)
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
        ShareVault::redeem(self, ledger, holder, receipt, to)
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
            token: self.asset.clone(),
            principal,
            shares: self.receipt_balance(ledger, holder),
            rate: self.price_per_share(ledger),
        }
    }
}
