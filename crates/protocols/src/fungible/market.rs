//! The seam between the fungible adapter and the backends that issue receipt assets.

use crate::chain::TokenLedger;
use crate::error::BackendResult;
use defi_agg_domain::{Address, Position, TokenAmount};
use std::fmt::Debug;

/// A backend that takes an underlying asset and issues a receipt asset redeemable for it.
///
/// Amounts named `receipt` are in the backend's receipt units; everything else is underlying.
pub trait ReceiptMarket: Debug {
    /// Identity of the backend (and of its custody account).
    fn address(&self) -> &Address;

    fn underlying(&self) -> &Address;

    fn receipt_token(&self) -> &Address;

    /// Supplies `amount` of underlying held by `from`, crediting the receipt to `beneficiary`.
    ///
    /// Returns the receipt amount credited.
    fn supply(
        &mut self,
        ledger: &mut TokenLedger,
        from: &Address,
        amount: TokenAmount,
        beneficiary: &Address,
    ) -> BackendResult<TokenAmount>;

    fn receipt_balance(&self, ledger: &TokenLedger, holder: &Address) -> TokenAmount;

    /// Underlying `holder` could redeem right now.
    fn redeemable_value(&self, ledger: &TokenLedger, holder: &Address) -> TokenAmount;

    /// Receipt needed to redeem at least `amount` of underlying, rounded up.
    fn receipt_for_underlying(
        &self,
        ledger: &TokenLedger,
        amount: TokenAmount,
    ) -> BackendResult<TokenAmount>;

    /// Moves `receipt` from `owner` to `to`, spending `spender`'s allowance.
    fn pull_receipt(
        &mut self,
        ledger: &mut TokenLedger,
        spender: &Address,
        owner: &Address,
        to: &Address,
        receipt: TokenAmount,
    ) -> BackendResult<()>;

    /// Burns `receipt` held by `holder` and pays the underlying to `to`.
    fn redeem(
        &mut self,
        ledger: &mut TokenLedger,
        holder: &Address,
        receipt: TokenAmount,
        to: &Address,
    ) -> BackendResult<TokenAmount>;

    fn approve_receipt(
        &mut self,
        ledger: &mut TokenLedger,
        owner: &Address,
        spender: &Address,
        receipt: TokenAmount,
    );

    /// The holder's stake in this backend's own representation.
    fn position(&self, ledger: &TokenLedger, holder: &Address, principal: TokenAmount) -> Position;
}
