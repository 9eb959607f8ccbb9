//! Fixed-rate swap router paying out of its own inventory.

use crate::chain::TokenLedger;
use crate::error::{BackendError, BackendResult};
use defi_agg_domain::{Address, TokenAmount};
use primitive_types::U256;
use std::collections::HashMap;
use tracing::debug;

/// Scale of router exchange rates.
pub fn rate_one() -> U256 {
    U256::exp10(18)
}

#[derive(Debug, Clone)]
pub struct SwapRouter {
    address: Address,
    /// (token_in, token_out) -> token_out per token_in, scaled by 1e18
    rates: HashMap<(Address, Address), U256>,
}

impl SwapRouter {
    #[must_use]
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            rates: HashMap::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn set_exchange_rate(&mut self, token_in: &Address, token_out: &Address, rate: U256) {
        self.rates.insert((token_in.clone(), token_out.clone()), rate);
    }

    pub fn get_amount_out(
        &self,
        token_in: &Address,
        token_out: &Address,
        amount_in: TokenAmount,
    ) -> BackendResult<TokenAmount> {
        let rate = self
            .rates
            .get(&(token_in.clone(), token_out.clone()))
            .ok_or_else(|| BackendError::NoRoute {
                token_in: token_in.clone(),
                token_out: token_out.clone(),
            })?;
        amount_in
            .mul_div(*rate, rate_one())
            .ok_or(BackendError::Overflow)
    }

    /// Swaps exactly `amount_in` from `payer`, sending the output to `recipient`.
    #[allow(clippy::too_many_arguments)]
    pub fn swap_exact_input(
        &mut self,
        ledger: &mut TokenLedger,
        payer: &Address,
        token_in: &Address,
        token_out: &Address,
        amount_in: TokenAmount,
        amount_out_minimum: TokenAmount,
        recipient: &Address,
    ) -> BackendResult<TokenAmount> {
        let amount_out = self.get_amount_out(token_in, token_out, amount_in)?;
        if amount_out < amount_out_minimum {
            return Err(BackendError::Slippage {
                minimum: amount_out_minimum,
                actual: amount_out,
            });
        }
        if amount_out.is_zero() {
            return Err(BackendError::InvalidAmount("swap output rounds to zero".into()));
        }
        let inventory = ledger.balance_of(token_out, &self.address);
        if inventory < amount_out {
            return Err(BackendError::InsufficientBalance {
                token: token_out.clone(),
                account: self.address.clone(),
                required: amount_out,
                available: inventory,
            });
        }
        ledger.transfer(token_in, payer, &self.address, amount_in)?;
        ledger.transfer(token_out, &self.address, recipient, amount_out)?;

        debug!(router = %self.address, token_in = %token_in, token_out = %token_out, amount_in = %amount_in, amount_out = %amount_out, "Swapped");
        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(v: u64) -> TokenAmount {
        TokenAmount::from(v)
    }

    #[test]
    fn test_swap_at_fixed_rate() {
        let mut ledger = TokenLedger::new();
        let (usdt, cake) = (Address::from("usdt"), Address::from("cake"));
        let alice = Address::from("alice");
        let mut router = SwapRouter::new("router");
        ledger.mint(&usdt, &alice, amt(1_000)).unwrap();
        ledger.mint(&cake, router.address(), amt(1_000)).unwrap();
        // 1 usdt buys 0.5 cake
        router.set_exchange_rate(&usdt, &cake, rate_one() / 2);

        let out = router
            .swap_exact_input(&mut ledger, &alice, &usdt, &cake, amt(99), amt(49), &alice)
            .unwrap();
        assert_eq!(out, amt(49));
        assert_eq!(ledger.balance_of(&cake, &alice), amt(49));
        assert_eq!(ledger.balance_of(&usdt, &alice), amt(901));
    }

    #[test]
    fn test_min_out_and_missing_route() {
        let mut ledger = TokenLedger::new();
        let (usdt, cake) = (Address::from("usdt"), Address::from("cake"));
        let alice = Address::from("alice");
        let mut router = SwapRouter::new("router");
        ledger.mint(&usdt, &alice, amt(1_000)).unwrap();

        assert!(matches!(
            router.get_amount_out(&usdt, &cake, amt(1)),
            Err(BackendError::NoRoute { .. })
        ));

        router.set_exchange_rate(&usdt, &cake, rate_one());
        assert!(matches!(
            router.swap_exact_input(&mut ledger, &alice, &usdt, &cake, amt(10), amt(11), &alice),
            Err(BackendError::Slippage { .. })
        ));
        // router has no cake inventory
        assert!(matches!(
            router.swap_exact_input(&mut ledger, &alice, &usdt, &cake, amt(10), amt(10), &alice),
            Err(BackendError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.balance_of(&usdt, &alice), amt(1_000));
    }
}
