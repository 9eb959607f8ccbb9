//! One adapter implementation for every backend that issues a fungible receipt.

use super::ReceiptMarket;
use crate::adapter::{ProtocolAdapter, collect_input};
use crate::chain::Chain;
use defi_agg_domain::{
    Address, AggregatorError, AggregatorResult, OperationContext, OperationKind, OperationResult,
    Position, PrincipalBook, TokenAmount, YieldSnapshot,
};
use primitive_types::U256;
use tracing::info;

/// Shortfall in underlying base units tolerated from receipt rounding.
const ROUNDING_DUST: u64 = 1;

/// Adapter over a lending pool, an exchange-rate market or a share vault.
///
/// Principal is tracked per beneficiary and only ever moves by net deposits and requested
/// withdrawals; yield stays in the backend until a withdrawal realizes it.
#[derive(Debug, Clone)]
pub struct FungibleAdapter {
    name: String,
    version: String,
    address: Address,
    market: Address,
    principals: PrincipalBook,
}

impl FungibleAdapter {
    /// Creates an adapter with custody account `address` over the backend at `market`.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<Address>, market: impl Into<Address>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            address: address.into(),
            market: market.into(),
            principals: PrincipalBook::new(),
        }
    }

    #[must_use]
    pub fn principal(&self, user: &Address) -> TokenAmount {
        self.principals.principal(user)
    }

    fn require_underlying(&self, market: &dyn ReceiptMarket, token: &Address) -> AggregatorResult<()> {
        if market.underlying() != token {
            return Err(AggregatorError::InvalidParams(format!(
                "{} accepts {}, got {token}",
                self.name,
                market.underlying()
            )));
        }
        Ok(())
    }

    fn single_token(ctx: &OperationContext) -> AggregatorResult<&Address> {
        ctx.params
            .tokens
            .first()
            .ok_or_else(|| AggregatorError::InvalidParams("token required".into()))
    }
}

impl ProtocolAdapter for FungibleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn address(&self) -> &Address {
        &self.address
    }

    fn supported_operations(&self) -> Vec<OperationKind> {
        vec![OperationKind::Deposit, OperationKind::Withdraw]
    }

    fn deposit(&mut self, chain: &mut Chain, ctx: &OperationContext) -> AggregatorResult<OperationResult> {
        let token = Self::single_token(ctx)?;
        self.require_underlying(chain.receipt_market(&self.market)?, token)?;

        let net = collect_input(chain, &self.address, ctx, 0)?;

        // Principal is committed before any funds move.
        self.principals.debit(holder, requested)?;
        let (market, ledger) = chain.receipt_market_mut(&self.market)?;
        let receipt = market.supply(ledger, &self.address, net, &ctx.params.recipient)?;
        let minimum = ctx.params.min_amount(0);
        if receipt < minimum {
            return Err(AggregatorError::SlippageExceeded {
                minimum,
                actual: receipt,
            });
        }
        let principal = self.principals.credit(&ctx.params.recipient, net)?;

        info!(
            adapter = %self.name,
            user = %ctx.params.recipient,
            net = %net,
            receipt = %receipt,
            principal = %principal,
            "Supplied to backend"
        );
        Ok(OperationResult::new(OperationKind::Deposit, vec![receipt])
            .with_message(format!("supplied {net} {token}")))
    }

    fn withdraw(&mut self, chain: &mut Chain, ctx: &OperationContext) -> AggregatorResult<OperationResult> {
        let token = Self::single_token(ctx)?;
        let requested = ctx
            .params
            .amounts
            .first()
            .copied()
            .ok_or(AggregatorError::ZeroAmount)?;
        let holder = &ctx.caller;

        let principal = self.principals.principal(holder);
        let market = chain.receipt_market(&self.market)?;
        self.require_underlying(market, token)?;
        let current = market.redeemable_value(chain.ledger(), holder);

        if requested > principal {
            return Err(AggregatorError::InsufficientPrincipal { requested, principal });
        }

        // The proportional share of the holder's value, and never less than the request.
        let owed = requested
            .mul_div(current.as_u256(), principal.as_u256().max(U256::one()))
            .ok_or(AggregatorError::Overflow)?
            .max(requested);
        let gross = if owed <= current {
            owed
        } else if owed.saturating_sub(current) <= TokenAmount::from(ROUNDING_DUST) && !current.is_zero() {
            current
        } else {
            return Err(AggregatorError::InsufficientBalance {
                required: owed,
                available: current,
            });
        };

        // Principal is committed before any funds move.
        self.principals.debit(holder, requested)?;
        let (market, ledger) = chain.receipt_market_mut(&self.market)?;
        let receipt = market
            .receipt_for_underlying(ledger, gross)?
            .min(market.receipt_balance(ledger, holder));
        market.pull_receipt(ledger, &self.address, holder, &self.address, receipt)?;
        let redeemed = market.redeem(ledger, &self.address, receipt, &self.address)?;

        info!(
            adapter = %self.name,
            user = %holder,
            requested = %requested,
            redeemed = %redeemed,
            "Redeemed from backend"
        );
        Ok(OperationResult::new(OperationKind::Withdraw, vec![redeemed])
            .with_message(format!("redeemed {redeemed} {token}")))
    }

    fn user_balances(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        let market = chain.receipt_market(&self.market)?;
        Ok(vec![(market.underlying().clone(), self.principals.principal(user))])
    }

    fn user_yield(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<YieldSnapshot>> {
        Ok(self
            .user_positions(chain, user)?
            .iter()
            .flat_map(Position::yield_snapshots)
            .collect())
    }

    fn user_positions(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<Position>> {
        let market = chain.receipt_market(&self.market)?;
        let principal = self.principals.principal(user);
        if principal.is_zero() && market.receipt_balance(chain.ledger(), user).is_zero() {
            return Ok(Vec::new());
        }
        Ok(vec![market.position(chain.ledger(), user, principal)])
    }

    fn clone_box(&self) -> Box<dyn ProtocolAdapter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange_rate::ExchangeRateMarket;
    use crate::lending::LendingPool;
    use crate::vault::ShareVault;
    use defi_agg_domain::{FeeRate, OperationParams};

    const NOW: u64 = 1_700_000_000;

    fn amt(v: u64) -> TokenAmount {
        TokenAmount::from(v)
    }

    fn ctx(kind: OperationKind, caller: &str, amount: u64) -> OperationContext {
        let params = OperationParams::single("usdc", amount, caller, NOW);
        let quotes = match kind.fee_side() {
            defi_agg_domain::FeeSide::Input => {
                vec![FeeRate::try_new(100).unwrap().quote(params.amounts[0])]
            }
            _ => Vec::new(),
        };
        OperationContext {
            caller: Address::from(caller),
            treasury: Address::from("aggregator"),
            kind,
            params,
            quotes,
        }
    }

    fn funded_chain(backend: impl Into<crate::chain::Backend>) -> (Chain, Address) {
        let mut chain = Chain::new(NOW);
        let market = chain.deploy(backend).unwrap();
        let usdc = Address::from("usdc");
        let alice = Address::from("alice");
        chain.ledger_mut().mint(&usdc, &alice, amt(10_000)).unwrap();
        chain
            .ledger_mut()
            .approve(&usdc, &alice, &Address::from("adapter"), TokenAmount::max());
        (chain, market)
    }

    fn approve_receipt(chain: &mut Chain, market: &Address, owner: &str) {
        let (market, ledger) = chain.receipt_market_mut(market).unwrap();
        market.approve_receipt(
            ledger,
            &Address::from(owner),
            &Address::from("adapter"),
            TokenAmount::max(),
        );
    }

    #[test]
    fn test_lending_deposit_credits_net_principal() {
        let (mut chain, market) = funded_chain(LendingPool::new("pool", "usdc", "ausdc"));
        let mut adapter = FungibleAdapter::new("lending", "adapter", market.clone());
        let alice = Address::from("alice");

        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();

        assert_eq!(adapter.principal(&alice), amt(990));
        assert_eq!(chain.lending_pool(&market).unwrap().balance_of(&alice), amt(990));
        assert_eq!(
            chain
                .ledger()
                .balance_of(&Address::from("usdc"), &Address::from("aggregator")),
            amt(10)
        );
        assert!(chain
            .ledger()
            .balance_of(&Address::from("usdc"), &Address::from("adapter"))
            .is_zero());
    }

    #[test]
    fn test_withdraw_debits_requested_amount() {
        let (mut chain, market) = funded_chain(LendingPool::new("pool", "usdc", "ausdc"));
        let mut adapter = FungibleAdapter::new("lending", "adapter", market.clone());
        let alice = Address::from("alice");
        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();
        approve_receipt(&mut chain, &market, "alice");

        let result = adapter
            .withdraw(&mut chain, &ctx(OperationKind::Withdraw, "alice", 500))
            .unwrap();
        assert_eq!(result.output_amounts, vec![amt(500)]);
        assert_eq!(adapter.principal(&alice), amt(490));
        assert_eq!(
            chain
                .ledger()
                .balance_of(&Address::from("usdc"), &Address::from("adapter")),
            amt(500)
        );
    }

    #[test]
    fn test_withdraw_realizes_yield_proportionally() {
        let (mut chain, market) = funded_chain(LendingPool::new("pool", "usdc", "ausdc"));
        let mut adapter = FungibleAdapter::new("lending", "adapter", market.clone());
        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();
        approve_receipt(&mut chain, &market, "alice");
        {
            let (pool, ledger) = chain.lending_pool_mut(&market).unwrap();
            pool.accrue_interest(ledger, 1_000).unwrap();
        }

        // 990 principal now worth 1089
        let result = adapter
            .withdraw(&mut chain, &ctx(OperationKind::Withdraw, "alice", 495))
            .unwrap();
        assert_eq!(result.output_amounts, vec![amt(544)]);
        assert_eq!(adapter.principal(&Address::from("alice")), amt(495));
    }

    #[test]
    fn test_withdraw_over_principal_fails_without_change() {
        let (mut chain, market) = funded_chain(LendingPool::new("pool", "usdc", "ausdc"));
        let mut adapter = FungibleAdapter::new("lending", "adapter", market.clone());
        let alice = Address::from("alice");
        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();
        approve_receipt(&mut chain, &market, "alice");

        let err = adapter
            .withdraw(&mut chain, &ctx(OperationKind::Withdraw, "alice", 991))
            .unwrap_err();
        assert!(err.to_string().starts_with("Insufficient balance"));
        assert_eq!(adapter.principal(&alice), amt(990));
        assert_eq!(chain.lending_pool(&market).unwrap().balance_of(&alice), amt(990));
    }

    #[test]
    fn test_withdraw_beyond_backend_value_fails_without_change() {
        let rate = U256::from(20_000_000_000_000_000u64);
        let (mut chain, market) = funded_chain(ExchangeRateMarket::new("cusdc", "usdc", rate));
        let mut adapter = FungibleAdapter::new("exchange-rate", "adapter", market.clone());
        let alice = Address::from("alice");
        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();
        approve_receipt(&mut chain, &market, "alice");
        chain
            .ledger_mut()
            .transfer(&market, &alice, &Address::from("bob"), amt(49_500))
            .unwrap();

        let err = adapter
            .withdraw(&mut chain, &ctx(OperationKind::Withdraw, "alice", 990))
            .unwrap_err();
        assert!(matches!(err, AggregatorError::InsufficientBalance { .. }));
        assert_eq!(adapter.principal(&alice), amt(990));
    }

    #[test]
    fn test_withdraw_without_receipt_approval_fails() {
        let (mut chain, market) = funded_chain(LendingPool::new("pool", "usdc", "ausdc"));
        let mut adapter = FungibleAdapter::new("lending", "adapter", market);
        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();

        let err = adapter
            .withdraw(&mut chain, &ctx(OperationKind::Withdraw, "alice", 100))
            .unwrap_err();
        assert!(matches!(err, AggregatorError::InsufficientAllowance { .. }));
    }

    #[test]
    fn test_exchange_rate_profit_grows_with_rate() {
        let rate = U256::from(20_000_000_000_000_000u64);
        let (mut chain, market) = funded_chain(ExchangeRateMarket::new("cusdc", "usdc", rate));
        let mut adapter = FungibleAdapter::new("exchange-rate", "adapter", market.clone());
        let alice = Address::from("alice");
        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();

        let before = adapter.user_yield(&chain, &alice).unwrap();
        assert_eq!(before[0].principal, amt(990));
        assert_eq!(before[0].current_value, amt(990));
        assert!(before[0].profit.is_zero());

        {
            let (market, ledger) = chain.exchange_rate_market_mut(&market).unwrap();
            market.accrue_interest(ledger, 200).unwrap();
        }
        let after = adapter.user_yield(&chain, &alice).unwrap();
        assert!(after[0].profit > before[0].profit);
        assert!(after[0].is_profit);
        assert_eq!(after[0].current_value, amt(1_009));
    }

    #[test]
    fn test_vault_round_trip() {
        let (mut chain, market) = funded_chain(ShareVault::new("yvusdc", "usdc"));
        let mut adapter = FungibleAdapter::new("vault", "adapter", market.clone());
        let alice = Address::from("alice");
        adapter
            .deposit(&mut chain, &ctx(OperationKind::Deposit, "alice", 1_000))
            .unwrap();
        approve_receipt(&mut chain, &market, "alice");

        let result = adapter
            .withdraw(&mut chain, &ctx(OperationKind::Withdraw, "alice", 990))
            .unwrap();
        assert_eq!(result.output_amounts, vec![amt(990)]);
        assert!(adapter.principal(&alice).is_zero());
        assert!(adapter.user_positions(&chain, &alice).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_token_rejected() {
        let (mut chain, market) = funded_chain(LendingPool::new("pool", "usdc", "ausdc"));
        let mut adapter = FungibleAdapter::new("lending", "adapter", market);
        let mut context = ctx(OperationKind::Deposit, "alice", 1_000);
        context.params.tokens[0] = Address::from("dai");
        assert!(matches!(
            adapter.deposit(&mut chain, &context),
            Err(AggregatorError::InvalidParams(_))
        ));
    }
}
