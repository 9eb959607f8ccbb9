//! A funded chain with one adapter per backend family registered.

use super::Aggregator;
use crate::config::AggregatorConfig;
use defi_agg_domain::{
    Address, AggregatorResult, OperationKind, OperationParams, OperationResult, PositionId, Token,
    TokenAmount,
};
use defi_agg_protocols::exchange_rate::mantissa_one;
use defi_agg_protocols::swap::rate_one;
use defi_agg_protocols::{
    Chain, ExchangeRateMarket, FungibleAdapter, LendingPool, PositionManager, ProtocolAdapter,
    RangeAdapter, ShareVault, SwapAdapter, SwapRouter,
};

pub(crate) const NOW: u64 = 1_700_000_000;
pub(crate) const OWNER: &str = "owner";
pub(crate) const ALICE: &str = "alice";

pub(crate) fn amt(v: u64) -> TokenAmount {
    TokenAmount::from(v)
}

pub(crate) fn usdt() -> Token {
    Token::new("usdt", "USDT", 18, "Tether USD")
}

pub(crate) fn weth() -> Token {
    Token::new("weth", "WETH", 18, "Wrapped Ether")
}

fn boxed(adapter: impl ProtocolAdapter + 'static) -> Box<dyn ProtocolAdapter> {
    Box::new(adapter)
}

pub(crate) struct World {
    pub chain: Chain,
    pub aggregator: Aggregator,
}

impl World {
    /// Alice holds 10_000 usdc plus a million units each of usdt and weth, with every
    /// approval the adapters need.
    pub fn new() -> Self {
        let mut chain = Chain::new(NOW);
        let mut aggregator = Aggregator::new(AggregatorConfig::default()).unwrap();
        let owner = Address::from(OWNER);
        let alice = Address::from(ALICE);
        let usdc = Address::from("usdc");

        chain.deploy(LendingPool::new("pool", "usdc", "ausdc")).unwrap();
        chain
            .deploy(ExchangeRateMarket::new("cusdc", "usdc", mantissa_one() / 50u64))
            .unwrap();
        chain.deploy(ShareVault::new("yvusdc", "usdc")).unwrap();
        chain.deploy(PositionManager::new("npm")).unwrap();
        let mut router = SwapRouter::new("router");
        router.set_exchange_rate(&usdc, &usdt().address, rate_one() * 2u64);
        chain.deploy(router).unwrap();

        let adapters: [(&str, Box<dyn ProtocolAdapter>); 5] = [
            ("lending", boxed(FungibleAdapter::new("lending", "lending-adapter", "pool"))),
            (
                "exchange-rate",
                boxed(FungibleAdapter::new("exchange-rate", "cusdc-adapter", "cusdc")),
            ),
            ("vault", boxed(FungibleAdapter::new("vault", "vault-adapter", "yvusdc"))),
            ("range", boxed(RangeAdapter::new("range", "range-adapter", "npm"))),
            ("swap", boxed(SwapAdapter::new("swap", "swap-adapter", "router"))),
        ];
        for (name, adapter) in adapters {
            let spender = adapter.address().clone();
            let ledger = chain.ledger_mut();
            for token in [usdc.clone(), usdt().address, weth().address] {
                ledger.approve(&token, &alice, &spender, TokenAmount::max());
            }
            aggregator
                .register_adapter(&mut chain, &owner, name, adapter)
                .unwrap();
        }

        for (market, spender) in [
            ("pool", "lending-adapter"),
            ("cusdc", "cusdc-adapter"),
            ("yvusdc", "vault-adapter"),
        ] {
            let (market, ledger) = chain.receipt_market_mut(&Address::from(market)).unwrap();
            market.approve_receipt(ledger, &alice, &Address::from(spender), TokenAmount::max());
        }

        let ledger = chain.ledger_mut();
        ledger.mint(&usdc, &alice, amt(10_000)).unwrap();
        for token in [usdt(), weth()] {
            ledger
                .mint(&token.address, &alice, token.units(1_000_000))
                .unwrap();
        }
        ledger
            .mint(&usdt().address, &Address::from("router"), usdt().units(1_000))
            .unwrap();

        Self { chain, aggregator }
    }

    pub fn execute(
        &mut self,
        caller: &str,
        adapter: &str,
        kind: OperationKind,
        params: OperationParams,
    ) -> AggregatorResult<OperationResult> {
        self.aggregator.execute_operation(
            &mut self.chain,
            &Address::from(caller),
            adapter,
            kind,
            params,
        )
    }

    pub fn deposit(&mut self, adapter: &str, amount: u64) -> AggregatorResult<OperationResult> {
        self.execute(
            ALICE,
            adapter,
            OperationKind::Deposit,
            OperationParams::single("usdc", amount, ALICE, NOW),
        )
    }

    pub fn withdraw(&mut self, adapter: &str, amount: u64) -> AggregatorResult<OperationResult> {
        self.execute(
            ALICE,
            adapter,
            OperationKind::Withdraw,
            OperationParams::single("usdc", amount, ALICE, NOW),
        )
    }

    /// Lets the range adapter act on one of Alice's positions.
    pub fn approve_range(&mut self, id: PositionId) {
        let (manager, _) = self
            .chain
            .position_manager_mut(&Address::from("npm"))
            .unwrap();
        manager
            .approve(&Address::from(ALICE), &Address::from("range-adapter"), id)
            .unwrap();
    }

    pub fn balance(&self, token: &str, holder: &str) -> TokenAmount {
        self.chain
            .ledger()
            .balance_of(&Address::from(token), &Address::from(holder))
    }
}
