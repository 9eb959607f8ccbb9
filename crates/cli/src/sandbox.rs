//! A fresh chain with every reference backend deployed and one adapter registered per family.

use anyhow::{Context, Result, anyhow};
use defi_agg_domain::{
    Address, OperationKind, OperationParams, OperationResult, PositionId, Token, TokenAmount,
};
use defi_agg_execution::{Aggregator, AggregatorConfig, AggregatorService};
use defi_agg_protocols::exchange_rate::mantissa_one;
use defi_agg_protocols::swap::rate_one;
use defi_agg_protocols::{
    Chain, ExchangeRateMarket, FungibleAdapter, LendingPool, PositionManager, ProtocolAdapter,
    RangeAdapter, RangeAdapterConfig, ShareVault, SwapAdapter, SwapRouter,
};
use primitive_types::U256;

/// Ledger time the sandbox starts at.
pub const GENESIS: u64 = 1_700_000_000;

/// Requests stay valid for an hour of ledger time.
const DEADLINE_WINDOW: u64 = 3_600;

pub const LENDING_POOL: &str = "pool";
pub const CUSDC: &str = "cusdc";
pub const VAULT: &str = "yvusdc";
pub const POSITION_MANAGER: &str = "npm";
pub const ROUTER: &str = "router";
pub const RANGE_ADAPTER: &str = "range-adapter";

pub fn usdc() -> Token {
    Token::new("usdc", "USDC", 6, "USD Coin")
}

pub fn usdt() -> Token {
    Token::new("usdt", "USDT", 18, "Tether USD")
}

pub fn weth() -> Token {
    Token::new("weth", "WETH", 18, "Wrapped Ether")
}

pub struct Sandbox {
    pub service: AggregatorService,
    pub owner: Address,
    pub user: Address,
}

impl Sandbox {
    pub fn new(config: AggregatorConfig, burn_on_remove: bool) -> Result<Self> {
        let owner = config.owner.clone();
        let user = Address::from("alice");
        let mut chain = Chain::new(GENESIS);
        let mut aggregator = Aggregator::new(config)?;

        chain.deploy(LendingPool::new(LENDING_POOL, usdc().address, "ausdc"))?;
        chain.deploy(ExchangeRateMarket::new(
            CUSDC,
            usdc().address,
            mantissa_one() / 50u64,
        ))?;
        chain.deploy(ShareVault::new(VAULT, usdc().address))?;
        chain.deploy(PositionManager::new(POSITION_MANAGER))?;
        let mut router = SwapRouter::new(ROUTER);
        // 1 USDC (6 decimals) buys 1 USDT (18 decimals).
        router.set_exchange_rate(&usdc().address, &usdt().address, rate_one() * U256::exp10(12));
        chain.deploy(router)?;

        let range_config = RangeAdapterConfig { burn_on_remove };
        let adapters: [(&str, Box<dyn ProtocolAdapter>); 5] = [
            ("lending", boxed(FungibleAdapter::new("lending", "lending-adapter", LENDING_POOL))),
            (
                "exchange-rate",
                boxed(FungibleAdapter::new("exchange-rate", "cusdc-adapter", CUSDC)),
            ),
            ("vault", boxed(FungibleAdapter::new("vault", "vault-adapter", VAULT))),
            (
                "range",
                boxed(RangeAdapter::with_config(
                    "range",
                    RANGE_ADAPTER,
                    POSITION_MANAGER,
                    range_config,
                )),
            ),
            ("swap", boxed(SwapAdapter::new("swap", "swap-adapter", ROUTER))),
        ];
        for (name, adapter) in adapters {
            let spender = adapter.address().clone();
            for token in [usdc(), usdt(), weth()] {
                chain
                    .ledger_mut()
                    .approve(&token.address, &user, &spender, TokenAmount::max());
            }
            aggregator.register_adapter(&mut chain, &owner, name, adapter)?;
        }

        for (market, spender) in [
            (LENDING_POOL, "lending-adapter"),
            (CUSDC, "cusdc-adapter"),
            (VAULT, "vault-adapter"),
        ] {
            let (market, ledger) = chain.receipt_market_mut(&Address::from(market))?;
            market.approve_receipt(ledger, &user, &Address::from(spender), TokenAmount::max());
        }

        let ledger = chain.ledger_mut();
        for token in [usdc(), usdt(), weth()] {
            ledger.mint(&token.address, &user, token.units(1_000_000))?;
        }
        ledger.mint(&usdt().address, &Address::from(ROUTER), usdt().units(1_000_000))?;

        Ok(Self {
            service: AggregatorService::new(aggregator, chain),
            owner,
            user,
        })
    }

    pub async fn deadline(&self) -> u64 {
        self.service.read(|_, chain| chain.now()).await + DEADLINE_WINDOW
    }

    pub async fn submit(
        &self,
        adapter: &str,
        kind: OperationKind,
        params: OperationParams,
    ) -> Result<OperationResult> {
        self.service
            .submit(&self.user, adapter, kind, params)
            .await
            .with_context(|| format!("{kind} through {adapter} failed"))
    }

    pub async fn deposit(&self, adapter: &str, amount: TokenAmount) -> Result<OperationResult> {
        let params = OperationParams::single(usdc().address, amount, self.user.clone(), self.deadline().await);
        self.submit(adapter, OperationKind::Deposit, params).await
    }

    pub async fn withdraw(&self, adapter: &str, amount: TokenAmount) -> Result<OperationResult> {
        let params = OperationParams::single(usdc().address, amount, self.user.clone(), self.deadline().await);
        self.submit(adapter, OperationKind::Withdraw, params).await
    }

    /// Recorded principal of the user in `adapter`.
    pub async fn principal(&self, adapter: &str) -> Result<TokenAmount> {
        Ok(self
            .service
            .user_balances(adapter, &self.user)
            .await?
            .into_iter()
            .map(|(_, amount)| amount)
            .fold(TokenAmount::zero(), |total, amount| {
                total.checked_add(amount).unwrap_or(TokenAmount::max())
            }))
    }

    pub async fn balance(&self, token: &Token) -> TokenAmount {
        let user = self.user.clone();
        let token = token.address.clone();
        self.service
            .read(move |_, chain| chain.ledger().balance_of(&token, &user))
            .await
    }

    /// Lets the range adapter act on one of the user's positions.
    pub async fn approve_position(&self, id: PositionId) -> Result<()> {
        let user = self.user.clone();
        self.service
            .with_chain(move |chain| {
                let (manager, _) = chain.position_manager_mut(&Address::from(POSITION_MANAGER))?;
                manager.approve(&user, &Address::from(RANGE_ADAPTER), id)?;
                Ok::<_, anyhow::Error>(())
            })
            .await
    }
}

pub fn position_of(result: &OperationResult) -> Result<PositionId> {
    result
        .position_id
        .ok_or_else(|| anyhow!("{} returned no position id", result.kind))
}

fn boxed(adapter: impl ProtocolAdapter + 'static) -> Box<dyn ProtocolAdapter> {
    Box::new(adapter)
}
