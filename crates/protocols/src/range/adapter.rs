//! Adapter for concentrated-liquidity range positions.

use super::position_manager::{MintParams, RangePosition};
use crate::adapter::{ProtocolAdapter, collect_input};
use crate::chain::Chain;
use defi_agg_domain::{
    Address, AggregatorError, AggregatorResult, OperationContext, OperationKind, OperationResult,
    Position, PositionId, PositionIndex, TickRange, TokenAmount, YieldSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for [`RangeAdapter`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeAdapterConfig {
    /// Burn the position once it has been fully removed and collected.
    /// Off by default: the emptied id stays with its owner on the position manager.
    pub burn_on_remove: bool,
}

/// Adapter over a non-fungible position manager.
///
/// Positions are minted to the request's recipient, who must approve this adapter on the
/// position manager before it can be removed or harvested through the aggregator.
#[derive(Debug, Clone)]
pub struct RangeAdapter {
    name: String,
    version: String,
    address: Address,
    manager: Address,
    positions: PositionIndex,
    config: RangeAdapterConfig,
}

impl RangeAdapter {
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<Address>, manager: impl Into<Address>) -> Self {
        Self::with_config(name, address, manager, RangeAdapterConfig::default())
    }

    #[must_use]
    pub fn with_config(
        name: impl Into<String>,
        address: impl Into<Address>,
        manager: impl Into<Address>,
        config: RangeAdapterConfig,
    ) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            address: address.into(),
            manager: manager.into(),
            positions: PositionIndex::new(),
            config,
        }
    }

    /// Open position ids recorded for `owner`.
    #[must_use]
    pub fn positions_of(&self, owner: &Address) -> Vec<PositionId> {
        self.positions.positions(owner)
    }

    /// Checks that `caller` may act on `id` and that this adapter may act for it.
    /// Returns the position's owner.
    fn authorize(&self, chain: &Chain, caller: &Address, id: PositionId) -> AggregatorResult<Address> {
        let manager = chain.position_manager(&self.manager)?;
        let owner = manager.owner_of(id)?.clone();
        if !manager.is_approved_or_owner(caller, id)? {
            return Err(AggregatorError::NotAuthorized {
                caller: caller.clone(),
                position_id: id.0,
            });
        }
        if !manager.is_approved_or_owner(&self.address, id)? {
            return Err(AggregatorError::NotAuthorized {
                caller: self.address.clone(),
                position_id: id.0,
            });
        }
        Ok(owner)
    }

    fn to_position(id: PositionId, position: &RangePosition) -> Position {
        Position::RangeOrder {
            id,
            token0: position.token0.clone(),
            token1: position.token1.clone(),
            range: position.range,
            liquidity: position.liquidity,
            deposited: (position.deposited0, position.deposited1),
            underlying: (position.amount0, position.amount1),
            owed: (position.tokens_owed0, position.tokens_owed1),
        }
    }
}

impl ProtocolAdapter for RangeAdapter {
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
        vec![
            OperationKind::AddPosition,
            OperationKind::RemovePosition,
            OperationKind::CollectYield,
        ]
    }

    fn add_position(
        &mut self,
        chain: &mut Chain,
        ctx: &OperationContext,
    ) -> AggregatorResult<OperationResult> {
        let [token0, token1] = ctx.params.tokens.as_slice() else {
            return Err(AggregatorError::InvalidParams("two tokens required".into()));
        };
        let net0 = collect_input(chain, &self.address, ctx, 0)?;
        let net1 = collect_input(chain, &self.address, ctx, 1)?;

        let (manager, ledger) = chain.position_manager_mut(&self.manager)?;
        let minted = manager.mint(
            ledger,
            &self.address,
            MintParams {
                token0: token0.clone(),
                token1: token1.clone(),
                range: ctx.params.range.unwrap_or_else(TickRange::full),
                amount0_desired: net0,
                amount1_desired: net1,
                amount0_min: ctx.params.min_amount(0),
                amount1_min: ctx.params.min_amount(1),
                recipient: ctx.params.recipient.clone(),
            },
        )?;
        self.positions.insert(&ctx.params.recipient, minted.id);

        info!(
            adapter = %self.name,
            owner = %ctx.params.recipient,
            position_id = %minted.id,
            liquidity = minted.liquidity,
            amount0 = %minted.amount0,
            amount1 = %minted.amount1,
            "Range position added"
        );
        Ok(
            OperationResult::new(OperationKind::AddPosition, vec![minted.amount0, minted.amount1])
                .with_position(minted.id)
                .with_message(format!("minted position {} with liquidity {}", minted.id, minted.liquidity)),
        )
    }

    fn remove_position(
        &mut self,
        chain: &mut Chain,
        ctx: &OperationContext,
    ) -> AggregatorResult<OperationResult> {
        let id = ctx.position_id()?;
        let owner = self.authorize(chain, &ctx.caller, id)?;
        let liquidity = chain.position_manager(&self.manager)?.position(id)?.liquidity;

        // Bookkeeping is committed before the manager releases funds.
        if !self.positions.remove(&owner, id) {
            return Err(AggregatorError::PositionNotFound(id.0));
        }

        let (manager, ledger) = chain.position_manager_mut(&self.manager)?;
        if liquidity > 0 {
            manager.decrease_liquidity(
                &self.address,
                id,
                liquidity,
                ctx.params.min_amount(0),
                ctx.params.min_amount(1),
            )?;
        }
        let (amount0, amount1) = manager.collect(
            ledger,
            &self.address,
            id,
            &ctx.params.recipient,
            TokenAmount::max(),
            TokenAmount::max(),
        )?;
        if self.config.burn_on_remove {
            manager.burn(&self.address, id)?;
            debug!(adapter = %self.name, position_id = %id, "Emptied position burned");
        }

        info!(
            adapter = %self.name,
            owner = %owner,
            position_id = %id,
            liquidity,
            amount0 = %amount0,
            amount1 = %amount1,
            "Range position removed"
        );
        Ok(OperationResult::new(OperationKind::RemovePosition, vec![amount0, amount1])
            .with_position(id)
            .with_message(format!("removed position {id}")))
    }

    fn collect_yield(
        &mut self,
        chain: &mut Chain,
        ctx: &OperationContext,
    ) -> AggregatorResult<OperationResult> {
        let id = ctx.position_id()?;
        let owner = self.authorize(chain, &ctx.caller, id)?;
        if !self.positions.contains(&owner, id) {
            return Err(AggregatorError::PositionNotFound(id.0));
        }
        let (cap0, cap1) = match ctx.params.amounts.as_slice() {
            [] => (TokenAmount::max(), TokenAmount::max()),
            [cap0, cap1] => (*cap0, *cap1),
            other => {
                return Err(AggregatorError::LengthMismatch {
                    expected: 2,
                    actual: other.len(),
                });
            }
        };

        let (manager, ledger) = chain.position_manager_mut(&self.manager)?;
        let (amount0, amount1) =
            manager.collect(ledger, &self.address, id, &ctx.params.recipient, cap0, cap1)?;
        let minimum0 = ctx.params.min_amount(0);
        if amount0 < minimum0 {
            return Err(AggregatorError::SlippageExceeded {
                minimum: minimum0,
                actual: amount0,
            });
        }
        let minimum1 = ctx.params.min_amount(1);
        if amount1 < minimum1 {
            return Err(AggregatorError::SlippageExceeded {
                minimum: minimum1,
                actual: amount1,
            });
        }

        info!(
            adapter = %self.name,
            owner = %owner,
            position_id = %id,
            amount0 = %amount0,
            amount1 = %amount1,
            "Range position yield collected"
        );
        Ok(OperationResult::new(OperationKind::CollectYield, vec![amount0, amount1])
            .with_position(id)
            .with_message(format!("collected yield of position {id}")))
    }

    fn user_balances(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        Ok(self
            .user_yield(chain, user)?
            .into_iter()
            .map(|snapshot| (snapshot.token, snapshot.principal))
            .collect())
    }

    fn user_yield(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<YieldSnapshot>> {
        let positions = self.user_positions(chain, user)?;
        Ok(YieldSnapshot::aggregate(
            positions.iter().flat_map(Position::yield_snapshots),
        ))
    }

    fn user_positions(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<Position>> {
        let manager = chain.position_manager(&self.manager)?;
        Ok(self
            .positions
            .positions(user)
            .into_iter()
            .filter_map(|id| {
                manager
                    .position(id)
                    .ok()
                    .map(|position| Self::to_position(id, position))
            })
            .collect())
    }

    fn clone_box(&self) -> Box<dyn ProtocolAdapter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::PositionManager;
    use defi_agg_domain::{FeeRate, OperationParams, Token};

    const NOW: u64 = 1_700_000_000;

    fn usdt() -> Token {
        Token::new("usdt", "USDT", 18, "Tether USD")
    }

    fn weth() -> Token {
        Token::new("weth", "WETH", 18, "Wrapped Ether")
    }

    fn setup() -> (Chain, RangeAdapter, Address) {
        let mut chain = Chain::new(NOW);
        let manager = chain.deploy(PositionManager::new("npm")).unwrap();
        let bob = Address::from("bob");
        let adapter = RangeAdapter::new("range", "range-adapter", manager);
        for token in [usdt(), weth()] {
            chain
                .ledger_mut()
                .mint(&token.address, &bob, token.units(1_000_000))
                .unwrap();
            chain
                .ledger_mut()
                .approve(&token.address, &bob, adapter.address(), TokenAmount::max());
        }
        (chain, adapter, bob)
    }

    fn add_ctx(caller: &str, amount0: TokenAmount, amount1: TokenAmount) -> OperationContext {
        let params = OperationParams::new(caller, NOW)
            .with_token("usdt", amount0)
            .with_token("weth", amount1);
        let rate = FeeRate::try_new(100).unwrap();
        let quotes = params.amounts.iter().map(|a| rate.quote(*a)).collect();
        OperationContext {
            caller: Address::from(caller),
            treasury: Address::from("aggregator"),
            kind: OperationKind::AddPosition,
            params,
            quotes,
        }
    }

    fn position_ctx(kind: OperationKind, caller: &str, id: PositionId) -> OperationContext {
        OperationContext {
            caller: Address::from(caller),
            treasury: Address::from("aggregator"),
            kind,
            params: OperationParams::new(caller, NOW).with_position(id),
            quotes: Vec::new(),
        }
    }

    fn approve_adapter(chain: &mut Chain, adapter: &RangeAdapter, owner: &Address, id: PositionId) {
        let (manager, _) = chain.position_manager_mut(&Address::from("npm")).unwrap();
        manager.approve(owner, adapter.address(), id).unwrap();
    }

    #[test]
    fn test_add_position_forwards_net_amounts() {
        let (mut chain, mut adapter, bob) = setup();
        let ctx = add_ctx("bob", usdt().units(10_000), weth().units(10));

        let result = adapter.add_position(&mut chain, &ctx).unwrap();
        let id = result.position_id.unwrap();

        // 9,900 and 9.9 reach the pool
        assert_eq!(result.output_amounts[0], usdt().units(9_900));
        assert_eq!(
            result.output_amounts[1],
            TokenAmount::from(9_900_000_000_000_000_000u128)
        );
        let manager = chain.position_manager(&Address::from("npm")).unwrap();
        assert_eq!(manager.owner_of(id).unwrap(), &bob);
        assert_eq!(adapter.positions_of(&bob), vec![id]);
        assert_eq!(
            chain.ledger().balance_of(&Address::from("usdt"), &Address::from("aggregator")),
            usdt().units(100)
        );
    }

    #[test]
    fn test_remove_requires_adapter_approval() {
        let (mut chain, mut adapter, _bob) = setup();
        let id = adapter
            .add_position(&mut chain, &add_ctx("bob", usdt().units(10_000), weth().units(10)))
            .unwrap()
            .position_id
            .unwrap();

        let err = adapter
            .remove_position(&mut chain, &position_ctx(OperationKind::RemovePosition, "bob", id))
            .unwrap_err();
        assert_eq!(
            err,
            AggregatorError::NotAuthorized {
                caller: Address::from("range-adapter"),
                position_id: id.0,
            }
        );
    }

    #[test]
    fn test_stranger_cannot_remove() {
        let (mut chain, mut adapter, bob) = setup();
        let id = adapter
            .add_position(&mut chain, &add_ctx("bob", usdt().units(10_000), weth().units(10)))
            .unwrap()
            .position_id
            .unwrap();
        approve_adapter(&mut chain, &adapter, &bob, id);

        let err = adapter
            .remove_position(&mut chain, &position_ctx(OperationKind::RemovePosition, "eve", id))
            .unwrap_err();
        assert!(matches!(err, AggregatorError::NotAuthorized { .. }));
        assert_eq!(adapter.positions_of(&bob), vec![id]);
    }

    #[test]
    fn test_remove_returns_owed_and_keeps_id() {
        let (mut chain, mut adapter, bob) = setup();
        let id = adapter
            .add_position(&mut chain, &add_ctx("bob", usdt().units(10_000), weth().units(10)))
            .unwrap()
            .position_id
            .unwrap();
        approve_adapter(&mut chain, &adapter, &bob, id);
        {
            let (manager, ledger) = chain.position_manager_mut(&Address::from("npm")).unwrap();
            manager
                .accrue_fees(ledger, id, usdt().units(5), weth().units(1))
                .unwrap();
        }

        let result = adapter
            .remove_position(&mut chain, &position_ctx(OperationKind::RemovePosition, "bob", id))
            .unwrap();
        assert_eq!(result.output_amounts[0], usdt().units(9_905));
        assert!(adapter.positions_of(&bob).is_empty());

        let manager = chain.position_manager(&Address::from("npm")).unwrap();
        let position = manager.position(id).unwrap();
        assert_eq!(position.liquidity, 0);
        assert!(position.tokens_owed0.is_zero());
        assert_eq!(manager.owner_of(id).unwrap(), &bob);
    }

    #[test]
    fn test_removed_position_cannot_be_acted_on_again() {
        let (mut chain, mut adapter, bob) = setup();
        let id = adapter
            .add_position(&mut chain, &add_ctx("bob", usdt().units(10_000), weth().units(10)))
            .unwrap()
            .position_id
            .unwrap();
        approve_adapter(&mut chain, &adapter, &bob, id);
        adapter
            .remove_position(&mut chain, &position_ctx(OperationKind::RemovePosition, "bob", id))
            .unwrap();

        let err = adapter
            .remove_position(&mut chain, &position_ctx(OperationKind::RemovePosition, "bob", id))
            .unwrap_err();
        assert_eq!(err, AggregatorError::PositionNotFound(id.0));
        let err = adapter
            .collect_yield(&mut chain, &position_ctx(OperationKind::CollectYield, "bob", id))
            .unwrap_err();
        assert_eq!(err, AggregatorError::PositionNotFound(id.0));
    }

    #[test]
    fn test_position_minted_elsewhere_is_not_managed() {
        let (mut chain, mut adapter, bob) = setup();
        let (manager, ledger) = chain.position_manager_mut(&Address::from("npm")).unwrap();
        let minted = manager
            .mint(
                ledger,
                &bob,
                MintParams {
                    token0: usdt().address,
                    token1: weth().address,
                    range: TickRange::full(),
                    amount0_desired: usdt().units(100),
                    amount1_desired: weth().units(1),
                    amount0_min: TokenAmount::zero(),
                    amount1_min: TokenAmount::zero(),
                    recipient: bob.clone(),
                },
            )
            .unwrap();
        approve_adapter(&mut chain, &adapter, &bob, minted.id);

        let err = adapter
            .remove_position(
                &mut chain,
                &position_ctx(OperationKind::RemovePosition, "bob", minted.id),
            )
            .unwrap_err();
        assert_eq!(err, AggregatorError::PositionNotFound(minted.id.0));
        let manager = chain.position_manager(&Address::from("npm")).unwrap();
        assert!(manager.position(minted.id).unwrap().liquidity > 0);
    }

    #[test]
    fn test_remove_with_burn_retires_id() {
        let (mut chain, _, bob) = setup();
        let mut adapter = RangeAdapter::with_config(
            "range",
            "range-adapter",
            "npm",
            RangeAdapterConfig {
                burn_on_remove: true,
            },
        );
        let id = adapter
            .add_position(&mut chain, &add_ctx("bob", usdt().units(10_000), weth().units(10)))
            .unwrap()
            .position_id
            .unwrap();
        approve_adapter(&mut chain, &adapter, &bob, id);

        adapter
            .remove_position(&mut chain, &position_ctx(OperationKind::RemovePosition, "bob", id))
            .unwrap();
        let manager = chain.position_manager(&Address::from("npm")).unwrap();
        assert!(manager.position(id).is_err());
    }

    #[test]
    fn test_collect_yield_leaves_liquidity() {
        let (mut chain, mut adapter, bob) = setup();
        let id = adapter
            .add_position(&mut chain, &add_ctx("bob", usdt().units(10_000), weth().units(10)))
            .unwrap()
            .position_id
            .unwrap();
        approve_adapter(&mut chain, &adapter, &bob, id);
        {
            let (manager, ledger) = chain.position_manager_mut(&Address::from("npm")).unwrap();
            manager
                .accrue_fees(ledger, id, usdt().units(30), weth().units(2))
                .unwrap();
        }

        let mut ctx = position_ctx(OperationKind::CollectYield, "bob", id);
        ctx.params = ctx
            .params
            .with_token("usdt", usdt().units(10))
            .with_token("weth", weth().units(10));
        let first = adapter.collect_yield(&mut chain, &ctx).unwrap();
        assert_eq!(first.output_amounts, vec![usdt().units(10), weth().units(2)]);

        let rest = adapter
            .collect_yield(&mut chain, &position_ctx(OperationKind::CollectYield, "bob", id))
            .unwrap();
        assert_eq!(rest.output_amounts, vec![usdt().units(20), TokenAmount::zero()]);

        let yields = adapter.user_yield(&chain, &bob).unwrap();
        assert_eq!(yields.len(), 2);
        assert_eq!(yields[0].current_value, usdt().units(9_900));
        assert!(yields[0].profit.is_zero());
        assert_eq!(adapter.positions_of(&bob), vec![id]);
    }

    #[test]
    fn test_unknown_position() {
        let (mut chain, mut adapter, _) = setup();
        let err = adapter
            .collect_yield(
                &mut chain,
                &position_ctx(OperationKind::CollectYield, "bob", PositionId(42)),
            )
            .unwrap_err();
        assert_eq!(err, AggregatorError::PositionNotFound(42));
    }
}
