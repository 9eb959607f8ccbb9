//! Non-fungible position manager for concentrated-liquidity range orders.
//!
//! Positions are identified by sequential ids starting at 1. Liquidity is the geometric mean
//! of the two amounts supplied; decreasing it moves the backing amounts into the position's
//! owed balances, which are paid out only by [`PositionManager::collect`].

use crate::chain::TokenLedger;
use crate::error::{BackendError, BackendResult};
use defi_agg_domain::{Address, PositionId, TickRange, TokenAmount};
use primitive_types::U256;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// State of one minted position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePosition {
    pub owner: Address,
    /// Address approved to manage this position, cleared on burn.
    pub approved: Option<Address>,
    pub token0: Address,
    pub token1: Address,
    pub range: TickRange,
    pub liquidity: u128,
    /// Amounts supplied at mint.
    pub deposited0: TokenAmount,
    pub deposited1: TokenAmount,
    /// Amounts still backing the liquidity.
    pub amount0: TokenAmount,
    pub amount1: TokenAmount,
    /// Amounts owed to the position and not yet collected.
    pub tokens_owed0: TokenAmount,
    pub tokens_owed1: TokenAmount,
}

/// Arguments of [`PositionManager::mint`].
#[derive(Debug, Clone)]
pub struct MintParams {
    pub token0: Address,
    pub token1: Address,
    pub range: TickRange,
    pub amount0_desired: TokenAmount,
    pub amount1_desired: TokenAmount,
    pub amount0_min: TokenAmount,
    pub amount1_min: TokenAmount,
    pub recipient: Address,
}

/// Outcome of a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintResult {
    pub id: PositionId,
    pub liquidity: u128,
    pub amount0: TokenAmount,
    pub amount1: TokenAmount,
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    address: Address,
    next_id: u64,
    positions: BTreeMap<PositionId, RangePosition>,
    /// (owner, operator) pairs approved for every position of the owner.
    operators: HashSet<(Address, Address)>,
}

impl PositionManager {
    #[must_use]
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            next_id: 1,
            positions: BTreeMap::new(),
            operators: HashSet::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn position(&self, id: PositionId) -> BackendResult<&RangePosition> {
        self.positions
            .get(&id)
            .ok_or(BackendError::UnknownPosition(id.0))
    }

    pub fn owner_of(&self, id: PositionId) -> BackendResult<&Address> {
        self.position(id).map(|position| &position.owner)
    }

    #[must_use]
    pub fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> bool {
        self.operators.contains(&(owner.clone(), operator.clone()))
    }

    pub fn is_approved_or_owner(&self, spender: &Address, id: PositionId) -> BackendResult<bool> {
        let position = self.position(id)?;
        Ok(&position.owner == spender
            || position.approved.as_ref() == Some(spender)
            || self.is_approved_for_all(&position.owner, spender))
    }

    /// Pulls both amounts from `payer` and mints a position owned by `params.recipient`.
    pub fn mint(
        &mut self,
        ledger: &mut TokenLedger,
        payer: &Address,
        params: MintParams,
    ) -> BackendResult<MintResult> {
        if params.token0 == params.token1 {
            return Err(BackendError::InvalidAmount("identical pool tokens".into()));
        }
        if params.amount0_desired < params.amount0_min {
            return Err(BackendError::Slippage {
                minimum: params.amount0_min,
                actual: params.amount0_desired,
            });
        }
        if params.amount1_desired < params.amount1_min {
            return Err(BackendError::Slippage {
                minimum: params.amount1_min,
                actual: params.amount1_desired,
            });
        }
        let liquidity = liquidity_for(params.amount0_desired, params.amount1_desired)?;
        if liquidity == 0 {
            return Err(BackendError::InvalidAmount("zero liquidity".into()));
        }

        ledger.transfer(&params.token0, payer, &self.address, params.amount0_desired)?;
        ledger.transfer(&params.token1, payer, &self.address, params.amount1_desired)?;

        let id = PositionId(self.next_id);
        self.next_id += 1;
        self.positions.insert(
            id,
            RangePosition {
                owner: params.recipient.clone(),
                approved: None,
                token0: params.token0,
                token1: params.token1,
                range: params.range,
                liquidity,
                deposited0: params.amount0_desired,
                deposited1: params.amount1_desired,
                amount0: params.amount0_desired,
                amount1: params.amount1_desired,
                tokens_owed0: TokenAmount::zero(),
                tokens_owed1: TokenAmount::zero(),
            },
        );

        debug!(manager = %self.address, id = %id, owner = %params.recipient, liquidity, "Position minted");
        Ok(MintResult {
            id,
            liquidity,
            amount0: params.amount0_desired,
            amount1: params.amount1_desired,
        })
    }

    /// Removes `liquidity` from the position and credits the released amounts to its owed
    /// balances.
    pub fn decrease_liquidity(
        &mut self,
        caller: &Address,
        id: PositionId,
        liquidity: u128,
        amount0_min: TokenAmount,
        amount1_min: TokenAmount,
    ) -> BackendResult<(TokenAmount, TokenAmount)> {
        self.require_approved(caller, id)?;
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(BackendError::UnknownPosition(id.0))?;
        if liquidity > position.liquidity {
            return Err(BackendError::InvalidAmount(format!(
                "liquidity {liquidity} exceeds position liquidity {}",
                position.liquidity
            )));
        }

        let (amount0, amount1) = if liquidity == position.liquidity {
            (position.amount0, position.amount1)
        } else {
            let share = U256::from(liquidity);
            let total = U256::from(position.liquidity);
            (
                position
                    .amount0
                    .mul_div(share, total)
                    .ok_or(BackendError::Overflow)?,
                position
                    .amount1
                    .mul_div(share, total)
                    .ok_or(BackendError::Overflow)?,
            )
        };
        if amount0 < amount0_min {
            return Err(BackendError::Slippage {
                minimum: amount0_min,
                actual: amount0,
            });
        }
        if amount1 < amount1_min {
            return Err(BackendError::Slippage {
                minimum: amount1_min,
                actual: amount1,
            });
        }

        position.liquidity -= liquidity;
        position.amount0 = position.amount0.saturating_sub(amount0);
        position.amount1 = position.amount1.saturating_sub(amount1);
        position.tokens_owed0 = position
            .tokens_owed0
            .checked_add(amount0)
            .ok_or(BackendError::Overflow)?;
        position.tokens_owed1 = position
            .tokens_owed1
            .checked_add(amount1)
            .ok_or(BackendError::Overflow)?;

        debug!(manager = %self.address, id = %id, liquidity, amount0 = %amount0, amount1 = %amount1, "Liquidity decreased");
        Ok((amount0, amount1))
    }

    /// Pays up to the given caps of the owed balances to `recipient`.
    pub fn collect(
        &mut self,
        ledger: &mut TokenLedger,
        caller: &Address,
        id: PositionId,
        recipient: &Address,
        amount0_max: TokenAmount,
        amount1_max: TokenAmount,
    ) -> BackendResult<(TokenAmount, TokenAmount)> {
        self.require_approved(caller, id)?;
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(BackendError::UnknownPosition(id.0))?;

        let amount0 = position.tokens_owed0.min(amount0_max);
        let amount1 = position.tokens_owed1.min(amount1_max);
        ledger.transfer(&position.token0, &self.address, recipient, amount0)?;
        ledger.transfer(&position.token1, &self.address, recipient, amount1)?;
        position.tokens_owed0 = position.tokens_owed0.saturating_sub(amount0);
        position.tokens_owed1 = position.tokens_owed1.saturating_sub(amount1);

        debug!(manager = %self.address, id = %id, recipient = %recipient, amount0 = %amount0, amount1 = %amount1, "Collected");
        Ok((amount0, amount1))
    }

    /// Approves `spender` for one position; callable by the owner or an operator.
    pub fn approve(&mut self, caller: &Address, spender: &Address, id: PositionId) -> BackendResult<()> {
        let position = self.position(id)?;
        if &position.owner != caller && !self.is_approved_for_all(&position.owner, caller) {
            return Err(BackendError::NotApproved {
                caller: caller.clone(),
                position_id: id.0,
            });
        }
        if let Some(position) = self.positions.get_mut(&id) {
            position.approved = Some(spender.clone());
        }
        Ok(())
    }

    pub fn set_approval_for_all(&mut self, owner: &Address, operator: &Address, approved: bool) {
        let pair = (owner.clone(), operator.clone());
        if approved {
            self.operators.insert(pair);
        } else {
            self.operators.remove(&pair);
        }
    }

    /// Destroys an emptied position; its id is never reissued.
    pub fn burn(&mut self, caller: &Address, id: PositionId) -> BackendResult<()> {
        self.require_approved(caller, id)?;
        let position = self.position(id)?;
        if position.liquidity != 0
            || !position.tokens_owed0.is_zero()
            || !position.tokens_owed1.is_zero()
        {
            return Err(BackendError::PositionNotCleared(id.0));
        }
        self.positions.remove(&id);
        debug!(manager = %self.address, id = %id, "Position burned");
        Ok(())
    }

    /// Credits simulated trading fees to a position, minting the tokens into the manager.
    pub fn accrue_fees(
        &mut self,
        ledger: &mut TokenLedger,
        id: PositionId,
        fee0: TokenAmount,
        fee1: TokenAmount,
    ) -> BackendResult<()> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(BackendError::UnknownPosition(id.0))?;
        ledger.mint(&position.token0, &self.address, fee0)?;
        ledger.mint(&position.token1, &self.address, fee1)?;
        position.tokens_owed0 = position
            .tokens_owed0
            .checked_add(fee0)
            .ok_or(BackendError::Overflow)?;
        position.tokens_owed1 = position
            .tokens_owed1
            .checked_add(fee1)
            .ok_or(BackendError::Overflow)?;
        Ok(())
    }

    fn require_approved(&self, caller: &Address, id: PositionId) -> BackendResult<()> {
        if self.is_approved_or_owner(caller, id)? {
            Ok(())
        } else {
            Err(BackendError::NotApproved {
                caller: caller.clone(),
                position_id: id.0,
            })
        }
    }
}

/// `isqrt(amount0 * amount1)`, which must fit in 128 bits.
fn liquidity_for(amount0: TokenAmount, amount1: TokenAmount) -> BackendResult<u128> {
    let product = amount0
        .as_u256()
        .checked_mul(amount1.as_u256())
        .ok_or(BackendError::Overflow)?;
    let root = product.integer_sqrt();
    if root > U256::from(u128::MAX) {
        return Err(BackendError::Overflow);
    }
    Ok(root.as_u128())
}
