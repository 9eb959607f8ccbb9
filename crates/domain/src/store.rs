//! Per-caller position bookkeeping.
//!
//! - [`PrincipalBook`]: net-of-fee principal per caller for fungible positions
//! - [`PositionIndex`]: open range-position ids per owner

use crate::error::{AggregatorError, AggregatorResult};
use crate::position::PositionId;
use crate::token::{Address, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Principal ledger. Yield accrues in the backend and is never pre-credited here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalBook {
    principals: HashMap<Address, TokenAmount>,
}

impl PrincipalBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded principal, zero for unknown callers.
    pub fn principal(&self, user: &Address) -> TokenAmount {
        self.principals.get(user).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, user: &Address, amount: TokenAmount) -> AggregatorResult<TokenAmount> {
        let updated = self
            .principal(user)
            .checked_add(amount)
            .ok_or(AggregatorError::Overflow)?;
        self.principals.insert(user.clone(), updated);
        Ok(updated)
    }

    /// Decrements principal by exactly `amount`, failing without change if it is not covered.
    pub fn debit(&mut self, user: &Address, amount: TokenAmount) -> AggregatorResult<TokenAmount> {
        let principal = self.principal(user);
        let updated =
            principal
                .checked_sub(amount)
                .ok_or(AggregatorError::InsufficientPrincipal {
                    requested: amount,
                    principal,
                })?;
        if updated.is_zero() {
            self.principals.remove(user);
        } else {
            self.principals.insert(user.clone(), updated);
        }
        Ok(updated)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &TokenAmount)> {
        self.principals.iter()
    }
}

/// Open range-position ids per owner, in opening order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionIndex {
    by_owner: HashMap<Address, Vec<PositionId>>,
}

impl PositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, owner: &Address, id: PositionId) {
        let ids = self.by_owner.entry(owner.clone()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Removes `id` from the owner's list; returns whether it was present.
    pub fn remove(&mut self, owner: &Address, id: PositionId) -> bool {
        let Some(ids) = self.by_owner.get_mut(owner) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|existing| *existing != id);
        let removed = ids.len() != before;
        if ids.is_empty() {
            self.by_owner.remove(owner);
        }
        removed
    }

    pub fn positions(&self, owner: &Address) -> Vec<PositionId> {
        self.by_owner.get(owner).cloned().unwrap_or_default()
    }

    pub fn contains(&self, owner: &Address, id: PositionId) -> bool {
        self.by_owner
            .get(owner)
            .is_some_and(|ids| ids.contains(&id))
    }
}
