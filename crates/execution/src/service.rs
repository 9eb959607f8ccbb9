//! Async front for sharing one aggregator and its chain between tasks.
//!
//! Requests are serialized by a single lock over the aggregator and the ledger, so each one
//! observes and leaves a consistent state.

use crate::aggregator::Aggregator;
use crate::config::AggregatorConfig;
use crate::lifecycle::LifecycleEvent;
use defi_agg_domain::{
    Address, AggregatorResult, FeeRate, OperationKind, OperationParams, OperationResult, Position,
    TokenAmount, YieldSnapshot,
};
use defi_agg_protocols::{Chain, ProtocolAdapter};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug)]
struct State {
    aggregator: Aggregator,
    chain: Chain,
}

/// Cloneable handle to a shared aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorService {
    state: Arc<RwLock<State>>,
}

impl AggregatorService {
    /// Wraps an aggregator running against `chain`.
    pub fn new(aggregator: Aggregator, chain: Chain) -> Self {
        Self {
            state: Arc::new(RwLock::new(State { aggregator, chain })),
        }
    }

    /// Creates an aggregator from `config` on an empty chain at `timestamp`.
    pub fn from_config(config: AggregatorConfig, timestamp: u64) -> AggregatorResult<Self> {
        Ok(Self::new(Aggregator::new(config)?, Chain::new(timestamp)))
    }

    pub async fn submit(
        &self,
        caller: &Address,
        adapter: &str,
        kind: OperationKind,
        params: OperationParams,
    ) -> AggregatorResult<OperationResult> {
        let mut state = self.state.write().await;
        let State { aggregator, chain } = &mut *state;
        debug!(adapter, user = %caller, kind = %kind, "Submitting operation");
        aggregator.execute_operation(chain, caller, adapter, kind, params)
    }

    pub async fn register_adapter(
        &self,
        caller: &Address,
        name: &str,
        adapter: Box<dyn ProtocolAdapter>,
    ) -> AggregatorResult<()> {
        let mut state = self.state.write().await;
        let State { aggregator, chain } = &mut *state;
        aggregator.register_adapter(chain, caller, name, adapter)
    }

    pub async fn remove_adapter(&self, caller: &Address, name: &str) -> AggregatorResult<()> {
        let mut state = self.state.write().await;
        let State { aggregator, chain } = &mut *state;
        aggregator.remove_adapter(chain, caller, name)
    }

    pub async fn set_fee_rate(&self, caller: &Address, bps: u32) -> AggregatorResult<FeeRate> {
        let mut state = self.state.write().await;
        let State { aggregator, chain } = &mut *state;
        aggregator.set_fee_rate(chain, caller, bps)
    }

    pub async fn withdraw_fees(&self, caller: &Address) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        let mut state = self.state.write().await;
        let State { aggregator, chain } = &mut *state;
        aggregator.withdraw_fees(chain, caller)
    }

    pub async fn user_balances(
        &self,
        adapter: &str,
        user: &Address,
    ) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        let state = self.state.read().await;
        state.aggregator.user_balances(&state.chain, adapter, user)
    }

    pub async fn user_yield(&self, adapter: &str, user: &Address) -> AggregatorResult<Vec<YieldSnapshot>> {
        let state = self.state.read().await;
        state.aggregator.user_yield(&state.chain, adapter, user)
    }

    pub async fn user_positions(&self, adapter: &str, user: &Address) -> AggregatorResult<Vec<Position>> {
        let state = self.state.read().await;
        state.aggregator.user_positions(&state.chain, adapter, user)
    }

    /// Snapshot of the event log.
    pub async fn events(&self) -> Vec<LifecycleEvent> {
        self.state.read().await.aggregator.events().events().to_vec()
    }

    /// Runs `f` with exclusive access to the chain, e.g. to fund accounts or move the clock.
    pub async fn with_chain<T>(&self, f: impl FnOnce(&mut Chain) -> T) -> T {
        let mut state = self.state.write().await;
        f(&mut state.chain)
    }

    /// Runs `f` against a consistent read of the aggregator and the chain.
    pub async fn read<T>(&self, f: impl FnOnce(&Aggregator, &Chain) -> T) -> T {
        let state = self.state.read().await;
        f(&state.aggregator, &state.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::fixtures::{ALICE, NOW, World, amt};

    fn service() -> AggregatorService {
        let World { chain, aggregator } = World::new();
        AggregatorService::new(aggregator, chain)
    }

    #[tokio::test]
    async fn test_concurrent_deposits_serialize() {
        let service = service();
        let alice = Address::from(ALICE);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let service = service.clone();
                let alice = alice.clone();
                tokio::spawn(async move {
                    service
                        .submit(
                            &alice,
                            "lending",
                            OperationKind::Deposit,
                            OperationParams::single("usdc", 100u64, ALICE, NOW),
                        )
                        .await
                })
            })
            .collect();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.output_amounts, vec![amt(99)]);
        }

        let balances = service.user_balances("lending", &alice).await.unwrap();
        assert_eq!(balances, vec![(Address::from("usdc"), amt(990))]);
        let fees = service
            .read(|agg, _| agg.total_fees_collected(&Address::from("usdc")))
            .await;
        assert_eq!(fees, amt(10));
        assert_eq!(service.events().await.len(), 5 + 20);
    }

    #[tokio::test]
    async fn test_admin_through_service() {
        let service = service();
        let owner = Address::from("owner");

        let old = service.set_fee_rate(&owner, 50).await.unwrap();
        assert_eq!(old.bps(), 100);
        assert!(service.withdraw_fees(&owner).await.is_err());

        service
            .with_chain(|chain| chain.advance(3_600))
            .await;
        let err = service
            .submit(
                &Address::from(ALICE),
                "lending",
                OperationKind::Deposit,
                OperationParams::single("usdc", 100u64, ALICE, NOW),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            defi_agg_domain::AggregatorError::DeadlineExpired { .. }
        ));

        service.remove_adapter(&owner, "swap").await.unwrap();
        assert!(!service.read(|agg, _| agg.has_adapter("swap")).await);
    }
}
