//! Adapter registry and dispatcher.
//!
//! The [`Aggregator`] owns the registry, the fee engine, the event log and the reentrancy guard.
//! Every public entry point runs against a snapshot of the aggregator and the chain: on any
//! error both are restored, so a failed request leaves no trace.

mod dispatch;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::config::AggregatorConfig;
use crate::fees::FeeEngine;
use crate::guard::ReentrancyGuard;
use crate::lifecycle::{
    AdapterRegisteredData, AdapterRemovedData, EventData, EventLog, FeeRateChangedData,
    FeesWithdrawnData, LifecycleEvent, OwnershipTransferredData,
};
use defi_agg_domain::{
    Address, AggregatorError, AggregatorResult, FeeRate, Position, TokenAmount, YieldSnapshot,
};
use defi_agg_protocols::{Chain, ProtocolAdapter};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Version of the aggregator contract.
pub const VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct Aggregator {
    owner: Address,
    address: Address,
    adapters: BTreeMap<String, Box<dyn ProtocolAdapter>>,
    fees: FeeEngine,
    events: EventLog,
    guard: ReentrancyGuard,
}

impl Aggregator {
    /// Creates an aggregator with an empty registry.
    pub fn new(config: AggregatorConfig) -> AggregatorResult<Self> {
        let rate = FeeRate::try_new(config.fee_rate_bps)?;
        info!(
            owner = %config.owner,
            address = %config.address,
            fee_rate = %rate,
            "Aggregator created"
        );
        Ok(Self {
            owner: config.owner,
            address: config.address,
            adapters: BTreeMap::new(),
            fees: FeeEngine::new(rate),
            events: EventLog::new(),
            guard: ReentrancyGuard::default(),
        })
    }

    #[must_use]
    pub fn version(&self) -> &'static str {
        VERSION
    }

    #[must_use]
    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Ledger identity holding withheld fees.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    #[must_use]
    pub fn fee_rate(&self) -> FeeRate {
        self.fees.rate()
    }

    /// `floor(amount * rate / 10_000)` at the current rate.
    #[must_use]
    pub fn calculate_fee(&self, amount: TokenAmount) -> TokenAmount {
        self.fees.calculate_fee(amount)
    }

    /// Fees of `token` held for withdrawal.
    #[must_use]
    pub fn total_fees_collected(&self, token: &Address) -> TokenAmount {
        self.fees.collected(token)
    }

    #[must_use]
    pub fn fee_balances(&self) -> Vec<(Address, TokenAmount)> {
        self.fees.balances()
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    #[must_use]
    pub fn has_adapter(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Custody address of the adapter bound to `name`.
    #[must_use]
    pub fn get_adapter(&self, name: &str) -> Option<&Address> {
        self.adapters.get(name).map(|adapter| adapter.address())
    }

    #[must_use]
    pub fn adapter(&self, name: &str) -> Option<&dyn ProtocolAdapter> {
        self.adapters.get(name).map(|adapter| adapter.as_ref())
    }

    /// Registered names in lexical order.
    #[must_use]
    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn user_balances(
        &self,
        chain: &Chain,
        adapter: &str,
        user: &Address,
    ) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        self.lookup(adapter)?.user_balances(chain, user)
    }

    pub fn user_yield(
        &self,
        chain: &Chain,
        adapter: &str,
        user: &Address,
    ) -> AggregatorResult<Vec<YieldSnapshot>> {
        self.lookup(adapter)?.user_yield(chain, user)
    }

    pub fn user_positions(
        &self,
        chain: &Chain,
        adapter: &str,
        user: &Address,
    ) -> AggregatorResult<Vec<Position>> {
        self.lookup(adapter)?.user_positions(chain, user)
    }

    /// Binds `name` to `adapter`. Owner only; the name must be free.
    pub fn register_adapter(
        &mut self,
        chain: &mut Chain,
        caller: &Address,
        name: &str,
        adapter: Box<dyn ProtocolAdapter>,
    ) -> AggregatorResult<()> {
        self.guarded(chain, |agg, chain| {
            agg.require_owner(caller)?;
            if agg.adapters.contains_key(name) {
                return Err(AggregatorError::AdapterAlreadyRegistered(name.to_string()));
            }
            let address = adapter.address().clone();
            agg.adapters.insert(name.to_string(), adapter);
            agg.emit(
                LifecycleEvent::new(
                    caller.clone(),
                    chain.now(),
                    EventData::AdapterRegistered(AdapterRegisteredData {
                        name: name.to_string(),
                        address: address.clone(),
                    }),
                )
                .with_adapter(name),
            );
            info!(adapter = name, address = %address, "Adapter registered");
            Ok(())
        })
    }

    /// Clears the binding for `name`. Owner only.
    pub fn remove_adapter(&mut self, chain: &mut Chain, caller: &Address, name: &str) -> AggregatorResult<()> {
        self.guarded(chain, |agg, chain| {
            agg.require_owner(caller)?;
            if agg.adapters.remove(name).is_none() {
                return Err(AggregatorError::AdapterNotFound(name.to_string()));
            }
            agg.emit(
                LifecycleEvent::new(
                    caller.clone(),
                    chain.now(),
                    EventData::AdapterRemoved(AdapterRemovedData {
                        name: name.to_string(),
                    }),
                )
                .with_adapter(name),
            );
            info!(adapter = name, "Adapter removed");
            Ok(())
        })
    }

    /// Sets the fee rate. Owner only; returns the previous rate.
    pub fn set_fee_rate(&mut self, chain: &mut Chain, caller: &Address, bps: u32) -> AggregatorResult<FeeRate> {
        self.guarded(chain, |agg, chain| {
            agg.require_owner(caller)?;
            let rate = FeeRate::try_new(bps)?;
            let old = agg.fees.set_rate(rate);
            agg.emit(
                LifecycleEvent::new(
                    caller.clone(),
                    chain.now(),
                    EventData::FeeRateChanged(FeeRateChangedData {
                        old_bps: old.bps(),
                        new_bps: rate.bps(),
                    }),
                ),
            );
            info!(old = %old, new = %rate, "Fee rate changed");
            Ok(old)
        })
    }

    /// Pays every collected fee balance to the owner. Owner only.
    pub fn withdraw_fees(
        &mut self,
        chain: &mut Chain,
        caller: &Address,
    ) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        self.guarded(chain, |agg, chain| {
            agg.require_owner(caller)?;
            let amounts = agg.fees.drain()?;
            for (token, amount) in &amounts {
                chain
                    .ledger_mut()
                    .transfer(token, &agg.address, &agg.owner, *amount)?;
            }
            agg.emit(
                LifecycleEvent::new(
                    caller.clone(),
                    chain.now(),
                    EventData::FeesWithdrawn(FeesWithdrawnData {
                        to: agg.owner.clone(),
                        amounts: amounts.clone(),
                    }),
                ),
            );
            info!(owner = %agg.owner, tokens = amounts.len(), "Fees withdrawn");
            Ok(amounts)
        })
    }

    /// Hands owner rights to `new_owner`. Owner only.
    pub fn transfer_ownership(
        &mut self,
        chain: &mut Chain,
        caller: &Address,
        new_owner: &Address,
    ) -> AggregatorResult<()> {
        self.guarded(chain, |agg, chain| {
            agg.require_owner(caller)?;
            let previous = std::mem::replace(&mut agg.owner, new_owner.clone());
            agg.emit(
                LifecycleEvent::new(
                    caller.clone(),
                    chain.now(),
                    EventData::OwnershipTransferred(OwnershipTransferredData {
                        previous_owner: previous.clone(),
                        new_owner: new_owner.clone(),
                    }),
                ),
            );
            info!(previous = %previous, new_owner = %new_owner, "Ownership transferred");
            Ok(())
        })
    }

    /// Runs `f` inside the critical section against a snapshot of `self` and `chain`,
    /// restoring both if `f` fails.
    fn guarded<T>(
        &mut self,
        chain: &mut Chain,
        f: impl FnOnce(&mut Self, &mut Chain) -> AggregatorResult<T>,
    ) -> AggregatorResult<T> {
        self.guard.enter()?;
        let snapshot = (self.clone(), chain.clone());
        let result = f(self, chain);
        if let Err(err) = &result {
            warn!(error = %err, category = ?err.category(), "Request rejected, state restored");
            let (aggregator, ledger) = snapshot;
            *self = aggregator;
            *chain = ledger;
        }
        self.guard.exit();
        result
    }

    fn require_owner(&self, caller: &Address) -> AggregatorResult<()> {
        if caller != &self.owner {
            return Err(AggregatorError::NotOwner(caller.clone()));
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> AggregatorResult<&dyn ProtocolAdapter> {
        self.adapter(name)
            .ok_or_else(|| AggregatorError::AdapterNotFound(name.to_string()))
    }

    fn emit(&mut self, event: LifecycleEvent) {
        self.events.record(event);
    }
}
