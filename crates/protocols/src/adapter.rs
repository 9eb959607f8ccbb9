//! The uniform operation contract every protocol adapter implements.

use crate::chain::Chain;
use defi_agg_domain::{
    Address, AggregatorError, AggregatorResult, OperationContext, OperationKind, OperationResult,
    Position, TokenAmount, YieldSnapshot,
};
use std::fmt::Debug;

/// One backend family behind the aggregator's request shape.
///
/// Adapters hold their own per-caller bookkeeping and talk to their backend through the
/// [`Chain`] passed in on every call. Each operation method receives the dispatcher's
/// [`OperationContext`]; for input-side kinds the context already carries the fee split and the
/// adapter is responsible for pulling the gross amount from the caller, routing the fee to the
/// treasury and forwarding only the net amount.
///
/// Operations a family does not offer keep the default body, which fails with
/// [`AggregatorError::UnsupportedOperation`].
pub trait ProtocolAdapter: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Custody identity of the adapter on the ledger.
    fn address(&self) -> &Address;

    fn supported_operations(&self) -> Vec<OperationKind>;

    fn deposit(&mut self, chain: &mut Chain, ctx: &OperationContext) -> AggregatorResult<OperationResult> {
        let _ = chain;
        Err(self.unsupported(ctx.kind))
    }

    /// Redeems into the adapter's custody and reports the gross amount redeemed; the
    /// dispatcher forwards the net-of-fee proceeds.
    fn withdraw(&mut self, chain: &mut Chain, ctx: &OperationContext) -> AggregatorResult<OperationResult> {
        let _ = chain;
        Err(self.unsupported(ctx.kind))
    }

    fn add_position(
        &mut self,
        chain: &mut Chain,
        ctx: &OperationContext,
    ) -> AggregatorResult<OperationResult> {
        let _ = chain;
        Err(self.unsupported(ctx.kind))
    }

    fn remove_position(
        &mut self,
        chain: &mut Chain,
        ctx: &OperationContext,
    ) -> AggregatorResult<OperationResult> {
        let _ = chain;
        Err(self.unsupported(ctx.kind))
    }

    fn collect_yield(
        &mut self,
        chain: &mut Chain,
        ctx: &OperationContext,
    ) -> AggregatorResult<OperationResult> {
        let _ = chain;
        Err(self.unsupported(ctx.kind))
    }

    fn swap(&mut self, chain: &mut Chain, ctx: &OperationContext) -> AggregatorResult<OperationResult> {
        let _ = chain;
        Err(self.unsupported(ctx.kind))
    }

    /// Routes `ctx` to the method for its kind.
    fn execute(&mut self, chain: &mut Chain, ctx: &OperationContext) -> AggregatorResult<OperationResult> {
        match ctx.kind {
            OperationKind::Deposit => self.deposit(chain, ctx),
            OperationKind::Withdraw => self.withdraw(chain, ctx),
            OperationKind::AddPosition => self.add_position(chain, ctx),
            OperationKind::RemovePosition => self.remove_position(chain, ctx),
            OperationKind::CollectYield => self.collect_yield(chain, ctx),
            OperationKind::Swap => self.swap(chain, ctx),
            other => Err(self.unsupported(other)),
        }
    }

    /// Recorded principal per token (ledger values, not live values).
    fn user_balances(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<(Address, TokenAmount)>> {
        let _ = (chain, user);
        Ok(Vec::new())
    }

    /// Live yield per token, derived from backend state on every call.
    fn user_yield(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<YieldSnapshot>> {
        let _ = (chain, user);
        Ok(Vec::new())
    }

    fn user_positions(&self, chain: &Chain, user: &Address) -> AggregatorResult<Vec<Position>> {
        let _ = (chain, user);
        Ok(Vec::new())
    }

    fn clone_box(&self) -> Box<dyn ProtocolAdapter>;

    fn unsupported(&self, kind: OperationKind) -> AggregatorError {
        AggregatorError::UnsupportedOperation {
            adapter: self.name().to_string(),
            operation: kind.to_string(),
        }
    }
}

impl Clone for Box<dyn ProtocolAdapter> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Pulls `gross` of `token` from the caller into adapter custody and pays the fee part to the
/// treasury, leaving the net amount with the adapter.
pub(crate) fn collect_input(
    chain: &mut Chain,
    adapter: &Address,
    ctx: &OperationContext,
    index: usize,
) -> AggregatorResult<TokenAmount> {
    let token = ctx
        .params
        .tokens
        .get(index)
        .ok_or_else(|| AggregatorError::InvalidParams(format!("missing token {index}")))?;
    let quote = ctx
        .quotes
        .get(index)
        .copied()
        .ok_or_else(|| AggregatorError::InvalidParams(format!("missing fee quote {index}")))?;

    let ledger = chain.ledger_mut();
    ledger.transfer_from(token, adapter, &ctx.caller, adapter, quote.gross)?;
    if !quote.fee.is_zero() {
        ledger.transfer(token, adapter, &ctx.treasury, quote.fee)?;
    }
    Ok(quote.net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use defi_agg_domain::{FeeRate, OperationParams};

    #[derive(Debug, Clone)]
    struct NullAdapter {
        address: Address,
    }

    impl ProtocolAdapter for NullAdapter {
        fn name(&self) -> &str {
            "null"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn address(&self) -> &Address {
            &self.address
        }

        fn supported_operations(&self) -> Vec<OperationKind> {
            Vec::new()
        }

        fn clone_box(&self) -> Box<dyn ProtocolAdapter> {
            Box::new(self.clone())
        }
    }

    fn context(kind: OperationKind) -> OperationContext {
        let params = OperationParams::single("usdc", 1_000u64, "alice", 10);
        let quotes = vec![FeeRate::try_new(100).unwrap().quote(params.amounts[0])];
        OperationContext {
            caller: Address::from("alice"),
            treasury: Address::from("aggregator"),
            kind,
            params,
            quotes,
        }
    }

    #[test]
    fn test_default_operations_are_unsupported() {
        let mut adapter = NullAdapter {
            address: Address::from("null"),
        };
        let mut chain = Chain::new(0);
        let err = adapter
            .execute(&mut chain, &context(OperationKind::Deposit))
            .unwrap_err();
        assert_eq!(
            err,
            AggregatorError::UnsupportedOperation {
                adapter: "null".into(),
                operation: "deposit".into(),
            }
        );
        assert!(adapter
            .user_yield(&chain, &Address::from("alice"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_collect_input_splits_fee() {
        let mut chain = Chain::new(0);
        let usdc = Address::from("usdc");
        let alice = Address::from("alice");
        let adapter = Address::from("adapter");
        chain
            .ledger_mut()
            .mint(&usdc, &alice, TokenAmount::from(1_000u64))
            .unwrap();
        chain
            .ledger_mut()
            .approve(&usdc, &alice, &adapter, TokenAmount::max());

        let net = collect_input(&mut chain, &adapter, &context(OperationKind::Deposit), 0).unwrap();
        assert_eq!(net, TokenAmount::from(990u64));
        assert_eq!(chain.ledger().balance_of(&usdc, &adapter), TokenAmount::from(990u64));
        assert_eq!(
            chain.ledger().balance_of(&usdc, &Address::from("aggregator")),
            TokenAmount::from(10u64)
        );
    }

    #[test]
    fn test_boxed_adapters_clone() {
        let boxed: Box<dyn ProtocolAdapter> = Box::new(NullAdapter {
            address: Address::from("null"),
        });
        let copy = boxed.clone();
        assert_eq!(copy.name(), "null");
    }
}
