//! Routing of user operations to adapters, with fee settlement and event emission.

use super::Aggregator;
use crate::lifecycle::{
    DepositedData, EventData, FeeCollectedData, LifecycleEvent, PositionClosedData,
    PositionOpenedData, SwappedData, WithdrawnData, YieldCollectedData,
};
use defi_agg_domain::{
    Address, AggregatorError, AggregatorResult, FeeQuote, FeeSide, OperationContext,
    OperationKind, OperationParams, OperationResult, TokenAmount,
};
use defi_agg_protocols::Chain;
use tracing::{debug, info};

impl Aggregator {
    /// Routes one operation to the adapter bound to `adapter_name`.
    ///
    /// Input-side fees (deposit, add position, swap) are quoted here and pulled by the adapter
    /// from the caller. Withdrawal fees are taken from the gross amount the adapter redeems,
    /// before the net amount is paid to the recipient. Position exits and yield collection are
    /// fee-free. Any failure restores the aggregator and the chain to their state before the
    /// call.
    pub fn execute_operation(
        &mut self,
        chain: &mut Chain,
        caller: &Address,
        adapter_name: &str,
        kind: OperationKind,
        params: OperationParams,
    ) -> AggregatorResult<OperationResult> {
        self.guarded(chain, |agg, chain| {
            agg.dispatch(chain, caller, adapter_name, kind, params)
        })
    }

    fn dispatch(
        &mut self,
        chain: &mut Chain,
        caller: &Address,
        adapter_name: &str,
        kind: OperationKind,
        params: OperationParams,
    ) -> AggregatorResult<OperationResult> {
        let supported = self.lookup(adapter_name)?.supported_operations();
        params.validate(kind, chain.now())?;
        if !supported.contains(&kind) {
            return Err(AggregatorError::UnsupportedOperation {
                adapter: adapter_name.to_string(),
                operation: kind.to_string(),
            });
        }

        let quotes = match kind.fee_side() {
            FeeSide::Input => params
                .amounts
                .iter()
                .map(|amount| self.fees.quote(*amount))
                .collect(),
            FeeSide::Output | FeeSide::None => Vec::new(),
        };
        let ctx = OperationContext {
            caller: caller.clone(),
            treasury: self.address.clone(),
            kind,
            params,
            quotes,
        };

        let adapter = self
            .adapters
            .get_mut(adapter_name)
            .ok_or_else(|| AggregatorError::AdapterNotFound(adapter_name.to_string()))?;
        let custody = adapter.address().clone();
        debug!(adapter = adapter_name, user = %caller, kind = %kind, "Dispatching operation");
        let mut result = adapter.execute(chain, &ctx)?;

        let fees = match kind.fee_side() {
            FeeSide::Input => self.accrue_input_fees(chain, adapter_name, &ctx)?,
            FeeSide::Output => {
                vec![self.settle_withdrawal(chain, adapter_name, &custody, &ctx, &mut result)?]
            }
            FeeSide::None => Vec::new(),
        };
        if let Some(data) = operation_event(&ctx, &result, &fees) {
            self.emit(
                LifecycleEvent::new(caller.clone(), chain.now(), data).with_adapter(adapter_name),
            );
        }
        result.fees = fees;

        info!(
            adapter = adapter_name,
            user = %caller,
            kind = %kind,
            outputs = ?result.output_amounts,
            "Operation executed"
        );
        Ok(result)
    }

    /// Books the fees the adapter already routed to the treasury.
    fn accrue_input_fees(
        &mut self,
        chain: &Chain,
        adapter_name: &str,
        ctx: &OperationContext,
    ) -> AggregatorResult<Vec<FeeQuote>> {
        for (token, quote) in ctx.params.tokens.iter().zip(&ctx.quotes) {
            self.book_fee(chain, adapter_name, ctx, token, quote.fee)?;
        }
        Ok(ctx.quotes.clone())
    }

    /// Splits the redeemed gross amount held by the adapter into fee and net, pays the net to
    /// the recipient and rewrites the result to the net amount.
    fn settle_withdrawal(
        &mut self,
        chain: &mut Chain,
        adapter_name: &str,
        custody: &Address,
        ctx: &OperationContext,
        result: &mut OperationResult,
    ) -> AggregatorResult<FeeQuote> {
        let token = ctx
            .params
            .tokens
            .first()
            .ok_or_else(|| AggregatorError::InvalidParams("withdraw requires a token".into()))?;
        let gross = result.output_amounts.first().copied().ok_or_else(|| {
            AggregatorError::ExternalProtocol(format!("{adapter_name} returned no withdrawal amount"))
        })?;

        let quote = self.fees.quote(gross);
        let minimum = ctx.params.min_amount(0);
        if quote.net < minimum {
            return Err(AggregatorError::SlippageExceeded {
                minimum,
                actual: quote.net,
            });
        }

        let ledger = chain.ledger_mut();
        ledger.transfer(token, custody, &ctx.params.recipient, quote.net)?;
        if !quote.fee.is_zero() {
            ledger.transfer(token, custody, &ctx.treasury, quote.fee)?;
        }
        self.book_fee(chain, adapter_name, ctx, token, quote.fee)?;

        result.output_amounts = vec![quote.net];
        Ok(quote)
    }

    fn book_fee(
        &mut self,
        chain: &Chain,
        adapter_name: &str,
        ctx: &OperationContext,
        token: &Address,
        fee: TokenAmount,
    ) -> AggregatorResult<()> {
        if fee.is_zero() {
            return Ok(());
        }
        self.fees.accrue(token, fee)?;
        self.emit(
            LifecycleEvent::new(
                ctx.caller.clone(),
                chain.now(),
                EventData::FeeCollected(FeeCollectedData {
                    token: token.clone(),
                    fee,
                    kind: ctx.kind.as_str().to_string(),
                }),
            )
            .with_adapter(adapter_name),
        );
        Ok(())
    }
}

/// The kind-specific event for a completed operation.
fn operation_event(
    ctx: &OperationContext,
    result: &OperationResult,
    fees: &[FeeQuote],
) -> Option<EventData> {
    let tokens = &ctx.params.tokens;
    let position_id = result.position_id.or(ctx.params.position_id);
    let fee_on = |index: usize| fees.get(index).copied();

    match ctx.kind {
        OperationKind::Deposit => {
            let quote = fee_on(0)?;
            Some(EventData::Deposited(DepositedData {
                token: tokens.first()?.clone(),
                net_amount: quote.net,
                fee: quote.fee,
            }))
        }
        OperationKind::Withdraw => {
            let quote = fee_on(0)?;
            Some(EventData::Withdrawn(WithdrawnData {
                token: tokens.first()?.clone(),
                gross_amount: quote.gross,
                net_amount: quote.net,
                fee: quote.fee,
            }))
        }
        OperationKind::AddPosition => Some(EventData::PositionOpened(PositionOpenedData {
            position_id: position_id?,
            tokens: tokens.clone(),
            amounts: result.output_amounts.clone(),
        })),
        OperationKind::RemovePosition => Some(EventData::PositionClosed(PositionClosedData {
            position_id: position_id?,
            amounts: result.output_amounts.clone(),
        })),
        OperationKind::CollectYield => Some(EventData::YieldCollected(YieldCollectedData {
            position_id: position_id?,
            amounts: result.output_amounts.clone(),
        })),
        OperationKind::Swap => {
            let quote = fee_on(0)?;
            Some(EventData::Swapped(SwappedData {
                token_in: tokens.first()?.clone(),
                token_out: tokens.get(1)?.clone(),
                amount_in: quote.gross,
                amount_out: result.output_amounts.first().copied()?,
                fee: quote.fee,
            }))
        }
        _ => None,
    }
}
