//! Adapter for exact-input swaps through a router.

use crate::adapter::{ProtocolAdapter, collect_input};
use crate::chain::Chain;
use defi_agg_domain::{
    Address, AggregatorError, AggregatorResult, OperationContext, OperationKind, OperationResult,
    TokenAmount,
};
use tracing::info;

/// Request layout: `tokens = [token_in, token_out]`, `amounts = [amount_in]`,
/// `min_amounts = [min_amount_out]`.
#[derive(Debug, Clone)]
pub struct SwapAdapter {
    name: String,
    version: String,
    address: Address,
    router: Address,
}

impl SwapAdapter {
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<Address>, router: impl Into<Address>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            address: address.into(),
            router: router.into(),
        }
    }

    /// Router output for `amount_in`, before any aggregator fee.
    pub fn quote(
        &self,
        chain: &Chain,
        token_in: &Address,
        token_out: &Address,
        amount_in: TokenAmount,
    ) -> AggregatorResult<TokenAmount> {
        Ok(chain
            .swap_router(&self.router)?
            .get_amount_out(token_in, token_out, amount_in)?)
    }
}

impl ProtocolAdapter for SwapAdapter {
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
        vec![OperationKind::Swap]
    }

    fn swap(&mut self, chain: &mut Chain, ctx: &OperationContext) -> AggregatorResult<OperationResult> {
        let [token_in, token_out] = ctx.params.tokens.as_slice() else {
            return Err(AggregatorError::InvalidParams(
                "swap requires input and output tokens".into(),
            ));
        };
        let net = collect_input(chain, &self.address, ctx, 0)?;

        let (router, ledger) = chain.swap_router_mut(&self.router)?;
        let amount_out = router.swap_exact_input(
            ledger,
            &self.address,
            token_in,
            token_out,
            net,
            ctx.params.min_amount(0),
            &ctx.params.recipient,
        )?;

        info!(
            adapter = %self.name,
            user = %ctx.caller,
            token_in = %token_in,
            token_out = %token_out,
            amount_in = %net,
            amount_out = %amount_out,
            "Swap executed"
        );
        Ok(OperationResult::new(OperationKind::Swap, vec![amount_out])
            .with_message(format!("swapped {net} {token_in} for {amount_out} {token_out}")))
    }

    fn clone_box(&self) -> Box<dyn ProtocolAdapter> {
        Box::new(self.clone())
    }
}
