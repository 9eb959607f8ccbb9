//! Uniform request and result shapes for every adapter operation.

use crate::enums::OperationKind;
use crate::error::{AggregatorError, AggregatorResult};
use crate::fees::FeeQuote;
use crate::position::{PositionId, TickRange};
use crate::token::{Address, TokenAmount};
use serde::{Deserialize, Serialize};

/// Parameters of one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParams {
    /// Assets involved, in adapter-defined order.
    pub tokens: Vec<Address>,
    /// Amounts paired with `tokens` (or the single input amount of a swap).
    pub amounts: Vec<TokenAmount>,
    /// Caller-supplied slippage bounds; empty means unbounded.
    pub min_amounts: Vec<TokenAmount>,
    /// Beneficiary of the operation's output.
    pub recipient: Address,
    /// Latest ledger timestamp at which the request may execute.
    pub deadline: u64,
    /// Target position for position-scoped operations.
    pub position_id: Option<PositionId>,
    /// Price range for new range positions; the full range when absent.
    pub range: Option<TickRange>,
    /// Opaque adapter-specific payload, forwarded untouched.
    pub extra_data: Vec<u8>,
}

impl OperationParams {
    pub fn new(recipient: impl Into<Address>, deadline: u64) -> Self {
        Self {
            tokens: Vec::new(),
            amounts: Vec::new(),
            min_amounts: Vec::new(),
            recipient: recipient.into(),
            deadline,
            position_id: None,
            range: None,
            extra_data: Vec::new(),
        }
    }

    /// Single-asset request used by deposit and withdraw.
    pub fn single(
        token: impl Into<Address>,
        amount: impl Into<TokenAmount>,
        recipient: impl Into<Address>,
        deadline: u64,
    ) -> Self {
        Self::new(recipient, deadline).with_token(token, amount)
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<Address>, amount: impl Into<TokenAmount>) -> Self {
        self.tokens.push(token.into());
        self.amounts.push(amount.into());
        self
    }

    #[must_use]
    pub fn with_min_amounts(mut self, min_amounts: Vec<TokenAmount>) -> Self {
        self.min_amounts = min_amounts;
        self
    }

    #[must_use]
    pub fn with_position(mut self, id: PositionId) -> Self {
        self.position_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_range(mut self, range: TickRange) -> Self {
        self.range = Some(range);
        self
    }

    #[must_use]
    pub fn with_extra_data(mut self, extra_data: Vec<u8>) -> Self {
        self.extra_data = extra_data;
        self
    }

    /// Slippage bound at `index`, zero when none was given.
    pub fn min_amount(&self, index: usize) -> TokenAmount {
        self.min_amounts.get(index).copied().unwrap_or_default()
    }

    /// Checks the request shape for `kind` at ledger time `now`.
    pub fn validate(&self, kind: OperationKind, now: u64) -> AggregatorResult<()> {
        if self.deadline < now {
            return Err(AggregatorError::DeadlineExpired {
                deadline: self.deadline,
                now,
            });
        }

        let bound_arity = match kind {
            OperationKind::Deposit | OperationKind::Withdraw => {
                self.expect_tokens(1)?;
                self.expect_amounts(1)?;
                1
            }
            OperationKind::AddPosition => {
                self.expect_tokens(2)?;
                self.expect_amounts(2)?;
                2
            }
            OperationKind::Swap => {
                self.expect_tokens(2)?;
                self.expect_amounts(1)?;
                if self.tokens[0] == self.tokens[1] {
                    return Err(AggregatorError::InvalidParams(
                        "swap input and output tokens must differ".into(),
                    ));
                }
                1
            }
            OperationKind::RemovePosition => {
                self.expect_position()?;
                self.expect_amounts(0)?;
                2
            }
            OperationKind::CollectYield => {
                self.expect_position()?;
                if !self.amounts.is_empty() {
                    self.expect_amounts(2)?;
                }
                2
            }
        };

        if self.amounts.iter().any(TokenAmount::is_zero) {
            return Err(AggregatorError::ZeroAmount);
        }
        if !self.min_amounts.is_empty() && self.min_amounts.len() != bound_arity {
            return Err(AggregatorError::LengthMismatch {
                expected: bound_arity,
                actual: self.min_amounts.len(),
            });
        }
        Ok(())
    }

    fn expect_tokens(&self, expected: usize) -> AggregatorResult<()> {
        if self.tokens.len() != expected {
            return Err(AggregatorError::InvalidParams(format!(
                "expected {expected} tokens, got {}",
                self.tokens.len()
            )));
        }
        Ok(())
    }

    fn expect_amounts(&self, expected: usize) -> AggregatorResult<()> {
        if self.amounts.len() != expected {
            return Err(AggregatorError::LengthMismatch {
                expected,
                actual: self.amounts.len(),
            });
        }
        Ok(())
    }

    fn expect_position(&self) -> AggregatorResult<PositionId> {
        self.position_id
            .ok_or_else(|| AggregatorError::InvalidParams("position id required".into()))
    }
}

/// What an adapter receives from the dispatcher for one operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Identity that submitted the request.
    pub caller: Address,
    /// Account that receives withheld fees.
    pub treasury: Address,
    pub kind: OperationKind,
    pub params: OperationParams,
    /// Input-side fee split per entry of `params.amounts`; empty for other kinds.
    pub quotes: Vec<FeeQuote>,
}

impl OperationContext {
    /// Required position id of a position-scoped operation.
    pub fn position_id(&self) -> AggregatorResult<PositionId> {
        self.params.expect_position()
    }
}

/// Outcome of one adapter operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub kind: OperationKind,
    /// Amounts produced by the adapter. For withdrawals this is the gross amount redeemed
    /// into the adapter's custody; the dispatcher rewrites it to the net amount delivered.
    pub output_amounts: Vec<TokenAmount>,
    pub position_id: Option<PositionId>,
    /// Fee splits applied by the dispatcher.
    pub fees: Vec<FeeQuote>,
    pub message: String,
}

impl OperationResult {
    pub fn new(kind: OperationKind, output_amounts: Vec<TokenAmount>) -> Self {
        Self {
            kind,
            output_amounts,
            position_id: None,
            fees: Vec::new(),
            message: String::new(),
        }
    }

    #[must_use]
    pub fn with_position(mut self, id: PositionId) -> Self {
        self.position_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
