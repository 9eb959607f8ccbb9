//! Error taxonomy shared by the dispatcher, the fee engine and every adapter.

use crate::token::{Address, TokenAmount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad failure class of an [`AggregatorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Malformed request: zero amounts, length mismatches, expired deadline.
    Validation,
    /// Caller lacks the identity or approval the operation needs.
    Authorization,
    /// Unknown adapter, position or backend.
    NotFound,
    /// Balance, allowance or recorded principal too low.
    InsufficientFunds,
    /// The wrapped backend rejected the call.
    ExternalProtocol,
    /// A configured ceiling or caller-supplied bound was violated.
    LimitExceeded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("Amount must be greater than 0")]
    ZeroAmount,

    #[error("Array length mismatch: expected {expected} amounts, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Transaction expired: deadline {deadline} is before {now}")]
    DeadlineExpired { deadline: u64, now: u64 },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Adapter already exists: {0}")]
    AdapterAlreadyRegistered(String),

    #[error("Operation {operation} not supported by adapter {adapter}")]
    UnsupportedOperation { adapter: String, operation: String },

    #[error("Reentrant call")]
    Reentrancy,

    #[error("Caller {0} is not the owner")]
    NotOwner(Address),

    #[error("{caller} is not authorized for position {position_id}")]
    NotAuthorized { caller: Address, position_id: u64 },

    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("Position not found: {0}")]
    PositionNotFound(u64),

    #[error("Backend not found: {0}")]
    BackendNotFound(Address),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("Insufficient allowance: required {required}, approved {approved}")]
    InsufficientAllowance {
        required: TokenAmount,
        approved: TokenAmount,
    },

    #[error("Insufficient balance: requested {requested}, principal {principal}")]
    InsufficientPrincipal {
        requested: TokenAmount,
        principal: TokenAmount,
    },

    #[error("No fees to withdraw")]
    NoFeesToWithdraw,

    #[error("Backend call failed: {0}")]
    ExternalProtocol(String),

    #[error("Fee rate too high: {requested} bps exceeds {max} bps")]
    FeeRateTooHigh { requested: u32, max: u32 },

    #[error("Slippage bound violated: minimum {minimum}, actual {actual}")]
    SlippageExceeded {
        minimum: TokenAmount,
        actual: TokenAmount,
    },

    #[error("Arithmetic overflow")]
    Overflow,
}

impl AggregatorError {
    /// Maps the error onto its failure class.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ZeroAmount
            | Self::LengthMismatch { .. }
            | Self::DeadlineExpired { .. }
            | Self::InvalidParams(_)
            | Self::AdapterAlreadyRegistered(_)
            | Self::UnsupportedOperation { .. }
            | Self::Reentrancy => ErrorCategory::Validation,
            Self::NotOwner(_) | Self::NotAuthorized { .. } => ErrorCategory::Authorization,
            Self::AdapterNotFound(_) | Self::PositionNotFound(_) | Self::BackendNotFound(_) => {
                ErrorCategory::NotFound
            }
            Self::InsufficientBalance { .. }
            | Self::InsufficientAllowance { .. }
            | Self::InsufficientPrincipal { .. }
            | Self::NoFeesToWithdraw => ErrorCategory::InsufficientFunds,
            Self::ExternalProtocol(_) => ErrorCategory::ExternalProtocol,
            Self::FeeRateTooHigh { .. } | Self::SlippageExceeded { .. } | Self::Overflow => {
                ErrorCategory::LimitExceeded
            }
        }
    }
}

pub type AggregatorResult<T> = std::result::Result<T, AggregatorError>;
