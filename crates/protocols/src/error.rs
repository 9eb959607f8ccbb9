//! Errors raised by the in-memory ledger and the reference backends.

use defi_agg_domain::{Address, AggregatorError, TokenAmount};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Insufficient balance of {token} for {account}: required {required}, available {available}")]
    InsufficientBalance {
        token: Address,
        account: Address,
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error(
        "Insufficient allowance of {token} from {owner} to {spender}: required {required}, approved {approved}"
    )]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        required: TokenAmount,
        approved: TokenAmount,
    },

    #[error("Price slippage check: minimum {minimum}, actual {actual}")]
    Slippage {
        minimum: TokenAmount,
        actual: TokenAmount,
    },

    #[error("No backend deployed at {0}")]
    NotDeployed(Address),

    #[error("Backend already deployed at {0}")]
    AlreadyDeployed(Address),

    #[error("Backend at {address} is not a {expected}")]
    WrongBackend {
        address: Address,
        expected: &'static str,
    },

    #[error("Invalid token ID {0}")]
    UnknownPosition(u64),

    #[error("{caller} is not approved for position {position_id}")]
    NotApproved { caller: Address, position_id: u64 },

    #[error("Position {0} is not cleared")]
    PositionNotCleared(u64),

    #[error("No route from {token_in} to {token_out}")]
    NoRoute { token_in: Address, token_out: Address },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Arithmetic overflow")]
    Overflow,
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

impl From<BackendError> for AggregatorError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InsufficientBalance {
                required,
                available,
                ..
            } => AggregatorError::InsufficientBalance {
                required,
                available,
            },
            BackendError::InsufficientAllowance {
                required, approved, ..
            } => AggregatorError::InsufficientAllowance { required, approved },
            BackendError::Slippage { minimum, actual } => {
                AggregatorError::SlippageExceeded { minimum, actual }
            }
            BackendError::NotDeployed(address) => AggregatorError::BackendNotFound(address),
            BackendError::UnknownPosition(id) => AggregatorError::PositionNotFound(id),
            BackendError::NotApproved {
                caller,
                position_id,
            } => AggregatorError::NotAuthorized {
                caller,
                position_id,
            },
            BackendError::Overflow => AggregatorError::Overflow,
            other => AggregatorError::ExternalProtocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use defi_agg_domain::ErrorCategory;

    #[test]
    fn test_backend_errors_map_to_taxonomy() {
        let shortfall = BackendError::InsufficientBalance {
            token: Address::from("usdc"),
            account: Address::from("alice"),
            required: TokenAmount::from(10u64),
            available: TokenAmount::from(3u64),
        };
        let err = AggregatorError::from(shortfall);
        assert_eq!(err.category(), ErrorCategory::InsufficientFunds);
        assert!(err.to_string().starts_with("Insufficient balance"));

        let slippage = AggregatorError::from(BackendError::Slippage {
            minimum: TokenAmount::from(10u64),
            actual: TokenAmount::from(9u64),
        });
        assert_eq!(slippage.category(), ErrorCategory::LimitExceeded);

        let opaque = AggregatorError::from(BackendError::PositionNotCleared(4));
        assert_eq!(
            opaque,
            AggregatorError::ExternalProtocol("Position 4 is not cleared".into())
        );
    }
}
