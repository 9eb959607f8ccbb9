use crate::error::AggregatorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of operation routed through the dispatcher.
///
/// Wire codes follow the numbering the deployed aggregator used; the gaps between them are
/// reserved for further backend families.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Deposit,
    Withdraw,
    AddPosition,
    RemovePosition,
    Swap,
    CollectYield,
}

/// Which side of an operation the aggregator fee is charged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeSide {
    /// Charged on the caller's input before the adapter runs.
    Input,
    /// Charged on the gross amount the adapter returns.
    Output,
    /// Not charged.
    None,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        Self::Deposit,
        Self::Withdraw,
        Self::AddPosition,
        Self::RemovePosition,
        Self::Swap,
        Self::CollectYield,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Self::Deposit => 0,
            Self::Withdraw => 1,
            Self::AddPosition => 2,
            Self::RemovePosition => 3,
            Self::Swap => 4,
            Self::CollectYield => 18,
        }
    }

    pub fn fee_side(&self) -> FeeSide {
        match self {
            Self::Deposit | Self::AddPosition | Self::Swap => FeeSide::Input,
            Self::Withdraw => FeeSide::Output,
            Self::RemovePosition | Self::CollectYield => FeeSide::None,
        }
    }

    /// Label used in fee events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::AddPosition => "add_position",
            Self::RemovePosition => "remove_position",
            Self::Swap => "swap",
            Self::CollectYield => "collect_yield",
        }
    }
}

impl TryFrom<u8> for OperationKind {
    type Error = AggregatorError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| AggregatorError::InvalidParams(format!("unknown operation code {code}")))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::try_from(kind.code()), Ok(kind));
        }
        assert_eq!(
            OperationKind::try_from(18),
            Ok(OperationKind::CollectYield)
        );
        assert!(OperationKind::try_from(7).is_err());
    }

    #[test]
    fn test_fee_sides() {
        assert_eq!(OperationKind::Deposit.fee_side(), FeeSide::Input);
        assert_eq!(OperationKind::Swap.fee_side(), FeeSide::Input);
        assert_eq!(OperationKind::Withdraw.fee_side(), FeeSide::Output);
        assert_eq!(OperationKind::RemovePosition.fee_side(), FeeSide::None);
    }
}
