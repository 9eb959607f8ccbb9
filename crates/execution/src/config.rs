//! Aggregator configuration.

use defi_agg_domain::Address;
use serde::{Deserialize, Serialize};

/// Fee rate applied when none is configured (1%).
pub const DEFAULT_FEE_RATE_BPS: u32 = 100;

/// Configuration for [`crate::Aggregator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Identity allowed to perform owner-only actions.
    pub owner: Address,
    /// Ledger identity of the aggregator; withheld fees are held here.
    pub address: Address,
    /// Initial fee rate in basis points.
    pub fee_rate_bps: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            owner: Address::from("owner"),
            address: Address::from("aggregator"),
            fee_rate_bps: DEFAULT_FEE_RATE_BPS,
        }
    }
}

impl AggregatorConfig {
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<Address>) -> Self {
        self.owner = owner.into();
        self
    }

    #[must_use]
    pub fn with_fee_rate_bps(mut self, fee_rate_bps: u32) -> Self {
        self.fee_rate_bps = fee_rate_bps;
        self
    }
}
