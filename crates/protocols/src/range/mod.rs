//! Concentrated-liquidity range positions.

/// Range-position adapter.
pub mod adapter;
/// Reference position manager.
pub mod position_manager;

pub use adapter::{RangeAdapter, RangeAdapterConfig};
pub use position_manager::{MintParams, MintResult, PositionManager, RangePosition};
