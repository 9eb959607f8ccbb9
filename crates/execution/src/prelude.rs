//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use defi_agg_execution::prelude::*;
//! ```

// Aggregator
pub use crate::aggregator::{Aggregator, VERSION};
pub use crate::config::{AggregatorConfig, DEFAULT_FEE_RATE_BPS};
pub use crate::fees::FeeEngine;
pub use crate::service::AggregatorService;

// Lifecycle
pub use crate::lifecycle::{
    AdapterRegisteredData, AdapterRemovedData, DepositedData, EventData, EventLog,
    FeeCollectedData, FeeRateChangedData, FeesWithdrawnData, LifecycleEvent, LifecycleEventType,
    OwnershipTransferredData, PositionClosedData, PositionOpenedData, SwappedData, WithdrawnData,
    YieldCollectedData,
};
