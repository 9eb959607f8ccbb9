//! Aggregator lifecycle events.
//!
//! Records every state mutation the aggregator performs:
//! - Deposits, withdrawals and the fees withheld on them
//! - Range position opening, closing and harvesting
//! - Swaps
//! - Owner actions (registry, fee rate, fee withdrawal, ownership)

mod events;
mod log;

pub use events::*;
pub use log::*;
