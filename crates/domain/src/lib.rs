//! Core domain types for the DeFi aggregator.
//!
//! This crate is the leaf of the workspace:
//! - Addresses and exact token amounts
//! - Basis-point fee math
//! - Operation kinds, request parameters and results
//! - The position sum type and yield snapshots
//! - Per-caller position bookkeeping
//! - The error taxonomy shared by every layer

/// Operation kinds and related enums.
pub mod enums;
/// Error taxonomy.
pub mod error;
/// Fee math.
pub mod fees;
/// Request and result shapes.
pub mod operation;
/// Position representations and yield snapshots.
pub mod position;
/// Principal ledger and position index.
pub mod store;
/// Addresses, tokens and amounts.
pub mod token;

pub use enums::{FeeSide, OperationKind};
pub use error::{AggregatorError, AggregatorResult, ErrorCategory};
pub use fees::{BPS_DENOMINATOR, FeeQuote, FeeRate, MAX_FEE_RATE_BPS, calculate_fee};
pub use operation::{OperationContext, OperationParams, OperationResult};
pub use position::{ExchangeRate, Position, PositionId, TickRange, YieldSnapshot};
pub use store::{PrincipalBook, PositionIndex};
pub use token::{Address, Token, TokenAmount};
